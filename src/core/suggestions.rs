//! Disposable quick-reply prompts for the processed content

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::events::{EventSender, SessionEvent};
use crate::api::{ApiError, Suggestion, TranscriptApi};

#[derive(Debug)]
pub enum SuggestionEvent {
    Loaded {
        load: u64,
        fingerprint: String,
        result: Result<Vec<Suggestion>, ApiError>,
    },
}

struct PendingLoad {
    serial: u64,
    handle: JoinHandle<()>,
}

/// Suggestions keyed by content fingerprint
pub struct SuggestionTray {
    api: Arc<dyn TranscriptApi>,
    events: EventSender,
    items: Vec<Suggestion>,
    fingerprint: Option<String>,
    pending: Option<PendingLoad>,
    next_serial: u64,
}

impl SuggestionTray {
    pub fn new(api: Arc<dyn TranscriptApi>, events: EventSender) -> Self {
        Self {
            api,
            events,
            items: Vec::new(),
            fingerprint: None,
            pending: None,
            next_serial: 0,
        }
    }

    pub fn items(&self) -> &[Suggestion] {
        &self.items
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.fingerprint.as_deref()
    }

    /// Replace the set with suggestions for `fingerprint`
    pub fn load(&mut self, fingerprint: &str) {
        self.clear();
        self.fingerprint = Some(fingerprint.to_string());

        self.next_serial += 1;
        let load = self.next_serial;
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let fingerprint = fingerprint.to_string();

        let handle = tokio::spawn(async move {
            let result = api.get_suggestions(&fingerprint).await;
            let _ = events.send(SessionEvent::Suggestions(SuggestionEvent::Loaded {
                load,
                fingerprint,
                result,
            }));
        });
        self.pending = Some(PendingLoad {
            serial: load,
            handle,
        });
    }

    /// Remove and return the suggestion with `id`
    pub fn consume(&mut self, id: &str) -> Option<Suggestion> {
        let index = self.items.iter().position(|s| s.id == id)?;
        Some(self.items.remove(index))
    }

    pub fn clear(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
        self.items.clear();
        self.fingerprint = None;
    }

    /// Apply a fetch result; returns the new count, `None` when stale
    pub fn apply(&mut self, event: SuggestionEvent) -> Option<usize> {
        let SuggestionEvent::Loaded {
            load,
            fingerprint,
            result,
        } = event;

        match &self.pending {
            Some(pending) if pending.serial == load => {}
            _ => {
                tracing::debug!(%fingerprint, "Dropping stale suggestions");
                return None;
            }
        }
        self.pending = None;

        self.items = result.unwrap_or_else(|e| {
            tracing::warn!(%fingerprint, "Failed to load suggestions: {}", e);
            Vec::new()
        });
        Some(self.items.len())
    }
}

impl Drop for SuggestionTray {
    fn drop(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }
}
