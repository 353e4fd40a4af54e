//! Session coordinator
//!
//! Holds the active conversation id and owns every other session component.
//! Switching conversation, starting a new upload or clearing history first
//! tears everything down synchronously (poll loop stopped, answer stream
//! closed, log and suggestions emptied, in-flight flags cleared) and only then
//! starts the new fetches. Background tasks report over one channel; results
//! from torn-down operations carry an old serial and are dropped.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::chat::{ChatEvent, ChatSession, ChatUpdate};
use super::errors::SessionError;
use super::events::{EventReceiver, EventSender, ListAction, SessionEvent};
use super::report::render_report;
use super::suggestions::SuggestionTray;
use super::types::{Message, UploadDisplay};
use super::upload::{UploadOutcome, UploadPipeline};
use crate::api::{AudioFile, ConversationSummary, Suggestion, TranscriptApi};
use crate::config::{AnswerMode, SessionConfig};

/// Observable change produced by [`SessionCoordinator::next_update`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionUpdate {
    /// Upload/processing display changed
    Upload(UploadDisplay),
    ConversationReady { conversation_id: String },
    UploadFailed { detail: String },
    MessagesLoaded { conversation_id: String, count: usize },
    AnswerStarted,
    AnswerDelta { text: String },
    AnswerCompleted { text: String },
    AnswerFailed { detail: String },
    SuggestionsLoaded { count: usize },
    ConversationsLoaded { count: usize },
    ListActionDone(ListAction),
    ListActionFailed { action: ListAction, detail: String },
}

pub struct SessionCoordinator {
    api: Arc<dyn TranscriptApi>,
    user_id: String,
    events: EventSender,
    receiver: EventReceiver,
    active: Option<String>,
    conversations: Vec<ConversationSummary>,
    list_serial: u64,
    list_task: Option<JoinHandle<()>>,
    upload: UploadPipeline,
    chat: ChatSession,
    suggestions: SuggestionTray,
}

impl SessionCoordinator {
    pub fn new(api: Arc<dyn TranscriptApi>, settings: &SessionConfig) -> Self {
        let (events, receiver) = mpsc::unbounded_channel();
        let upload = UploadPipeline::new(Arc::clone(&api), events.clone(), settings);
        let chat = ChatSession::new(Arc::clone(&api), events.clone(), settings);
        let suggestions = SuggestionTray::new(Arc::clone(&api), events.clone());
        Self {
            api,
            user_id: settings.user_id.clone(),
            events,
            receiver,
            active: None,
            conversations: Vec::new(),
            list_serial: 0,
            list_task: None,
            upload,
            chat,
            suggestions,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn active_summary(&self) -> Option<&ConversationSummary> {
        let id = self.active.as_deref()?;
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn messages(&self) -> &[Message] {
        self.chat.messages()
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        self.suggestions.items()
    }

    pub fn upload_display(&self) -> &UploadDisplay {
        self.upload.display()
    }

    pub fn conversations(&self) -> &[ConversationSummary] {
        &self.conversations
    }

    pub fn is_busy(&self) -> bool {
        self.chat.is_busy()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.chat.last_error()
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.chat.answer_mode()
    }

    pub fn set_answer_mode(&mut self, mode: AnswerMode) {
        tracing::info!(?mode, "Answer mode changed");
        self.chat.set_answer_mode(mode);
    }

    fn teardown(&mut self) {
        self.upload.cancel();
        self.chat.clear();
        self.suggestions.clear();
    }

    /// Make `conversation_id` active and hydrate it
    pub fn switch_to(&mut self, conversation_id: &str) {
        self.teardown();
        self.upload.reset();
        let fingerprint = self.fingerprint_of(conversation_id);
        tracing::info!(conversation_id, "Switching conversation");
        self.hydrate(conversation_id, fingerprint.as_deref());
    }

    fn fingerprint_of(&self, conversation_id: &str) -> Option<String> {
        self.conversations
            .iter()
            .find(|c| c.id == conversation_id)
            .and_then(|c| c.fingerprint.clone())
    }

    fn hydrate(&mut self, conversation_id: &str, fingerprint: Option<&str>) {
        self.active = Some(conversation_id.to_string());
        self.chat.load_history(conversation_id);
        match fingerprint {
            Some(fingerprint) => self.suggestions.load(fingerprint),
            None => tracing::debug!(conversation_id, "Fingerprint not known yet"),
        }
    }

    /// Fetch suggestions for the active conversation once its fingerprint
    /// shows up in the list
    fn hydrate_suggestions(&mut self) {
        if self.suggestions.fingerprint().is_some() {
            return;
        }
        let fingerprint = match self.active.as_deref() {
            Some(active) => self.fingerprint_of(active),
            None => return,
        };
        if let Some(fingerprint) = fingerprint {
            self.suggestions.load(&fingerprint);
        }
    }

    /// Clear the active conversation ready for a new upload
    pub fn start_new_upload(&mut self) {
        self.teardown();
        self.upload.reset();
        self.active = None;
    }

    /// Delete every conversation of the user
    pub fn clear_all(&mut self) {
        self.start_new_upload();
        self.cancel_list_refresh();
        self.conversations.clear();

        let api = Arc::clone(&self.api);
        let user_id = self.user_id.clone();
        self.spawn_list_action(ListAction::ClearHistory, async move {
            api.clear_history(&user_id).await
        });
    }

    /// Upload `file`; the conversation becomes active once it is ready
    pub fn submit_file(&mut self, file: AudioFile) {
        self.start_new_upload();
        self.upload.submit(file);
    }

    /// Ask a question in the active conversation
    pub fn send(&mut self, text: &str) -> Result<(), SessionError> {
        if self.chat.is_busy() {
            return Err(SessionError::Busy);
        }
        self.chat.send(self.active.as_deref(), text)
    }

    /// Consume a suggestion and ask its prompt
    pub fn use_suggestion(&mut self, id: &str) -> Result<(), SessionError> {
        if self.active.is_none() {
            return Err(SessionError::NoActiveConversation);
        }
        if self.chat.is_busy() {
            return Err(SessionError::Busy);
        }
        let suggestion = self
            .suggestions
            .consume(id)
            .ok_or_else(|| SessionError::UnknownSuggestion(id.to_string()))?;
        self.send(&suggestion.prompt)
    }

    pub fn refresh_conversations(&mut self) {
        self.cancel_list_refresh();
        self.list_serial += 1;
        let serial = self.list_serial;
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let user_id = self.user_id.clone();

        self.list_task = Some(tokio::spawn(async move {
            let result = api.get_conversations(&user_id).await;
            let _ = events.send(SessionEvent::Conversations { serial, result });
        }));
    }

    fn cancel_list_refresh(&mut self) {
        if let Some(task) = self.list_task.take() {
            task.abort();
        }
        self.list_serial += 1;
    }

    pub fn rename_conversation(
        &mut self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), SessionError> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::EmptyTitle);
        }
        let action = ListAction::Rename {
            conversation_id: conversation_id.to_string(),
            title: title.to_string(),
        };
        let api = Arc::clone(&self.api);
        let (id, title) = (conversation_id.to_string(), title.to_string());
        self.spawn_list_action(action, async move {
            api.rename_conversation(&id, &title).await
        });
        Ok(())
    }

    pub fn delete_conversation(&mut self, conversation_id: &str) {
        if self.active.as_deref() == Some(conversation_id) {
            self.start_new_upload();
        }
        let action = ListAction::Delete {
            conversation_id: conversation_id.to_string(),
        };
        let api = Arc::clone(&self.api);
        let id = conversation_id.to_string();
        self.spawn_list_action(action, async move { api.delete_conversation(&id).await });
    }

    fn spawn_list_action<F>(&self, action: ListAction, call: F)
    where
        F: std::future::Future<Output = Result<(), crate::api::ApiError>> + Send + 'static,
    {
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = call.await;
            let _ = events.send(SessionEvent::ListActionDone { action, result });
        });
    }

    /// Markdown rendering of the current log
    pub fn export_report(&self) -> String {
        let title = self.active_summary().map(|c| c.display_title());
        render_report(title, self.chat.messages(), Utc::now())
    }

    /// Wait for the next observable change
    ///
    /// Cancel safe: an event is only taken off the channel together with its
    /// application, so dropping the future (e.g. in `select!`) loses nothing.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        loop {
            let event = self.receiver.recv().await?;
            if let Some(update) = self.apply(event) {
                return Some(update);
            }
        }
    }

    /// Apply one background event
    pub fn apply(&mut self, event: SessionEvent) -> Option<SessionUpdate> {
        match event {
            SessionEvent::Upload(event) => {
                let outcome = self.upload.apply(event)?;
                Some(self.upload_outcome(outcome))
            }
            SessionEvent::Monitor(event) => {
                let outcome = self.upload.apply_monitor(event)?;
                Some(self.upload_outcome(outcome))
            }
            SessionEvent::Chat(event) => self.apply_chat(event),
            SessionEvent::Suggestions(event) => {
                let count = self.suggestions.apply(event)?;
                Some(SessionUpdate::SuggestionsLoaded { count })
            }
            SessionEvent::Conversations { serial, result } => {
                if serial != self.list_serial {
                    return None;
                }
                self.list_task = None;
                self.conversations = result.unwrap_or_else(|e| {
                    tracing::warn!("Failed to load conversations: {}", e);
                    Vec::new()
                });
                self.hydrate_suggestions();
                Some(SessionUpdate::ConversationsLoaded {
                    count: self.conversations.len(),
                })
            }
            SessionEvent::ListActionDone { action, result } => match result {
                Ok(()) => {
                    self.refresh_conversations();
                    Some(SessionUpdate::ListActionDone(action))
                }
                Err(e) => {
                    tracing::warn!(?action, "Conversation update failed: {}", e);
                    Some(SessionUpdate::ListActionFailed {
                        action,
                        detail: e.to_string(),
                    })
                }
            },
        }
    }

    fn apply_chat(&mut self, event: ChatEvent) -> Option<SessionUpdate> {
        if let ChatEvent::History {
            conversation_id, ..
        } = &event
        {
            if self.active.as_deref() != Some(conversation_id.as_str()) {
                return None;
            }
        }

        let update = match self.chat.apply(event)? {
            ChatUpdate::Started { .. } => SessionUpdate::AnswerStarted,
            ChatUpdate::Delta { text } => SessionUpdate::AnswerDelta { text },
            ChatUpdate::Completed { text } => SessionUpdate::AnswerCompleted { text },
            ChatUpdate::Failed { detail } => SessionUpdate::AnswerFailed { detail },
            ChatUpdate::Hydrated {
                conversation_id,
                count,
            } => SessionUpdate::MessagesLoaded {
                conversation_id,
                count,
            },
        };
        Some(update)
    }

    fn upload_outcome(&mut self, outcome: UploadOutcome) -> SessionUpdate {
        match outcome {
            UploadOutcome::Updated => SessionUpdate::Upload(self.upload.display().clone()),
            UploadOutcome::Ready {
                conversation_id,
                fingerprint,
            } => {
                // Keep the finished display visible while hydrating
                self.teardown();
                self.hydrate(&conversation_id, Some(&fingerprint));
                self.refresh_conversations();
                SessionUpdate::ConversationReady { conversation_id }
            }
            UploadOutcome::Failed { detail } => SessionUpdate::UploadFailed { detail },
        }
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(task) = self.list_task.take() {
            task.abort();
        }
    }
}
