//! Events produced by background session tasks
//!
//! Every spawned task (upload, poll loop, answer stream, fetches) reports back
//! over one unbounded channel. The coordinator is the single consumer and
//! applies events one at a time, dropping those whose run/serial number no
//! longer matches the live operation.

use tokio::sync::mpsc;

use super::chat::ChatEvent;
use super::monitor::MonitorEvent;
use super::suggestions::SuggestionEvent;
use super::upload::UploadEvent;
use crate::api::{ApiError, ConversationSummary};

/// Server-side list operation issued by the coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListAction {
    Rename { conversation_id: String, title: String },
    Delete { conversation_id: String },
    ClearHistory,
}

#[derive(Debug)]
pub enum SessionEvent {
    Upload(UploadEvent),
    Monitor(MonitorEvent),
    Chat(ChatEvent),
    Suggestions(SuggestionEvent),

    /// Conversation list fetched
    Conversations {
        serial: u64,
        result: Result<Vec<ConversationSummary>, ApiError>,
    },

    /// Rename/delete/clear finished on the server
    ListActionDone {
        action: ListAction,
        result: Result<(), ApiError>,
    },
}

pub type EventSender = mpsc::UnboundedSender<SessionEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;
