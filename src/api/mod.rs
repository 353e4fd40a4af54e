//! Transcript service collaborators
//!
//! The orchestration core only talks to the server through [`TranscriptApi`];
//! [`HttpTranscriptApi`] is the reqwest-backed implementation used by the CLI.

pub mod error;
pub mod http;
pub mod sse;
pub mod types;

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::sync::Arc;

pub use error::ApiError;
pub use http::HttpTranscriptApi;
pub use types::{
    AnswerEvent, AudioFile, ConversationSummary, HealthReport, MessageRecord, ProcessingState,
    StatusReport, Suggestion, TaskResult, TaskState, TaskStatus, TaskTicket, UploadReceipt,
};

/// Called with the upload percentage (0-100) as bytes are handed to the transport
pub type ProgressCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Events of one answer, in delivery order
pub type AnswerStream = BoxStream<'static, Result<AnswerEvent, ApiError>>;

/// Operations the client consumes from the transcript service
#[async_trait]
pub trait TranscriptApi: Send + Sync {
    async fn health(&self) -> Result<HealthReport, ApiError>;

    async fn upload_audio(
        &self,
        file: &AudioFile,
        user_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<UploadReceipt, ApiError>;

    async fn get_processing_status(&self, fingerprint: &str) -> Result<StatusReport, ApiError>;

    async fn get_conversations(&self, user_id: &str)
        -> Result<Vec<ConversationSummary>, ApiError>;

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError>;

    async fn get_suggestions(&self, fingerprint: &str) -> Result<Vec<Suggestion>, ApiError>;

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError>;

    async fn rename_conversation(&self, conversation_id: &str, title: &str)
        -> Result<(), ApiError>;

    async fn clear_history(&self, user_id: &str) -> Result<(), ApiError>;

    async fn ask_question(
        &self,
        conversation_id: &str,
        user_id: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<TaskTicket, ApiError>;

    /// Current state of a task created by `ask_question`
    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError>;

    /// Open the incremental event stream for a task created with `stream` set
    async fn open_answer_stream(&self, task_id: &str) -> Result<AnswerStream, ApiError>;
}
