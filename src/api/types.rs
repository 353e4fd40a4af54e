//! Wire types exchanged with the transcript service

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// An audio file selected for upload
#[derive(Debug, Clone)]
pub struct AudioFile {
    pub file_name: String,
    pub content_type: String,
    pub data: Arc<Vec<u8>>,
}

impl AudioFile {
    pub fn new(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let content_type = guess_content_type(&file_name).to_string();
        Self {
            file_name,
            content_type,
            data: Arc::new(data),
        }
    }

    /// Read a file from disk
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        Ok(Self::new(file_name, data))
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Lowercased file extension, if any
    pub fn extension(&self) -> Option<String> {
        Path::new(&self.file_name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }
}

fn guess_content_type(file_name: &str) -> &'static str {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase());
    match ext.as_deref() {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") | Some("mp4") => "audio/mp4",
        Some("ogg") | Some("oga") => "audio/ogg",
        Some("flac") => "audio/flac",
        Some("webm") => "audio/webm",
        _ => "application/octet-stream",
    }
}

/// Result of a completed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadReceipt {
    #[serde(alias = "conversation_uuid")]
    pub conversation_id: String,
    /// Content fingerprint the server keys processing status and suggestions by
    #[serde(alias = "file_hash")]
    pub fingerprint: String,
    /// Identical content was already processed; no processing phase follows
    #[serde(default, alias = "cached")]
    pub is_cached: bool,
}

/// Server-side processing state for a fingerprint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingState {
    Uploading,
    Processing,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

impl ProcessingState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessingState::Completed | ProcessingState::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: ProcessingState,
    #[serde(default)]
    pub percent: Option<f64>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl StatusReport {
    pub fn new(status: ProcessingState) -> Self {
        Self {
            status,
            percent: None,
            stage: None,
            error: None,
        }
    }

    pub fn with_percent(mut self, percent: f64) -> Self {
        self.percent = Some(percent);
        self
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Conversation metadata as listed by the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    #[serde(alias = "uuid")]
    pub id: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "file_hash")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
}

impl ConversationSummary {
    pub fn display_title(&self) -> &str {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .unwrap_or("Untitled conversation")
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConversationList {
    #[serde(default)]
    pub conversations: Vec<ConversationSummary>,
}

/// One stored question/answer exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRecord {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct MessageList {
    #[serde(default)]
    pub messages: Vec<MessageRecord>,
}

/// A quick-reply prompt offered for processed content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub id: String,
    pub label: String,
    pub prompt: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SuggestionList {
    #[serde(default)]
    pub suggestions: Vec<Suggestion>,
}

/// Server handle for an answer being generated
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTicket {
    pub task_id: String,
}

/// Lifecycle of an answer task as reported by `GET /transcript/task/{id}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskState {
    Started,
    Success,
    Failed,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskResult {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatus {
    pub status: TaskState,
    #[serde(default)]
    pub result: Option<TaskResult>,
    /// Reason given for a failed task
    #[serde(default)]
    pub failure: Option<String>,
}

impl TaskStatus {
    pub fn new(status: TaskState) -> Self {
        Self {
            status,
            result: None,
            failure: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.result = Some(TaskResult {
            text: Some(text.into()),
        });
        self
    }

    pub fn with_failure(mut self, failure: impl Into<String>) -> Self {
        self.failure = Some(failure.into());
        self
    }

    /// Answer text of a finished task, if it carries any
    pub fn answer_text(&self) -> Option<&str> {
        self.result
            .as_ref()?
            .text
            .as_deref()
            .filter(|t| !t.trim().is_empty())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    #[serde(default)]
    pub active_conversations: usize,
    #[serde(default)]
    pub active_tasks: usize,
}

/// Body of `POST /transcript/task`
#[derive(Debug, Serialize)]
pub(crate) struct TaskRequest<'a> {
    pub conversation: TaskConversation<'a>,
    pub message: TaskMessage<'a>,
    pub stream: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskConversation<'a> {
    pub uuid: &'a str,
    pub user_uuid: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskMessage<'a> {
    pub uuid: String,
    pub user_uuid: &'a str,
    pub conversation_uuid: &'a str,
    pub prompt: &'a str,
}

/// One event of a streamed answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerEvent {
    /// Full answer text accumulated so far
    Delta { accumulated: String },
    /// Generation finished; may carry the final text
    Done { text: Option<String> },
    /// Server closed the stream
    End,
    Error { error: Option<String> },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum AnswerPayload {
    Delta {
        #[serde(default)]
        accumulated: Option<String>,
    },
    Done {
        #[serde(default)]
        text: Option<String>,
    },
    End,
    Error {
        #[serde(default)]
        error: Option<String>,
    },
}

impl AnswerEvent {
    /// Parse one stream payload; `None` for malformed or unrecognised payloads
    pub fn parse(payload: &str) -> Option<Self> {
        let parsed: AnswerPayload = serde_json::from_str(payload).ok()?;
        match parsed {
            AnswerPayload::Delta { accumulated } => {
                accumulated.map(|accumulated| AnswerEvent::Delta { accumulated })
            }
            AnswerPayload::Done { text } => Some(AnswerEvent::Done { text }),
            AnswerPayload::End => Some(AnswerEvent::End),
            AnswerPayload::Error { error } => Some(AnswerEvent::Error { error }),
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, AnswerEvent::Delta { .. })
    }
}
