//! Chat session: the message log and at most one pending answer
//!
//! State machine is `Idle -> Sending -> Streaming | Polling -> Idle`. `Sending`
//! covers task creation; once the server hands out a task id the answer is
//! either read from the event stream or fetched by polling the task. Any
//! terminal event, failure or teardown returns to `Idle`.

use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::errors::SessionError;
use super::events::{EventSender, SessionEvent};
use super::types::{Message, Role};
use crate::api::{AnswerEvent, ApiError, MessageRecord, TaskState, TranscriptApi};
use crate::config::{AnswerMode, SessionConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatState {
    #[default]
    Idle,
    Sending,
    Streaming,
    Polling,
}

#[derive(Debug)]
pub enum ChatEvent {
    /// Server accepted the question
    TaskCreated { serial: u64, task_id: String },
    Answer { serial: u64, event: AnswerEvent },
    /// Task creation, stream open, stream read or task poll failed
    Failed { serial: u64, error: ApiError },
    /// Stream ended without a terminal event
    Closed { serial: u64 },
    History {
        load: u64,
        conversation_id: String,
        result: Result<Vec<MessageRecord>, ApiError>,
    },
}

/// Log change derived from one chat event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatUpdate {
    Started { task_id: String },
    /// Current text of the streaming answer
    Delta { text: String },
    Completed { text: String },
    Failed { detail: String },
    Hydrated { conversation_id: String, count: usize },
}

struct PendingAnswer {
    serial: u64,
    conversation_id: String,
    mode: AnswerMode,
    /// Index of the agent placeholder in the log
    placeholder: usize,
    handle: JoinHandle<()>,
}

struct HistoryLoad {
    serial: u64,
    handle: JoinHandle<()>,
}

pub struct ChatSession {
    api: Arc<dyn TranscriptApi>,
    events: EventSender,
    user_id: String,
    mode: AnswerMode,
    task_poll_interval: Duration,
    task_timeout: Duration,
    messages: Vec<Message>,
    state: ChatState,
    answer: Option<PendingAnswer>,
    next_answer_serial: u64,
    history: Option<HistoryLoad>,
    next_history_serial: u64,
    last_error: Option<String>,
}

/// Apply a cumulative delta to `current`
///
/// Deltas carry the whole answer so far, so the text is replaced wholesale.
/// A re-delivered earlier delta (a strict prefix of what is shown) is ignored.
/// Returns whether the text changed.
pub fn apply_delta(current: &mut String, accumulated: &str) -> bool {
    if accumulated.len() < current.len() && current.starts_with(accumulated) {
        return false;
    }
    if current == accumulated {
        return false;
    }
    current.clear();
    current.push_str(accumulated);
    true
}

/// Expand stored exchanges into log messages
pub fn expand_history(records: Vec<MessageRecord>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(records.len() * 2);
    for record in records {
        if let Some(prompt) = record.prompt {
            messages.push(Message::user(prompt));
        }
        if let Some(answer) = record.answer {
            messages.push(Message::agent(answer));
        }
    }
    messages
}

/// Poll `task_id` until it leaves `STARTED`
///
/// The finished task is translated into the terminal event a stream would
/// have delivered. Transient errors are retried on the next poll.
async fn poll_task(
    api: &dyn TranscriptApi,
    task_id: &str,
    interval: Duration,
) -> Result<AnswerEvent, ApiError> {
    loop {
        match api.get_task_status(task_id).await {
            Ok(status) => match status.status {
                TaskState::Started => {}
                TaskState::Failed => {
                    return Ok(AnswerEvent::Error {
                        error: status.failure,
                    });
                }
                TaskState::Success | TaskState::Unknown => {
                    let event = match status.answer_text() {
                        Some(text) => AnswerEvent::Done {
                            text: Some(text.to_string()),
                        },
                        None => AnswerEvent::Error {
                            error: Some("Task finished without an answer".to_string()),
                        },
                    };
                    return Ok(event);
                }
            },
            Err(e) if e.is_retryable() => {
                tracing::debug!(task_id, "Task status poll failed, retrying: {}", e);
            }
            Err(e) => return Err(e),
        }
        tokio::time::sleep(interval).await;
    }
}

impl ChatSession {
    pub fn new(api: Arc<dyn TranscriptApi>, events: EventSender, settings: &SessionConfig) -> Self {
        Self {
            api,
            events,
            user_id: settings.user_id.clone(),
            mode: settings.answer_mode,
            task_poll_interval: settings.task_poll_interval(),
            task_timeout: settings.task_timeout(),
            messages: Vec::new(),
            state: ChatState::Idle,
            answer: None,
            next_answer_serial: 0,
            history: None,
            next_history_serial: 0,
            last_error: None,
        }
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn state(&self) -> ChatState {
        self.state
    }

    /// Single source of truth for the busy gate
    pub fn is_busy(&self) -> bool {
        self.state != ChatState::Idle
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.mode
    }

    /// Mode used by the next question; an answer in flight keeps its own
    pub fn set_answer_mode(&mut self, mode: AnswerMode) {
        self.mode = mode;
    }

    /// Ask `text` against `conversation_id`
    ///
    /// The user message and an empty agent placeholder are appended before any
    /// network activity.
    pub fn send(&mut self, conversation_id: Option<&str>, text: &str) -> Result<(), SessionError> {
        let prompt = text.trim();
        if prompt.is_empty() {
            return Err(SessionError::EmptyQuestion);
        }
        let conversation_id = conversation_id.ok_or(SessionError::NoActiveConversation)?;
        if self.is_busy() {
            return Err(SessionError::Busy);
        }

        self.messages.push(Message::user(prompt));
        self.messages.push(Message::agent(String::new()));
        let placeholder = self.messages.len() - 1;
        self.state = ChatState::Sending;
        self.last_error = None;

        self.next_answer_serial += 1;
        let serial = self.next_answer_serial;
        let mode = self.mode;
        let (interval, timeout) = (self.task_poll_interval, self.task_timeout);
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let user_id = self.user_id.clone();
        let cid = conversation_id.to_string();
        let prompt = prompt.to_string();

        let handle = tokio::spawn(async move {
            let emit = |event: ChatEvent| events.send(SessionEvent::Chat(event)).is_ok();

            let stream = mode == AnswerMode::Stream;
            let ticket = match api.ask_question(&cid, &user_id, &prompt, stream).await {
                Ok(ticket) => ticket,
                Err(error) => {
                    emit(ChatEvent::Failed { serial, error });
                    return;
                }
            };
            if !emit(ChatEvent::TaskCreated {
                serial,
                task_id: ticket.task_id.clone(),
            }) {
                return;
            }

            if !stream {
                let polled = poll_task(api.as_ref(), &ticket.task_id, interval);
                let event = match tokio::time::timeout(timeout, polled).await {
                    Ok(Ok(event)) => ChatEvent::Answer { serial, event },
                    Ok(Err(error)) => ChatEvent::Failed { serial, error },
                    Err(_) => ChatEvent::Failed {
                        serial,
                        error: ApiError::Other(format!(
                            "Answer did not complete within {}s",
                            timeout.as_secs()
                        )),
                    },
                };
                emit(event);
                return;
            }

            let mut stream = match api.open_answer_stream(&ticket.task_id).await {
                Ok(stream) => stream,
                Err(error) => {
                    emit(ChatEvent::Failed { serial, error });
                    return;
                }
            };

            while let Some(item) = stream.next().await {
                match item {
                    Ok(event) => {
                        let terminal = event.is_terminal();
                        if !emit(ChatEvent::Answer { serial, event }) || terminal {
                            return;
                        }
                    }
                    Err(error) => {
                        emit(ChatEvent::Failed { serial, error });
                        return;
                    }
                }
            }
            emit(ChatEvent::Closed { serial });
        });

        tracing::info!(conversation_id, serial, ?mode, "Question sent");
        self.answer = Some(PendingAnswer {
            serial,
            conversation_id: conversation_id.to_string(),
            mode,
            placeholder,
            handle,
        });
        Ok(())
    }

    /// Fetch stored messages for `conversation_id`
    ///
    /// History is placed ahead of anything already in the log, so a question
    /// asked before the fetch resolves keeps its place at the end.
    pub fn load_history(&mut self, conversation_id: &str) {
        self.cancel_history();

        self.next_history_serial += 1;
        let load = self.next_history_serial;
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let conversation_id = conversation_id.to_string();

        let handle = tokio::spawn(async move {
            let result = api.get_messages(&conversation_id).await;
            let _ = events.send(SessionEvent::Chat(ChatEvent::History {
                load,
                conversation_id,
                result,
            }));
        });
        self.history = Some(HistoryLoad {
            serial: load,
            handle,
        });
    }

    fn cancel_history(&mut self) {
        if let Some(history) = self.history.take() {
            history.handle.abort();
        }
    }

    /// Stop the pending answer (stream or poll); calling it again is a no-op
    pub fn cancel_answer(&mut self) {
        if let Some(answer) = self.answer.take() {
            answer.handle.abort();
            tracing::debug!(serial = answer.serial, "Pending answer cancelled");
        }
        self.state = ChatState::Idle;
    }

    /// Cancel the pending answer and history loading, then empty the log
    pub fn clear(&mut self) {
        self.cancel_answer();
        self.cancel_history();
        self.messages.clear();
        self.last_error = None;
    }

    pub fn apply(&mut self, event: ChatEvent) -> Option<ChatUpdate> {
        match event {
            ChatEvent::History {
                load,
                conversation_id,
                result,
            } => self.apply_history(load, conversation_id, result),
            ChatEvent::TaskCreated { serial, task_id } => {
                self.state = match self.current_answer(serial)?.mode {
                    AnswerMode::Stream => ChatState::Streaming,
                    AnswerMode::Poll => ChatState::Polling,
                };
                tracing::debug!(%task_id, "Answer task created");
                Some(ChatUpdate::Started { task_id })
            }
            ChatEvent::Answer { serial, event } => {
                self.current_answer(serial)?;
                self.apply_answer(event)
            }
            ChatEvent::Failed { serial, error } => {
                self.current_answer(serial)?;
                tracing::warn!("Answer failed: {}", error);
                Some(self.fail(error.to_string()))
            }
            ChatEvent::Closed { serial } => {
                let placeholder = self.current_answer(serial)?.placeholder;
                if self.messages[placeholder].text.is_empty() {
                    Some(self.fail("Answer stream closed unexpectedly".to_string()))
                } else {
                    Some(self.finish())
                }
            }
        }
    }

    /// The pending answer if `serial` identifies it
    fn current_answer(&self, serial: u64) -> Option<&PendingAnswer> {
        match &self.answer {
            Some(answer) if answer.serial == serial => Some(answer),
            _ => {
                tracing::debug!(serial, "Dropping event from a cancelled answer");
                None
            }
        }
    }

    fn apply_answer(&mut self, event: AnswerEvent) -> Option<ChatUpdate> {
        let placeholder = self.answer.as_ref()?.placeholder;
        match event {
            AnswerEvent::Delta { accumulated } => {
                self.state = ChatState::Streaming;
                let text = &mut self.messages[placeholder].text;
                if !apply_delta(text, &accumulated) {
                    return None;
                }
                Some(ChatUpdate::Delta { text: text.clone() })
            }
            AnswerEvent::Done { text } => {
                if let Some(text) = text.filter(|t| !t.is_empty()) {
                    self.messages[placeholder].text = text;
                }
                Some(self.finish())
            }
            AnswerEvent::End => Some(self.finish()),
            AnswerEvent::Error { error } => {
                let detail = error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Answer generation failed".to_string());
                tracing::warn!("Answer error: {}", detail);
                Some(self.fail(detail))
            }
        }
    }

    fn finish(&mut self) -> ChatUpdate {
        let (text, conversation_id) = match &self.answer {
            Some(answer) => (
                self.messages[answer.placeholder].text.clone(),
                answer.conversation_id.clone(),
            ),
            None => (String::new(), String::new()),
        };
        self.cancel_answer();
        tracing::info!(%conversation_id, chars = text.len(), "Answer completed");
        ChatUpdate::Completed { text }
    }

    fn fail(&mut self, detail: String) -> ChatUpdate {
        if let Some(answer) = &self.answer {
            let message = &mut self.messages[answer.placeholder];
            if message.role == Role::Agent && message.text.is_empty() {
                message.text = format!("Error: {}", detail);
            }
        }
        self.last_error = Some(detail.clone());
        self.cancel_answer();
        ChatUpdate::Failed { detail }
    }

    fn apply_history(
        &mut self,
        load: u64,
        conversation_id: String,
        result: Result<Vec<MessageRecord>, ApiError>,
    ) -> Option<ChatUpdate> {
        match &self.history {
            Some(history) if history.serial == load => {}
            _ => {
                tracing::debug!(%conversation_id, "Dropping stale history");
                return None;
            }
        }
        self.history = None;

        let mut log = match result {
            Ok(records) => expand_history(records),
            Err(e) => {
                tracing::warn!(%conversation_id, "Failed to load messages: {}", e);
                Vec::new()
            }
        };
        let count = log.len();
        if let Some(answer) = self.answer.as_mut() {
            answer.placeholder += count;
        }
        log.append(&mut self.messages);
        self.messages = log;

        Some(ChatUpdate::Hydrated {
            conversation_id,
            count,
        })
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.cancel_answer();
        self.cancel_history();
    }
}
