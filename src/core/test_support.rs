//! Scripted [`TranscriptApi`] double for session tests

use async_trait::async_trait;
use futures::stream::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::api::{
    AnswerEvent, AnswerStream, ApiError, AudioFile, ConversationSummary, HealthReport,
    MessageRecord, ProcessingState, ProgressCallback, StatusReport, Suggestion, TaskState,
    TaskStatus, TaskTicket, TranscriptApi, UploadReceipt,
};

pub(crate) type AnswerSender = mpsc::UnboundedSender<Result<AnswerEvent, ApiError>>;

#[derive(Default)]
pub(crate) struct FakeApi {
    upload: Mutex<Option<Result<UploadReceipt, String>>>,
    upload_progress: Mutex<Vec<u8>>,
    upload_delay: Mutex<Duration>,
    uploads: Mutex<Vec<String>>,

    statuses: Mutex<VecDeque<Result<StatusReport, String>>>,
    status_delay: Mutex<Duration>,
    status_calls: Mutex<Vec<String>>,

    conversations: Mutex<Vec<ConversationSummary>>,
    messages: Mutex<HashMap<String, Vec<MessageRecord>>>,
    message_delays: Mutex<HashMap<String, Duration>>,
    suggestions: Mutex<HashMap<String, Vec<Suggestion>>>,
    suggestion_calls: Mutex<Vec<String>>,

    asked: Mutex<Vec<(String, String)>>,
    stream_flags: Mutex<Vec<bool>>,
    task_statuses: Mutex<VecDeque<Result<TaskStatus, ApiError>>>,
    task_status_calls: Mutex<Vec<String>>,
    answers: Mutex<VecDeque<mpsc::UnboundedReceiver<Result<AnswerEvent, ApiError>>>>,

    deleted: Mutex<Vec<String>>,
    renamed: Mutex<Vec<(String, String)>>,
    cleared: Mutex<Vec<String>>,
}

pub(crate) fn receipt(
    conversation_id: &str,
    fingerprint: &str,
    is_cached: bool,
) -> UploadReceipt {
    UploadReceipt {
        conversation_id: conversation_id.to_string(),
        fingerprint: fingerprint.to_string(),
        is_cached,
    }
}

pub(crate) fn summary(id: &str, title: &str, fingerprint: &str) -> ConversationSummary {
    ConversationSummary {
        id: id.to_string(),
        title: Some(title.to_string()),
        fingerprint: Some(fingerprint.to_string()),
        created_at: Some("2024-05-01T10:00:00Z".to_string()),
    }
}

pub(crate) fn suggestion(id: &str, prompt: &str) -> Suggestion {
    Suggestion {
        id: id.to_string(),
        label: prompt.to_string(),
        prompt: prompt.to_string(),
    }
}

pub(crate) fn delta(accumulated: &str) -> AnswerEvent {
    AnswerEvent::Delta {
        accumulated: accumulated.to_string(),
    }
}

impl FakeApi {
    pub fn set_upload(&self, result: Result<UploadReceipt, &str>) {
        *self.upload.lock().unwrap() = Some(result.map_err(str::to_string));
    }

    pub fn set_upload_progress(&self, steps: &[u8]) {
        *self.upload_progress.lock().unwrap() = steps.to_vec();
    }

    pub fn set_upload_delay(&self, delay: Duration) {
        *self.upload_delay.lock().unwrap() = delay;
    }

    pub fn uploads(&self) -> Vec<String> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn push_status(&self, report: StatusReport) {
        self.statuses.lock().unwrap().push_back(Ok(report));
    }

    pub fn push_status_error(&self, message: &str) {
        self.statuses
            .lock()
            .unwrap()
            .push_back(Err(message.to_string()));
    }

    pub fn set_status_delay(&self, delay: Duration) {
        *self.status_delay.lock().unwrap() = delay;
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }

    pub fn set_conversations(&self, conversations: Vec<ConversationSummary>) {
        *self.conversations.lock().unwrap() = conversations;
    }

    pub fn set_messages(&self, conversation_id: &str, records: Vec<MessageRecord>) {
        self.messages
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), records);
    }

    pub fn set_message_delay(&self, conversation_id: &str, delay: Duration) {
        self.message_delays
            .lock()
            .unwrap()
            .insert(conversation_id.to_string(), delay);
    }

    pub fn set_suggestions(&self, fingerprint: &str, items: Vec<Suggestion>) {
        self.suggestions
            .lock()
            .unwrap()
            .insert(fingerprint.to_string(), items);
    }

    pub fn suggestion_calls(&self) -> Vec<String> {
        self.suggestion_calls.lock().unwrap().clone()
    }

    pub fn asked(&self) -> Vec<(String, String)> {
        self.asked.lock().unwrap().clone()
    }

    /// `stream` flag of every task created, in order
    pub fn stream_flags(&self) -> Vec<bool> {
        self.stream_flags.lock().unwrap().clone()
    }

    /// Queue the next task status; an empty queue reports `STARTED`
    pub fn push_task_status(&self, status: TaskStatus) {
        self.task_statuses.lock().unwrap().push_back(Ok(status));
    }

    pub fn push_task_error(&self, error: ApiError) {
        self.task_statuses.lock().unwrap().push_back(Err(error));
    }

    pub fn task_status_calls(&self) -> Vec<String> {
        self.task_status_calls.lock().unwrap().clone()
    }

    /// Queue an answer stream that yields `events` and then ends
    pub fn script_answer(&self, events: Vec<AnswerEvent>) {
        let tx = self.manual_answer();
        for event in events {
            let _ = tx.send(Ok(event));
        }
    }

    /// Queue an answer stream driven by the returned sender
    pub fn manual_answer(&self) -> AnswerSender {
        let (tx, rx) = mpsc::unbounded_channel();
        self.answers.lock().unwrap().push_back(rx);
        tx
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn renamed(&self) -> Vec<(String, String)> {
        self.renamed.lock().unwrap().clone()
    }

    pub fn cleared(&self) -> Vec<String> {
        self.cleared.lock().unwrap().clone()
    }
}

#[async_trait]
impl TranscriptApi for FakeApi {
    async fn health(&self) -> Result<HealthReport, ApiError> {
        Ok(HealthReport {
            status: "healthy".to_string(),
            active_conversations: 0,
            active_tasks: 0,
        })
    }

    async fn upload_audio(
        &self,
        file: &AudioFile,
        _user_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<UploadReceipt, ApiError> {
        self.uploads.lock().unwrap().push(file.file_name.clone());
        let steps = self.upload_progress.lock().unwrap().clone();
        for percent in steps {
            on_progress(percent);
        }
        let delay = *self.upload_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.upload.lock().unwrap().clone();
        match scripted {
            Some(Ok(receipt)) => Ok(receipt),
            Some(Err(message)) => Err(ApiError::Network(message)),
            None => Err(ApiError::Network("no upload scripted".to_string())),
        }
    }

    async fn get_processing_status(&self, fingerprint: &str) -> Result<StatusReport, ApiError> {
        self.status_calls
            .lock()
            .unwrap()
            .push(fingerprint.to_string());
        let delay = *self.status_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(Ok(report)) => Ok(report),
            Some(Err(message)) => Err(ApiError::Network(message)),
            None => Ok(StatusReport::new(ProcessingState::Processing)),
        }
    }

    async fn get_conversations(
        &self,
        _user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        Ok(self.conversations.lock().unwrap().clone())
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let delay = self
            .message_delays
            .lock()
            .unwrap()
            .get(conversation_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.messages
            .lock()
            .unwrap()
            .get(conversation_id)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(conversation_id.to_string()))
    }

    async fn get_suggestions(&self, fingerprint: &str) -> Result<Vec<Suggestion>, ApiError> {
        self.suggestion_calls
            .lock()
            .unwrap()
            .push(fingerprint.to_string());
        self.suggestions
            .lock()
            .unwrap()
            .get(fingerprint)
            .cloned()
            .ok_or_else(|| ApiError::NotFound(fingerprint.to_string()))
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        self.deleted
            .lock()
            .unwrap()
            .push(conversation_id.to_string());
        self.conversations
            .lock()
            .unwrap()
            .retain(|c| c.id != conversation_id);
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), ApiError> {
        self.renamed
            .lock()
            .unwrap()
            .push((conversation_id.to_string(), title.to_string()));
        for conversation in self.conversations.lock().unwrap().iter_mut() {
            if conversation.id == conversation_id {
                conversation.title = Some(title.to_string());
            }
        }
        Ok(())
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), ApiError> {
        self.cleared.lock().unwrap().push(user_id.to_string());
        self.conversations.lock().unwrap().clear();
        Ok(())
    }

    async fn ask_question(
        &self,
        conversation_id: &str,
        _user_id: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<TaskTicket, ApiError> {
        self.stream_flags.lock().unwrap().push(stream);
        let mut asked = self.asked.lock().unwrap();
        asked.push((conversation_id.to_string(), prompt.to_string()));
        Ok(TaskTicket {
            task_id: format!("task-{}", asked.len()),
        })
    }

    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        self.task_status_calls
            .lock()
            .unwrap()
            .push(task_id.to_string());
        let next = self.task_statuses.lock().unwrap().pop_front();
        next.unwrap_or_else(|| Ok(TaskStatus::new(TaskState::Started)))
    }

    async fn open_answer_stream(&self, task_id: &str) -> Result<AnswerStream, ApiError> {
        let rx = self
            .answers
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ApiError::NotFound(format!("Task {} not found", task_id)))?;
        Ok(futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        })
        .boxed())
    }
}
