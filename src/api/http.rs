//! reqwest implementation of the transcript service API

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::collections::VecDeque;
use std::time::Duration;
use url::Url;

use super::error::ApiError;
use super::sse::SseDecoder;
use super::types::{
    AnswerEvent, AudioFile, ConversationList, ConversationSummary, HealthReport, MessageList,
    MessageRecord, StatusReport, Suggestion, SuggestionList, TaskConversation, TaskMessage,
    TaskRequest, TaskStatus, TaskTicket, UploadReceipt,
};
use super::{AnswerStream, ProgressCallback, TranscriptApi};
use crate::config::ServerConfig;

/// Upload body is handed to the transport in chunks of this size
const UPLOAD_CHUNK_BYTES: usize = 64 * 1024;

/// HTTP client for the transcript service
#[derive(Debug, Clone)]
pub struct HttpTranscriptApi {
    client: Client,
    base_url: Url,
    timeout: Duration,
    history_limit: usize,
}

impl HttpTranscriptApi {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            ApiError::Other(format!("Invalid server URL {}: {}", config.base_url, e))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ApiError::Other(format!(
                "Invalid server URL {}: not a base URL",
                config.base_url
            )));
        }

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(ApiError::from_network_error)?;

        Ok(Self {
            client,
            base_url,
            timeout: config.timeout(),
            history_limit: config.history_limit,
        })
    }

    /// Build an endpoint URL; each segment is percent-encoded
    fn url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::Other(format!("Invalid server URL {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(ApiError::from_network_error)?;
        check_status(response).await
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
    ) -> Result<T, ApiError> {
        let response = self.send(request).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }
}

async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ApiError::from_http_status(status, body))
}

fn percent_of(sent: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((sent as f64 / total as f64) * 100.0).round().clamp(0.0, 100.0) as u8
}

#[async_trait]
impl TranscriptApi for HttpTranscriptApi {
    async fn health(&self) -> Result<HealthReport, ApiError> {
        let url = self.url(&["health"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn upload_audio(
        &self,
        file: &AudioFile,
        user_id: &str,
        on_progress: ProgressCallback,
    ) -> Result<UploadReceipt, ApiError> {
        let url = self.url(&["upload"])?;
        let data = file.data.clone();
        let total = data.len();

        // Progress is reported as each chunk is pulled by the transport
        let mut sent = 0usize;
        let chunks = futures::stream::iter((0..total).step_by(UPLOAD_CHUNK_BYTES).map(
            move |start| {
                let end = (start + UPLOAD_CHUNK_BYTES).min(total);
                sent += end - start;
                on_progress(percent_of(sent, total));
                Ok::<Vec<u8>, std::io::Error>(data[start..end].to_vec())
            },
        ));

        let part = Part::stream_with_length(Body::wrap_stream(chunks), total as u64)
            .file_name(file.file_name.clone())
            .mime_str(&file.content_type)
            .map_err(|e| ApiError::Other(format!("Invalid content type: {}", e)))?;
        let form = Form::new()
            .part("file", part)
            .text("user_uuid", user_id.to_string());

        tracing::debug!(file = %file.file_name, bytes = total, "Uploading audio");
        self.send_json(self.client.post(url).multipart(form)).await
    }

    async fn get_processing_status(&self, fingerprint: &str) -> Result<StatusReport, ApiError> {
        let url = self.url(&["processing", "status", fingerprint])?;
        self.send_json(self.client.get(url)).await
    }

    async fn get_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, ApiError> {
        let url = self.url(&["conversations", "list"])?;
        let request = self.client.get(url).query(&[
            ("user_uuid", user_id.to_string()),
            ("limit", self.history_limit.to_string()),
        ]);
        let list: ConversationList = self.send_json(request).await?;
        Ok(list.conversations)
    }

    async fn get_messages(&self, conversation_id: &str) -> Result<Vec<MessageRecord>, ApiError> {
        let url = self.url(&["conversations", conversation_id, "messages"])?;
        let request = self
            .client
            .get(url)
            .query(&[("limit", self.history_limit.to_string())]);
        let list: MessageList = self.send_json(request).await?;
        Ok(list.messages)
    }

    async fn get_suggestions(&self, fingerprint: &str) -> Result<Vec<Suggestion>, ApiError> {
        let url = self.url(&["suggestions", fingerprint])?;
        let list: SuggestionList = self.send_json(self.client.get(url)).await?;
        Ok(list.suggestions)
    }

    async fn delete_conversation(&self, conversation_id: &str) -> Result<(), ApiError> {
        let url = self.url(&["conversations", conversation_id])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }

    async fn rename_conversation(
        &self,
        conversation_id: &str,
        title: &str,
    ) -> Result<(), ApiError> {
        let url = self.url(&["conversations", conversation_id])?;
        let body = serde_json::json!({ "title": title });
        self.send(self.client.patch(url).json(&body)).await?;
        Ok(())
    }

    async fn clear_history(&self, user_id: &str) -> Result<(), ApiError> {
        let url = self.url(&["conversations"])?;
        self.send(self.client.delete(url).query(&[("user_uuid", user_id)]))
            .await?;
        Ok(())
    }

    async fn ask_question(
        &self,
        conversation_id: &str,
        user_id: &str,
        prompt: &str,
        stream: bool,
    ) -> Result<TaskTicket, ApiError> {
        let url = self.url(&["transcript", "task"])?;
        let body = TaskRequest {
            conversation: TaskConversation {
                uuid: conversation_id,
                user_uuid: user_id,
            },
            message: TaskMessage {
                uuid: uuid::Uuid::new_v4().to_string(),
                user_uuid: user_id,
                conversation_uuid: conversation_id,
                prompt,
            },
            stream,
        };
        self.send_json(self.client.post(url).json(&body)).await
    }

    async fn get_task_status(&self, task_id: &str) -> Result<TaskStatus, ApiError> {
        let url = self.url(&["transcript", "task", task_id])?;
        self.send_json(self.client.get(url)).await
    }

    async fn open_answer_stream(&self, task_id: &str) -> Result<AnswerStream, ApiError> {
        let url = self.url(&["transcript", "task", task_id, "stream"])?;
        // No overall timeout here: the connection stays open for the whole answer
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .map_err(ApiError::from_network_error)?;
        let response = check_status(response).await?;

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();
        Ok(decode_answer_stream(body))
    }
}

struct SseState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    decoder: SseDecoder,
    pending: VecDeque<AnswerEvent>,
    finished: bool,
}

impl SseState {
    fn queue(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            match AnswerEvent::parse(&payload) {
                Some(event) => self.pending.push_back(event),
                None => tracing::debug!("Skipping unrecognised stream payload: {}", payload),
            }
        }
    }
}

/// Turn a raw SSE body into answer events, stopping after `end`
fn decode_answer_stream(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> AnswerStream {
    let state = SseState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
    };

    futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                if event == AnswerEvent::End {
                    state.pending.clear();
                    state.finished = true;
                }
                return Some((Ok(event), state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    let payloads = state.decoder.push(&chunk);
                    state.queue(payloads);
                }
                Some(Err(e)) => {
                    state.finished = true;
                    return Some((Err(ApiError::from_network_error(e)), state));
                }
                None => {
                    state.finished = true;
                    let payloads = state.decoder.finish();
                    state.queue(payloads);
                }
            }
        }
    })
    .boxed()
}
