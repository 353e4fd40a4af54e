//! Upload pipeline: one audio file from selection to a ready conversation

use std::sync::Arc;
use tokio::task::JoinHandle;

use super::estimate::{EstimateCountdown, READY};
use super::events::{EventSender, SessionEvent};
use super::media;
use super::monitor::{MonitorEvent, MonitorUpdate, ProcessingMonitor};
use super::types::{UploadDisplay, UploadPhase};
use crate::api::{ApiError, AudioFile, ProgressCallback, TranscriptApi, UploadReceipt};
use crate::config::SessionConfig;

#[derive(Debug)]
pub enum UploadEvent {
    Progress {
        job: u64,
        percent: u8,
    },
    Finished {
        job: u64,
        result: Result<UploadReceipt, ApiError>,
    },
}

/// Result of applying an upload or monitor event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    /// Display changed; read it from [`UploadPipeline::display`]
    Updated,
    Ready {
        conversation_id: String,
        fingerprint: String,
    },
    Failed {
        detail: String,
    },
}

struct UploadJob {
    id: u64,
    handle: JoinHandle<()>,
}

pub struct UploadPipeline {
    api: Arc<dyn TranscriptApi>,
    events: EventSender,
    user_id: String,
    estimate_divisor: u64,
    estimate_overhead_secs: u64,
    monitor: ProcessingMonitor,
    job: Option<UploadJob>,
    next_job_id: u64,
    countdown: EstimateCountdown,
    display: UploadDisplay,
}

impl UploadPipeline {
    pub fn new(api: Arc<dyn TranscriptApi>, events: EventSender, settings: &SessionConfig) -> Self {
        let monitor = ProcessingMonitor::new(
            Arc::clone(&api),
            events.clone(),
            settings.poll_interval(),
        );
        Self {
            api,
            events,
            user_id: settings.user_id.clone(),
            estimate_divisor: settings.estimate_divisor,
            estimate_overhead_secs: settings.estimate_overhead_secs,
            monitor,
            job: None,
            next_job_id: 0,
            countdown: EstimateCountdown::indeterminate(),
            display: UploadDisplay::default(),
        }
    }

    pub fn display(&self) -> &UploadDisplay {
        &self.display
    }

    pub fn is_monitoring(&self) -> bool {
        self.monitor.is_running()
    }

    /// Start uploading `file`, replacing any upload already in flight
    pub fn submit(&mut self, file: AudioFile) {
        self.reset();

        self.countdown = match media::read_duration(&file) {
            Ok(duration) => EstimateCountdown::from_duration(
                duration,
                self.estimate_divisor,
                self.estimate_overhead_secs,
            ),
            Err(e) => {
                tracing::debug!("No duration for {}: {}", file.file_name, e);
                EstimateCountdown::indeterminate()
            }
        };

        self.display = UploadDisplay {
            phase: UploadPhase::Uploading,
            percent: 0,
            stage: None,
            estimate: Some(self.countdown.display()),
            error: None,
            file_name: Some(file.file_name.clone()),
        };

        self.next_job_id += 1;
        let job = self.next_job_id;
        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let user_id = self.user_id.clone();

        tracing::info!(file = %file.file_name, bytes = file.len(), "Upload started");
        let handle = tokio::spawn(async move {
            let progress_events = events.clone();
            let on_progress: ProgressCallback = Arc::new(move |percent| {
                let progress = UploadEvent::Progress { job, percent };
                let _ = progress_events.send(SessionEvent::Upload(progress));
            });
            let result = api.upload_audio(&file, &user_id, on_progress).await;
            let _ = events.send(SessionEvent::Upload(UploadEvent::Finished { job, result }));
        });
        self.job = Some(UploadJob { id: job, handle });
    }

    /// Abort the upload and the poll loop; the in-flight flags are cleared
    /// but the last percent and estimate stay visible
    pub fn cancel(&mut self) {
        if let Some(job) = self.job.take() {
            job.handle.abort();
            tracing::debug!(job = job.id, "Upload cancelled");
        }
        self.monitor.stop();
        if self.display.in_flight() {
            self.display.phase = UploadPhase::Idle;
        }
    }

    /// Cancel and clear the display entirely
    pub fn reset(&mut self) {
        self.cancel();
        self.countdown = EstimateCountdown::indeterminate();
        self.display = UploadDisplay::default();
    }

    pub fn apply(&mut self, event: UploadEvent) -> Option<UploadOutcome> {
        match event {
            UploadEvent::Progress { job, percent } => {
                if !self.is_current(job) || !self.display.is_uploading() {
                    return None;
                }
                // Never decreases within the upload phase
                let percent = percent.min(100);
                if percent <= self.display.percent {
                    return None;
                }
                self.display.percent = percent;
                Some(UploadOutcome::Updated)
            }
            UploadEvent::Finished { job, result } => {
                if !self.is_current(job) {
                    tracing::debug!(job, "Dropping result of a cancelled upload");
                    return None;
                }
                self.job = None;
                Some(self.finish(result))
            }
        }
    }

    fn is_current(&self, job: u64) -> bool {
        self.job.as_ref().is_some_and(|j| j.id == job)
    }

    fn finish(&mut self, result: Result<UploadReceipt, ApiError>) -> UploadOutcome {
        match result {
            Ok(receipt) if receipt.is_cached => {
                tracing::info!(conversation_id = %receipt.conversation_id, "Upload cache hit");
                self.mark_ready();
                UploadOutcome::Ready {
                    conversation_id: receipt.conversation_id,
                    fingerprint: receipt.fingerprint,
                }
            }
            Ok(receipt) => {
                tracing::info!(fingerprint = %receipt.fingerprint, "Upload complete, processing");
                self.display.phase = UploadPhase::Processing;
                self.display.percent = 0;
                self.display.stage = None;
                self.monitor
                    .start(&receipt.fingerprint, &receipt.conversation_id, self.countdown);
                UploadOutcome::Updated
            }
            Err(e) => {
                tracing::warn!("Upload failed: {}", e);
                self.fail(e.to_string())
            }
        }
    }

    pub fn apply_monitor(&mut self, event: MonitorEvent) -> Option<UploadOutcome> {
        match self.monitor.apply(event)? {
            MonitorUpdate::Estimate(text) => {
                self.display.estimate = Some(text);
                Some(UploadOutcome::Updated)
            }
            MonitorUpdate::Progress { percent, stage } => {
                self.display.percent = percent;
                if stage.is_some() {
                    self.display.stage = stage;
                }
                Some(UploadOutcome::Updated)
            }
            MonitorUpdate::Completed {
                conversation_id,
                fingerprint,
                estimate,
            } => {
                self.mark_ready();
                self.display.estimate = Some(estimate);
                Some(UploadOutcome::Ready {
                    conversation_id,
                    fingerprint,
                })
            }
            MonitorUpdate::Failed { detail } => Some(self.fail(detail)),
            MonitorUpdate::Retrying => None,
        }
    }

    fn mark_ready(&mut self) {
        self.display.phase = UploadPhase::Ready;
        self.display.percent = 100;
        self.display.estimate = Some(READY.to_string());
        self.display.error = None;
    }

    fn fail(&mut self, detail: String) -> UploadOutcome {
        self.monitor.stop();
        self.display.phase = UploadPhase::Failed;
        self.display.error = Some(detail.clone());
        UploadOutcome::Failed { detail }
    }
}
