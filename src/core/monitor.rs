//! Processing status poll loop
//!
//! One loop per fingerprint, ticking on a fixed cadence. Each tick first emits
//! a [`MonitorEvent::Tick`] (the estimate countdown) and then the result of a
//! status query ([`MonitorEvent::Polled`]). Queries run sequentially, so a slow
//! response delays the next tick instead of overlapping it.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::estimate::{EstimateCountdown, READY};
use super::events::{EventSender, SessionEvent};
use crate::api::{ApiError, ProcessingState, StatusReport, TranscriptApi};

#[derive(Debug)]
pub enum MonitorEvent {
    Tick {
        run: u64,
    },
    Polled {
        run: u64,
        result: Result<StatusReport, ApiError>,
    },
}

/// Display change derived from one monitor event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorUpdate {
    /// New estimate text
    Estimate(String),
    /// `stage: None` keeps the previous label
    Progress { percent: u8, stage: Option<String> },
    Completed {
        conversation_id: String,
        fingerprint: String,
        estimate: String,
    },
    Failed { detail: String },
    /// Transient query failure or unrecognised status; loop keeps going
    Retrying,
}

struct MonitorRun {
    id: u64,
    fingerprint: String,
    conversation_id: String,
    handle: JoinHandle<()>,
}

pub struct ProcessingMonitor {
    api: Arc<dyn TranscriptApi>,
    events: EventSender,
    interval: Duration,
    run: Option<MonitorRun>,
    next_run_id: u64,
    countdown: EstimateCountdown,
}

impl ProcessingMonitor {
    pub fn new(api: Arc<dyn TranscriptApi>, events: EventSender, interval: Duration) -> Self {
        Self {
            api,
            events,
            interval,
            run: None,
            next_run_id: 0,
            countdown: EstimateCountdown::indeterminate(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn fingerprint(&self) -> Option<&str> {
        self.run.as_ref().map(|r| r.fingerprint.as_str())
    }

    /// Start polling `fingerprint`; any previous loop is stopped first
    pub fn start(
        &mut self,
        fingerprint: &str,
        conversation_id: &str,
        countdown: EstimateCountdown,
    ) {
        self.stop();

        self.next_run_id += 1;
        let run = self.next_run_id;
        self.countdown = countdown;

        let api = Arc::clone(&self.api);
        let events = self.events.clone();
        let interval = self.interval;
        let polled = fingerprint.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                if events
                    .send(SessionEvent::Monitor(MonitorEvent::Tick { run }))
                    .is_err()
                {
                    break;
                }

                let result = api.get_processing_status(&polled).await;
                let terminal = matches!(&result, Ok(report) if report.status.is_terminal());
                if events
                    .send(SessionEvent::Monitor(MonitorEvent::Polled { run, result }))
                    .is_err()
                    || terminal
                {
                    break;
                }
            }
        });

        tracing::info!(fingerprint, run, "Processing monitor started");
        self.run = Some(MonitorRun {
            id: run,
            fingerprint: fingerprint.to_string(),
            conversation_id: conversation_id.to_string(),
            handle,
        });
    }

    /// Stop the loop; calling it again is a no-op
    pub fn stop(&mut self) {
        if let Some(run) = self.run.take() {
            run.handle.abort();
            tracing::debug!(run = run.id, "Processing monitor stopped");
        }
    }

    /// Apply one event; `None` when it belongs to a stopped loop
    pub fn apply(&mut self, event: MonitorEvent) -> Option<MonitorUpdate> {
        let current = self.run.as_ref()?.id;
        match event {
            MonitorEvent::Tick { run } if run == current => {
                self.countdown.tick();
                Some(MonitorUpdate::Estimate(self.countdown.display()))
            }
            MonitorEvent::Polled { run, result } if run == current => {
                Some(self.apply_status(result))
            }
            _ => {
                tracing::debug!("Dropping event from a stopped monitor loop");
                None
            }
        }
    }

    fn apply_status(&mut self, result: Result<StatusReport, ApiError>) -> MonitorUpdate {
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!("Status query failed, will retry: {}", e);
                return MonitorUpdate::Retrying;
            }
        };

        match report.status {
            ProcessingState::Uploading | ProcessingState::Processing => {
                let percent = report.percent.unwrap_or(0.0).round().clamp(0.0, 100.0) as u8;
                tracing::debug!(percent, stage = ?report.stage, "Processing progress");
                MonitorUpdate::Progress {
                    percent,
                    stage: report.stage.filter(|s| !s.trim().is_empty()),
                }
            }
            ProcessingState::Completed => {
                let (conversation_id, fingerprint) = match self.run.take() {
                    Some(run) => {
                        run.handle.abort();
                        (run.conversation_id, run.fingerprint)
                    }
                    None => (String::new(), String::new()),
                };
                tracing::info!(%conversation_id, "Processing completed");
                MonitorUpdate::Completed {
                    conversation_id,
                    fingerprint,
                    estimate: READY.to_string(),
                }
            }
            ProcessingState::Error => {
                self.stop();
                let detail = report
                    .error
                    .filter(|e| !e.trim().is_empty())
                    .unwrap_or_else(|| "Processing failed".to_string());
                tracing::warn!("Processing failed: {}", detail);
                MonitorUpdate::Failed { detail }
            }
            ProcessingState::Unknown => {
                tracing::debug!("Unrecognised processing status, keep polling");
                MonitorUpdate::Retrying
            }
        }
    }
}

impl Drop for ProcessingMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
