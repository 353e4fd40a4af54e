//! transcript-client: audio upload, processing tracking and streamed Q&A
//!
//! This library provides:
//! - A typed client for the transcript service (upload, status, history, answer stream)
//! - The session orchestration that takes a file from upload to a ready conversation
//! - A streamed question/answer session with stale-result protection on conversation switch
//! - The command implementations behind the `transcript` binary

pub mod api;
pub mod config;
pub mod core;
pub mod transport;

pub use api::{HttpTranscriptApi, TranscriptApi};
pub use config::Config;
pub use crate::core::{SessionCoordinator, SessionUpdate};
