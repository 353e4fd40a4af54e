//! Client-side session orchestration
//!
//! The components here drive one audio file from upload to a ready
//! conversation and one question from send to a fully rendered answer.
//! [`SessionCoordinator`] owns the others and is the only consumer of the
//! events their background tasks produce.

pub mod chat;
pub mod coordinator;
pub mod errors;
pub mod estimate;
pub mod events;
pub mod media;
pub mod monitor;
pub mod report;
pub mod suggestions;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_support;

pub use chat::{ChatSession, ChatState};
pub use coordinator::{SessionCoordinator, SessionUpdate};
pub use errors::{MediaError, SessionError};
pub use estimate::EstimateCountdown;
pub use events::{ListAction, SessionEvent};
pub use monitor::ProcessingMonitor;
pub use suggestions::SuggestionTray;
pub use types::{Message, Role, UploadDisplay, UploadPhase};
pub use upload::UploadPipeline;
