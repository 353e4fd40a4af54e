//! Domain error types
//!
//! These errors describe operations the session rejects locally, distinct from
//! transport failures reported by [`crate::api::ApiError`].

use thiserror::Error;

/// Errors returned by session operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Question was blank after trimming
    #[error("Question is empty")]
    EmptyQuestion,

    /// No conversation is active to ask against
    #[error("No active conversation")]
    NoActiveConversation,

    /// An answer is still being generated
    #[error("An answer is already in progress")]
    Busy,

    /// Suggestion id is not in the current set
    #[error("Unknown suggestion: {0}")]
    UnknownSuggestion(String),

    /// Rename requested with a blank title
    #[error("Title is empty")]
    EmptyTitle,
}

/// Errors reading audio metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    /// Container format we cannot read a duration from
    #[error("Unsupported audio format: {0}")]
    Unsupported(String),

    /// Header present but truncated or inconsistent
    #[error("Malformed audio header: {0}")]
    Malformed(String),
}
