//! Session state types exposed to presentation layers

use serde::{Deserialize, Serialize};
use std::fmt;

/// Author of a message in the log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Agent,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Agent => "Agent",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One entry of the message log; `text` is Markdown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub text: String,
}

impl Message {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self {
            role: Role::Agent,
            text: text.into(),
        }
    }
}

/// Where the upload pipeline currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadPhase {
    #[default]
    Idle,
    /// Bytes in transit
    Uploading,
    /// Server-side analysis
    Processing,
    Ready,
    Failed,
}

impl fmt::Display for UploadPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadPhase::Idle => "idle",
            UploadPhase::Uploading => "uploading",
            UploadPhase::Processing => "processing",
            UploadPhase::Ready => "ready",
            UploadPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Upload/processing display state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadDisplay {
    pub phase: UploadPhase,
    /// 0-100 within the current phase
    pub percent: u8,
    pub stage: Option<String>,
    /// Advisory time-remaining text
    pub estimate: Option<String>,
    pub error: Option<String>,
    pub file_name: Option<String>,
}

impl UploadDisplay {
    pub fn is_uploading(&self) -> bool {
        self.phase == UploadPhase::Uploading
    }

    pub fn is_processing(&self) -> bool {
        self.phase == UploadPhase::Processing
    }

    pub fn in_flight(&self) -> bool {
        self.is_uploading() || self.is_processing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_flags() {
        let mut display = UploadDisplay::default();
        assert!(!display.in_flight());

        display.phase = UploadPhase::Processing;
        assert!(display.is_processing());
        assert!(!display.is_uploading());
        assert!(display.in_flight());
    }

    #[test]
    fn test_role_serde() {
        let json = serde_json::to_string(&Message::agent("hi")).unwrap();
        assert_eq!(json, r#"{"role":"agent","text":"hi"}"#);
        assert_eq!(Role::User.to_string(), "User");
    }
}
