//! Configuration management for the transcript client

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Request timeout in seconds (uploads of long recordings can be slow)
    pub timeout_secs: u64,
    /// Maximum number of conversations/messages requested per listing
    pub history_limit: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 300,
            history_limit: 100,
        }
    }
}

impl ServerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Identity every request is issued under
    pub user_id: String,
    /// Cadence of the processing status poll loop
    pub poll_interval_ms: u64,
    /// Seconds of audio the server processes per second of wall time
    pub estimate_divisor: u64,
    /// Fixed overhead added to every processing estimate
    pub estimate_overhead_secs: u64,
    /// How answers are received
    pub answer_mode: AnswerMode,
    /// Cadence of task status polls in [`AnswerMode::Poll`]
    pub task_poll_interval_ms: u64,
    /// Give up on a polled answer after this long
    pub task_timeout_secs: u64,
}

/// Delivery of an answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    /// Incremental event stream
    #[default]
    Stream,
    /// Poll the task until it finishes, then show the whole answer
    Poll,
}

impl AnswerMode {
    pub fn toggled(self) -> Self {
        match self {
            AnswerMode::Stream => AnswerMode::Poll,
            AnswerMode::Poll => AnswerMode::Stream,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            user_id: whoami::username(),
            poll_interval_ms: 1000,
            estimate_divisor: 80,
            estimate_overhead_secs: 20,
            answer_mode: AnswerMode::Stream,
            task_poll_interval_ms: 2000,
            task_timeout_secs: 300,
        }
    }
}

impl SessionConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms.max(1))
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

impl Config {
    /// Load configuration from default location or create default
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            Ok(Config::default())
        }
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Get the configuration file path
    pub fn config_path() -> Result<PathBuf> {
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "transcript") {
            let config_dir = proj_dirs.config_dir();
            std::fs::create_dir_all(config_dir)?;
            Ok(config_dir.join("config.toml"))
        } else {
            Ok(PathBuf::from("config.toml"))
        }
    }

    /// Apply command-line overrides on top of the loaded file
    pub fn with_overrides(mut self, base_url: Option<String>, user_id: Option<String>) -> Self {
        if let Some(url) = base_url {
            self.server.base_url = url;
        }
        if let Some(user) = user_id.filter(|u| !u.trim().is_empty()) {
            self.session.user_id = user;
        }
        self
    }
}
