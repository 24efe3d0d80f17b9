use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use livesync_core::SyncSettings;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot parse config {path:?}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Engine settings. Every field has a default, so a config file only lists overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Base URL of the HTTP API used for polls and event streams.
    pub api_base: String,
    /// WebSocket endpoint of the push channel. Absent means poll-only.
    pub push_url: Option<String>,
    pub poll_interval_ms: u64,
    pub ack_timeout_ms: u64,
    pub reconnect_backoff_ms: u64,
    pub request_timeout_ms: u64,
    pub pacing_tick_ms: u64,
    pub pacing_chunk_chars: usize,
    pub idle_timeout_ms: u64,
    pub degraded_after: u32,
    /// Directory holding persisted sessions.
    pub state_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base: "http://127.0.0.1:8080/api".to_string(),
            push_url: None,
            poll_interval_ms: 3000,
            ack_timeout_ms: 5000,
            reconnect_backoff_ms: 2000,
            request_timeout_ms: 30_000,
            pacing_tick_ms: 15,
            pacing_chunk_chars: 3,
            idle_timeout_ms: 60_000,
            degraded_after: 3,
            state_dir: PathBuf::from(".livesync"),
        }
    }
}

impl EngineConfig {
    /// Reads a RON config file and validates it.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: EngineConfig = ron::from_str(&text).map_err(|err| ConfigError::Parse {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`EngineConfig::load`], but a missing path yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        url::Url::parse(&self.api_base)
            .map_err(|err| ConfigError::Invalid(format!("api_base {}: {err}", self.api_base)))?;
        if let Some(push_url) = &self.push_url {
            let parsed = url::Url::parse(push_url)
                .map_err(|err| ConfigError::Invalid(format!("push_url {push_url}: {err}")))?;
            if !matches!(parsed.scheme(), "ws" | "wss") {
                return Err(ConfigError::Invalid(format!(
                    "push_url must use ws:// or wss://, got {push_url}"
                )));
            }
        }
        for (name, value) in [
            ("poll_interval_ms", self.poll_interval_ms),
            ("ack_timeout_ms", self.ack_timeout_ms),
            ("pacing_tick_ms", self.pacing_tick_ms),
            ("idle_timeout_ms", self.idle_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        if self.pacing_chunk_chars == 0 {
            return Err(ConfigError::Invalid(
                "pacing_chunk_chars must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            pacing_chunk_chars: self.pacing_chunk_chars,
            degraded_after: self.degraded_after.max(1),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn pacing_tick(&self) -> Duration {
        Duration::from_millis(self.pacing_tick_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }
}
