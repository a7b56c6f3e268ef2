//! Configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{AppError, Result};

fn default_startup_timeout_seconds() -> u64 {
    30
}

fn default_shutdown_grace_seconds() -> u64 {
    5
}

fn default_interrupt_ack_seconds() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    256
}

fn default_stderr_ring_capacity() -> usize {
    64
}

fn default_max_frame_bytes() -> usize {
    crate::wire::DEFAULT_MAX_LINE_BYTES
}

/// Global configuration parsed from `config.toml`.
///
/// Tunes how the agent process is spawned and how the session buffers its
/// event stream. Tokens-per-subscriber buffering and the stderr diagnostics
/// ring are bounded so a slow consumer cannot grow memory without limit.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct AgentConfig {
    /// Agent CLI binary (e.g., `claude`, `gh`, `python`).
    pub agent_binary: String,
    /// Default arguments passed to the agent binary.
    #[serde(default)]
    pub agent_args: Vec<String>,
    /// Workspace root directory; the child process starts in this directory.
    pub workspace_root: PathBuf,
    /// Maximum time to wait for the agent's ready signal (first stdout line).
    #[serde(default = "default_startup_timeout_seconds")]
    pub startup_timeout_seconds: u64,
    /// Grace window between the terminate frame and a hard kill.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,
    /// Deadline for the interrupt acknowledgement after `cancel_turn`.
    #[serde(default = "default_interrupt_ack_seconds")]
    pub interrupt_ack_seconds: u64,
    /// Per-subscriber event buffer capacity.
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    /// Number of stderr lines retained for crash diagnostics.
    #[serde(default = "default_stderr_ring_capacity")]
    pub stderr_ring_capacity: usize,
    /// Upper bound in bytes for one protocol line on either stream.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// Extra environment variables to pass through to the agent process,
    /// in addition to the built-in allowlist.
    #[serde(default)]
    pub env_passthrough: Vec<String>,
}

impl AgentConfig {
    /// Load and validate configuration from a TOML file on disk.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] if the file cannot be read, parsed, or
    /// fails validation.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())
            .map_err(|err| AppError::Config(format!("cannot read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] on parse or validation failure.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Config`] naming the offending field.
    pub fn validate(&self) -> Result<()> {
        if self.agent_binary.trim().is_empty() {
            return Err(AppError::Config("agent_binary must not be empty".into()));
        }
        if self.event_channel_capacity == 0 {
            return Err(AppError::Config(
                "event_channel_capacity must be greater than zero".into(),
            ));
        }
        if self.stderr_ring_capacity == 0 {
            return Err(AppError::Config(
                "stderr_ring_capacity must be greater than zero".into(),
            ));
        }
        if self.max_frame_bytes == 0 {
            return Err(AppError::Config(
                "max_frame_bytes must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Startup watchdog window as a [`Duration`].
    #[must_use]
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_seconds)
    }

    /// Shutdown grace window as a [`Duration`].
    #[must_use]
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Interrupt acknowledgement deadline as a [`Duration`].
    #[must_use]
    pub fn interrupt_ack_deadline(&self) -> Duration {
        Duration::from_secs(self.interrupt_ack_seconds)
    }
}
