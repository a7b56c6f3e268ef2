//! Error types shared across the crate.

use std::fmt::{Display, Formatter};

/// Shared crate result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Agent executable could not be launched or did not become ready.
    Spawn(String),
    /// Wire protocol framing or serialisation failure.
    Wire(String),
    /// Reply frame carried a correlation id with no pending waiter.
    Correlation(String),
    /// A pending request exceeded its deadline.
    Timeout(String),
    /// A pending request was cancelled before a reply arrived.
    Cancelled(String),
    /// The session ended while a request was still outstanding.
    SessionTerminated(String),
    /// The agent process exited or closed its streams unexpectedly.
    Crashed(String),
    /// Command issued in a lifecycle state that does not permit it.
    State(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Wire(msg) => write!(f, "wire: {msg}"),
            Self::Correlation(msg) => write!(f, "correlation: {msg}"),
            Self::Timeout(msg) => write!(f, "timeout: {msg}"),
            Self::Cancelled(msg) => write!(f, "cancelled: {msg}"),
            Self::SessionTerminated(msg) => write!(f, "session terminated: {msg}"),
            Self::Crashed(msg) => write!(f, "crashed: {msg}"),
            Self::State(msg) => write!(f, "invalid state: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
