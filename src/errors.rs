//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Platform adapter transport failure (HTTP call, long-poll, webhook).
    Adapter(String),
    /// IPC communication failure (listener bind, frame decode, write).
    Ipc(String),
    /// No live IPC connection for the requested `process_id`.
    ProcessNotConnected(String),
    /// Requested entity (process, approval, session) does not exist.
    NotFound(String),
    /// Caller is not authorized to perform the requested action.
    Unauthorized(String),
    /// Target selector matched more than one live process.
    Ambiguous(String),
    /// Approval has already been resolved or removed.
    AlreadyConsumed(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Adapter(msg) => write!(f, "adapter: {msg}"),
            Self::Ipc(msg) => write!(f, "ipc: {msg}"),
            Self::ProcessNotConnected(msg) => write!(f, "process not connected: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::Ambiguous(msg) => write!(f, "ambiguous: {msg}"),
            Self::AlreadyConsumed(msg) => write!(f, "already consumed: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
