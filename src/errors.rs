//! Error types shared across the application.

use std::fmt::{Display, Formatter};

/// Shared application result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error enumeration covering all domain failure modes.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing, validation, or credential failure.
    Config(String),
    /// Voice connection or playback call rejected by the platform.
    Voice(String),
    /// Text message delivery failure.
    Messaging(String),
    /// Now-playing metadata fetch or parse failure.
    Metadata(String),
    /// Process enumeration or signal delivery failure.
    Process(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Requested entity does not exist.
    NotFound(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Voice(msg) => write!(f, "voice: {msg}"),
            Self::Messaging(msg) => write!(f, "messaging: {msg}"),
            Self::Metadata(msg) => write!(f, "metadata: {msg}"),
            Self::Process(msg) => write!(f, "process: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        Self::Metadata(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
