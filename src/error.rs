//! Error types for the duplex amplifier

use thiserror::Error;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum Error {
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse config: {0}")]
    TomlDe(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio subsystem errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    #[error("Failed to open stream: {0}")]
    StreamOpen(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Stream has not been started")]
    StreamNotStarted,

    #[error("Stream is closed")]
    StreamClosed,

    #[error("Stream disconnected: {0}")]
    Disconnected(String),

    #[error("Read failed: {0}")]
    Read(String),

    #[error("Latency cannot be calculated yet")]
    LatencyUnavailable,

    #[error("No {0} stream attached")]
    NotAttached(&'static str),

    #[error("Streaming session already active")]
    AlreadyRunning,

    #[error("cpal error: {0}")]
    CpalError(String),
}

/// Result type alias for the crate
pub type Result<T> = std::result::Result<T, Error>;
