//! Error types for voicelink

use thiserror::Error;

/// Result type alias for voicelink operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the voice client
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Microphone unavailable or permission denied
    #[error("audio device error: {0}")]
    Device(String),

    /// Audio stream error
    #[error("audio error: {0}")]
    Audio(String),

    /// Connection open failure or unexpected close
    #[error("connection error: {0}")]
    Connection(String),

    /// Audio chunk could not be decoded
    #[error("decode error: {0}")]
    Decode(String),

    /// Audio chunk could not be played
    #[error("playback error: {0}")]
    Playback(String),

    /// Inbound message could not be interpreted
    #[error("message error: {0}")]
    Message(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
