//! Error types for the relay console

use thiserror::Error;

use crate::relay::ChannelState;

/// Result type alias for relay console operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the relay console
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// The platform has no usable speech capture
    #[error("capture unavailable: {0}")]
    CaptureUnavailable(String),

    /// Capture started but failed before producing a phrase
    #[error("capture error: {0}")]
    Capture(String),

    /// Audio device or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Speech playback failed
    #[error("playback error: {0}")]
    Playback(String),

    /// Transport failure or non-success status from a remote service
    #[error("network error: {0}")]
    Network(String),

    /// Remote service answered with a body we cannot interpret
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Device command attempted while the command channel is not open
    #[error("command channel unavailable ({0})")]
    ChannelUnavailable(ChannelState),

    /// WebSocket error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

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

impl Error {
    /// Whether the error means voice input can never work in this session
    #[must_use]
    pub const fn is_capture_unavailable(&self) -> bool {
        matches!(self, Self::CaptureUnavailable(_))
    }
}
