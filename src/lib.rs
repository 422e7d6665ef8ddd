//! Relay Console - voice and text front-end for a switchable relay
//!
//! This library provides the pieces of the console:
//! - Turn orchestration (listening, thinking, idle)
//! - Voice capture and speech playback (STT/TTS)
//! - The reasoning backend client
//! - The relay command channel
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Console (stdin)                     │
//! └────────────────────┬────────────────────────────────┘
//!                      │ OrchestratorHandle
//! ┌────────────────────▼────────────────────────────────┐
//! │                TurnOrchestrator                      │
//! │  Capture  │  Inference  │  Playback  │  Relay       │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │     Reasoning backend (HTTP)  │  Relay (WebSocket)  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod console;
pub mod error;
pub mod inference;
pub mod orchestrator;
pub mod relay;
pub mod session;
pub mod transcript;
pub mod voice;

pub use config::Config;
pub use error::{Error, Result};
pub use inference::{HttpInferenceClient, InferenceClient};
pub use orchestrator::{
    Components, OrchestratorHandle, SessionConfig, Submission, TurnOrchestrator,
};
pub use relay::{ChannelState, CommandChannel, CommandConnector, WsConnector};
pub use session::{
    DeviceAction, DeviceCommand, DeviceState, InferenceReply, Notice, NoticeKind, Phase, Role,
    SessionState, SwitchPosition, Turn, Utterance,
};
pub use transcript::TranscriptLog;
pub use voice::{CaptureSource, PlaybackSink};
