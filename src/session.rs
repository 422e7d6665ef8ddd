//! Session data model
//!
//! Values exchanged between the orchestrator, its collaborators and the
//! observers that render the session. Everything here is plain data; the
//! only writer of the mutable pieces is the orchestrator.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where an utterance came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UtteranceSource {
    /// Finalized phrase from speech capture
    Voice,
    /// Line entered by the operator
    Typed,
}

/// One finalized unit of user input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utterance {
    text: String,
    source: UtteranceSource,
    timestamp: DateTime<Utc>,
}

impl Utterance {
    /// Create an utterance stamped with the current time
    #[must_use]
    pub fn new(text: impl Into<String>, source: UtteranceSource) -> Self {
        Self {
            text: text.into(),
            source,
            timestamp: Utc::now(),
        }
    }

    /// Create a voice utterance
    #[must_use]
    pub fn voice(text: impl Into<String>) -> Self {
        Self::new(text, UtteranceSource::Voice)
    }

    /// Create a typed utterance
    #[must_use]
    pub fn typed(text: impl Into<String>) -> Self {
        Self::new(text, UtteranceSource::Typed)
    }

    /// Utterance text as captured or typed
    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Where the utterance came from
    #[must_use]
    pub const fn source(&self) -> UtteranceSource {
        self.source
    }

    /// When the utterance was finalized
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// True when there is nothing but whitespace to submit
    #[must_use]
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Speaker of a transcript turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The operator
    User,
    /// The remote assistant
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One recorded entry of the transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    /// Who said it
    pub role: Role,
    /// What was said
    pub text: String,
    /// Position in the transcript, starting at 1 with no gaps
    pub sequence: u64,
}

/// Switch action the assistant can request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceAction {
    /// Close the relay
    TurnOn,
    /// Open the relay
    TurnOff,
}

impl DeviceAction {
    /// Wire token for the action
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
        }
    }

    /// Parse a wire token, returning `None` for anything unrecognised
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "turn_on" => Some(Self::TurnOn),
            "turn_off" => Some(Self::TurnOff),
            _ => None,
        }
    }
}

impl fmt::Display for DeviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply from the reasoning backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferenceReply {
    /// Text to show and speak
    pub text: String,
    /// Optional device action to dispatch
    pub action: Option<DeviceAction>,
}

/// Outbound command frame for the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommand {
    /// Requested action
    pub action: DeviceAction,
}

impl From<DeviceAction> for DeviceCommand {
    fn from(action: DeviceAction) -> Self {
        Self { action }
    }
}

/// Last reported relay position
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SwitchPosition {
    /// Relay closed
    On,
    /// Relay open
    Off,
    /// No report received yet
    #[default]
    Unknown,
}

impl fmt::Display for SwitchPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::On => write!(f, "on"),
            Self::Off => write!(f, "off"),
            Self::Unknown => write!(f, "unknown"),
        }
    }
}

/// Device state as last reported over the command channel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    /// Relay position
    pub switch_position: SwitchPosition,
}

/// Read-only snapshot of the session flags
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    /// Capture is running
    pub listening: bool,
    /// An inference request is in flight
    pub thinking: bool,
    /// The command channel is open
    pub command_channel_connected: bool,
}

impl SessionState {
    /// Orchestrator phase implied by the flags
    #[must_use]
    pub const fn phase(&self) -> Phase {
        if self.thinking {
            Phase::Thinking
        } else if self.listening {
            Phase::Listening
        } else {
            Phase::Idle
        }
    }
}

/// Turn-taking phase of a session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Waiting for the operator
    #[default]
    Idle,
    /// Capture is running
    Listening,
    /// Waiting on the reasoning backend
    Thinking,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Listening => write!(f, "listening"),
            Self::Thinking => write!(f, "thinking"),
        }
    }
}

/// Severity of a notice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeLevel {
    /// Something degraded but the turn went on
    Warning,
    /// The turn or the voice path was aborted
    Error,
}

/// What a notice is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    /// Voice input is off for the rest of the session
    CaptureUnavailable,
    /// Capture ended with an error before a phrase was recognised
    CaptureFailed,
    /// Inference request failed, turn aborted
    InferenceFailed,
    /// Device action could not be delivered
    DispatchSkipped,
}

/// User-visible signal raised by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notice {
    /// Severity
    pub level: NoticeLevel,
    /// Category
    pub kind: NoticeKind,
    /// Human-readable detail
    pub message: String,
}

impl Notice {
    /// Create a warning notice
    #[must_use]
    pub fn warning(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Warning,
            kind,
            message: message.into(),
        }
    }

    /// Create an error notice
    #[must_use]
    pub fn error(kind: NoticeKind, message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_utterance() {
        assert!(Utterance::typed("").is_blank());
        assert!(Utterance::typed("  \t\n").is_blank());
        assert!(!Utterance::voice(" on ").is_blank());
    }

    #[test]
    fn test_utterance_keeps_text_verbatim() {
        let utterance = Utterance::typed("  turn on  ");
        assert_eq!(utterance.text(), "  turn on  ");
        assert_eq!(utterance.source(), UtteranceSource::Typed);
    }

    #[test]
    fn test_device_action_tokens() {
        assert_eq!(DeviceAction::parse("turn_on"), Some(DeviceAction::TurnOn));
        assert_eq!(DeviceAction::parse("turn_off"), Some(DeviceAction::TurnOff));
        assert_eq!(DeviceAction::parse("dim"), None);
        assert_eq!(DeviceAction::TurnOff.to_string(), "turn_off");
    }

    #[test]
    fn test_phase_from_flags() {
        let mut state = SessionState::default();
        assert_eq!(state.phase(), Phase::Idle);

        state.listening = true;
        assert_eq!(state.phase(), Phase::Listening);

        state.listening = false;
        state.thinking = true;
        assert_eq!(state.phase(), Phase::Thinking);
    }

    #[test]
    fn test_device_command_wire_format() {
        let json = serde_json::to_string(&DeviceCommand::from(DeviceAction::TurnOn)).unwrap();
        assert_eq!(json, r#"{"action":"turn_on"}"#);
    }
}
