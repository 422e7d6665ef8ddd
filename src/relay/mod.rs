//! Relay command channel
//!
//! A long-lived duplex connection to the device-control endpoint. Outbound
//! frames carry switch actions, inbound frames report the switch position.
//! The channel never reconnects by itself; a fresh one is created when the
//! owning session is restarted.

mod websocket;

use std::fmt;

use serde::Deserialize;
use tokio::sync::mpsc;

pub use websocket::{WsCommandChannel, WsConnector};

use crate::Result;
use crate::session::{DeviceCommand, SwitchPosition};

/// Connection state of a command channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Handshake in progress
    Connecting,
    /// Ready to carry commands
    Open,
    /// Closed for good
    Closed,
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Something the channel observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// Connection state changed
    State(ChannelState),
    /// Device reported its switch position
    Switch(SwitchPosition),
}

/// Where a channel reports what it observes
pub type ChannelEventSender = mpsc::UnboundedSender<ChannelEvent>;

/// A connected (or connecting) command channel
pub trait CommandChannel: Send {
    /// Current connection state
    fn state(&self) -> ChannelState;

    /// Send a command to the device
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::ChannelUnavailable`] unless the channel is open
    fn dispatch(&self, command: DeviceCommand) -> Result<()>;

    /// Close the connection; calling it again does nothing
    fn close(&mut self);
}

/// Opens command channels
pub trait CommandConnector: Send + Sync {
    /// Start connecting a new channel that reports into `events`
    ///
    /// Must be called from within a Tokio runtime.
    fn connect(&self, events: ChannelEventSender) -> Box<dyn CommandChannel>;
}

#[derive(Deserialize)]
struct Notification {
    #[serde(default)]
    switch_control: Option<serde_json::Value>,
}

/// Map a two-state token from the device to a switch position
#[must_use]
pub fn parse_switch_token(token: &str) -> Option<SwitchPosition> {
    match token.trim().to_ascii_lowercase().as_str() {
        "yes" | "on" | "true" => Some(SwitchPosition::On),
        "no" | "off" | "false" => Some(SwitchPosition::Off),
        _ => None,
    }
}

/// Decode an inbound frame into a switch position
///
/// Frames without `switch_control`, or with a token we do not recognise,
/// yield `None`.
#[must_use]
pub fn parse_notification(frame: &str) -> Option<SwitchPosition> {
    let notification: Notification = match serde_json::from_str(frame) {
        Ok(n) => n,
        Err(e) => {
            tracing::warn!(error = %e, "unparseable frame from relay");
            return None;
        }
    };

    match notification.switch_control? {
        serde_json::Value::String(token) => {
            let position = parse_switch_token(&token);
            if position.is_none() {
                tracing::warn!(token = %token, "unknown switch_control token");
            }
            position
        }
        serde_json::Value::Bool(true) => Some(SwitchPosition::On),
        serde_json::Value::Bool(false) => Some(SwitchPosition::Off),
        other => {
            tracing::warn!(value = %other, "unexpected switch_control value");
            None
        }
    }
}

/// Encode an outbound command frame
///
/// # Errors
///
/// Returns error if serialization fails
pub fn encode_command(command: DeviceCommand) -> Result<String> {
    Ok(serde_json::to_string(&command)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::DeviceAction;

    #[test]
    fn test_parse_notification_tokens() {
        assert_eq!(
            parse_notification(r#"{"switch_control":"Yes"}"#),
            Some(SwitchPosition::On)
        );
        assert_eq!(
            parse_notification(r#"{"switch_control":"No"}"#),
            Some(SwitchPosition::Off)
        );
        assert_eq!(
            parse_notification(r#"{"switch_control":"OFF"}"#),
            Some(SwitchPosition::Off)
        );
        assert_eq!(
            parse_notification(r#"{"switch_control":true}"#),
            Some(SwitchPosition::On)
        );
    }

    #[test]
    fn test_parse_notification_ignores_other_frames() {
        assert_eq!(parse_notification(r#"{"voltage":230.1}"#), None);
        assert_eq!(parse_notification(r#"{"switch_control":"maybe"}"#), None);
        assert_eq!(parse_notification(r#"{"switch_control":3}"#), None);
        assert_eq!(parse_notification("garbage"), None);
    }

    #[test]
    fn test_encode_command() {
        let frame = encode_command(DeviceCommand::from(DeviceAction::TurnOff)).unwrap();
        assert_eq!(frame, r#"{"action":"turn_off"}"#);
    }

    #[test]
    fn test_channel_state_display() {
        assert_eq!(ChannelState::Open.to_string(), "open");
        assert_eq!(ChannelState::Closed.to_string(), "closed");
    }
}
