//! Terminal front-end
//!
//! Reads typed input from stdin and prints what the session publishes.
//! The console only talks to the orchestrator through its handle.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use crate::Result;
use crate::orchestrator::{OrchestratorHandle, Submission};
use crate::session::{DeviceState, Notice, NoticeLevel, SessionState, Turn};

const HELP: &str = "commands: /listen (toggle microphone), /restart, /quit; anything else is sent as a request";

/// One line of operator input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Text to submit
    Say(String),
    /// Toggle capture
    Listen,
    /// Restart the session
    Restart,
    /// Leave
    Quit,
    /// Unrecognised slash command
    Unknown(String),
}

impl ConsoleCommand {
    /// Interpret one input line
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let trimmed = line.trim();
        match trimmed {
            "/listen" | "/l" => Self::Listen,
            "/restart" => Self::Restart,
            "/quit" | "/exit" | "/q" => Self::Quit,
            other if other.starts_with('/') => Self::Unknown(other.to_string()),
            _ => Self::Say(line.to_string()),
        }
    }
}

/// Drive the session from stdin until `/quit`, end of input or shutdown
///
/// # Errors
///
/// Returns error if stdin cannot be read
pub async fn run(handle: OrchestratorHandle) -> Result<()> {
    let renderer = tokio::spawn(render(handle.clone()));
    println!("{HELP}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match ConsoleCommand::parse(&line) {
            ConsoleCommand::Say(text) => match handle.submit_text(text).await {
                Submission::Accepted { .. } | Submission::Empty => {}
                Submission::Busy => println!("(still thinking, request dropped)"),
                Submission::NotListening => {}
                Submission::Closed => break,
            },
            ConsoleCommand::Listen => {
                if handle.toggle_capture().await.is_none() {
                    break;
                }
            }
            ConsoleCommand::Restart => {
                if handle.restart().await.is_none() {
                    break;
                }
                println!("-- session restarted --");
            }
            ConsoleCommand::Quit => break,
            ConsoleCommand::Unknown(command) => println!("unknown command {command}; {HELP}"),
        }
    }

    handle.shutdown();
    renderer.abort();
    Ok(())
}

/// Print published state as it changes
async fn render(handle: OrchestratorHandle) {
    let mut session = handle.subscribe_session();
    let mut device = handle.subscribe_device();
    let mut transcript = handle.subscribe_transcript();
    let mut notices = handle.subscribe_notices();

    let mut printed = 0u64;
    println!("{}", session_line(&session.borrow_and_update()));

    loop {
        tokio::select! {
            changed = session.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", session_line(&session.borrow_and_update()));
            }
            changed = device.changed() => {
                if changed.is_err() {
                    break;
                }
                println!("{}", device_line(&device.borrow_and_update()));
            }
            changed = transcript.changed() => {
                if changed.is_err() {
                    break;
                }
                let turns = transcript.borrow_and_update().clone();
                let since = printed;
                for turn in turns.iter().filter(|t| t.sequence > since) {
                    println!("{}", turn_line(turn));
                    printed = turn.sequence;
                }
            }
            notice = notices.recv() => match notice {
                Ok(notice) => println!("{}", notice_line(&notice)),
                Err(RecvError::Lagged(missed)) => {
                    tracing::debug!(missed, "console fell behind on notices");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}

/// `[listening] relay: connected`
#[must_use]
pub fn session_line(state: &SessionState) -> String {
    let relay = if state.command_channel_connected {
        "connected"
    } else {
        "disconnected"
    };
    format!("[{}] relay: {relay}", state.phase())
}

#[must_use]
pub fn device_line(state: &DeviceState) -> String {
    format!("switch: {}", state.switch_position)
}

#[must_use]
pub fn turn_line(turn: &Turn) -> String {
    format!("{:>3} {:>9}: {}", turn.sequence, turn.role.to_string(), turn.text)
}

#[must_use]
pub fn notice_line(notice: &Notice) -> String {
    let level = match notice.level {
        NoticeLevel::Warning => "warning",
        NoticeLevel::Error => "error",
    };
    format!("{level}: {}", notice.message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{NoticeKind, Role};

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("/listen"), ConsoleCommand::Listen);
        assert_eq!(ConsoleCommand::parse(" /restart "), ConsoleCommand::Restart);
        assert_eq!(ConsoleCommand::parse("/quit"), ConsoleCommand::Quit);
        assert_eq!(
            ConsoleCommand::parse("/dance"),
            ConsoleCommand::Unknown("/dance".to_string())
        );
        assert_eq!(
            ConsoleCommand::parse("turn on my switch"),
            ConsoleCommand::Say("turn on my switch".to_string())
        );
    }

    #[test]
    fn test_lines() {
        let state = SessionState {
            listening: true,
            thinking: false,
            command_channel_connected: true,
        };
        assert_eq!(session_line(&state), "[listening] relay: connected");

        let turn = Turn {
            role: Role::Assistant,
            text: "Turning it on".to_string(),
            sequence: 2,
        };
        assert_eq!(turn_line(&turn), "  2 assistant: Turning it on");

        let notice = Notice::warning(NoticeKind::DispatchSkipped, "relay offline");
        assert_eq!(notice_line(&notice), "warning: relay offline");
    }
}
