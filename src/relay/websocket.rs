//! WebSocket transport for the relay command channel

use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;

use super::{
    ChannelEvent, ChannelEventSender, ChannelState, CommandChannel, CommandConnector,
    encode_command, parse_notification,
};
use crate::session::DeviceCommand;
use crate::{Error, Result};

/// Opens WebSocket command channels to a fixed endpoint
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: url::Url,
}

impl WsConnector {
    /// Create a connector for the given `ws://` or `wss://` endpoint
    #[must_use]
    pub const fn new(url: url::Url) -> Self {
        Self { url }
    }
}

impl CommandConnector for WsConnector {
    fn connect(&self, events: ChannelEventSender) -> Box<dyn CommandChannel> {
        Box::new(WsCommandChannel::connect(self.url.clone(), events))
    }
}

/// Command channel over a single WebSocket connection
///
/// One task owns the socket. Commands reach it through an unbounded queue
/// and state changes are published through a `watch` cell, so `dispatch`
/// never blocks the caller.
pub struct WsCommandChannel {
    state: watch::Receiver<ChannelState>,
    commands: Option<mpsc::UnboundedSender<DeviceCommand>>,
    task: Option<JoinHandle<()>>,
}

impl WsCommandChannel {
    /// Start connecting to `url`
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn connect(url: url::Url, events: ChannelEventSender) -> Self {
        let (state_tx, state_rx) = watch::channel(ChannelState::Connecting);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_socket(url, command_rx, state_tx, events));

        Self {
            state: state_rx,
            commands: Some(command_tx),
            task: Some(task),
        }
    }
}

impl CommandChannel for WsCommandChannel {
    fn state(&self) -> ChannelState {
        if self.commands.is_none() {
            return ChannelState::Closed;
        }
        *self.state.borrow()
    }

    fn dispatch(&self, command: DeviceCommand) -> Result<()> {
        let state = self.state();
        if state != ChannelState::Open {
            return Err(Error::ChannelUnavailable(state));
        }

        let commands = self
            .commands
            .as_ref()
            .ok_or(Error::ChannelUnavailable(ChannelState::Closed))?;

        commands
            .send(command)
            .map_err(|_| Error::ChannelUnavailable(ChannelState::Closed))
    }

    fn close(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };

        // Still handshaking: nothing to say goodbye to
        if *self.state.borrow() == ChannelState::Connecting {
            if let Some(task) = self.task.take() {
                task.abort();
            }
        }

        // The socket task sends a close frame once the queue is dropped
        drop(commands);
        tracing::debug!("relay channel close requested");
    }
}

impl Drop for WsCommandChannel {
    fn drop(&mut self) {
        self.close();
    }
}

type RelaySocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn open_socket(url: &url::Url) -> Result<RelaySocket> {
    let (stream, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
    Ok(stream)
}

async fn run_socket(
    url: url::Url,
    commands: mpsc::UnboundedReceiver<DeviceCommand>,
    state: watch::Sender<ChannelState>,
    events: ChannelEventSender,
) {
    let publish = |next: ChannelState| {
        state.send_replace(next);
        let _ = events.send(ChannelEvent::State(next));
    };

    let stream = match open_socket(&url).await {
        Ok(stream) => stream,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "relay websocket connect failed");
            publish(ChannelState::Closed);
            return;
        }
    };

    tracing::info!(url = %url, "relay websocket connected");
    publish(ChannelState::Open);

    match pump(stream, commands, &events).await {
        Ok(()) => tracing::info!("relay websocket disconnected"),
        Err(e) => tracing::warn!(error = %e, "relay websocket failed"),
    }
    publish(ChannelState::Closed);
}

/// Move commands out and notifications in until either side closes
async fn pump(
    stream: RelaySocket,
    mut commands: mpsc::UnboundedReceiver<DeviceCommand>,
    events: &ChannelEventSender,
) -> Result<()> {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            command = commands.recv() => {
                let Some(command) = command else {
                    write.send(Message::Close(None)).await?;
                    return Ok(());
                };

                let frame = match encode_command(command) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::error!(error = %e, "failed to encode relay command");
                        continue;
                    }
                };

                write.send(Message::Text(frame)).await?;
                tracing::info!(action = %command.action, "sent action to relay");
            }
            frame = read.next() => {
                match frame.transpose()? {
                    Some(Message::Text(text)) => {
                        if let Some(position) = parse_notification(&text) {
                            tracing::debug!(position = %position, "relay reported switch state");
                            let _ = events.send(ChannelEvent::Switch(position));
                        }
                    }
                    Some(Message::Close(reason)) => {
                        tracing::info!(reason = ?reason, "relay websocket closed by peer");
                        return Ok(());
                    }
                    Some(Message::Binary(bin)) => {
                        tracing::warn!(bytes = bin.len(), "unexpected binary frame from relay");
                    }
                    Some(_) => {}
                    None => return Ok(()),
                }
            }
        }
    }
}
