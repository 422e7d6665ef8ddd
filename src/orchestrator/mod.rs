//! Turn orchestration
//!
//! [`TurnOrchestrator`] sequences one conversational turn at a time:
//! capture → inference → playback and device dispatch. Every callback from
//! its collaborators arrives as an [`Event`] on a single queue, and the
//! dispatcher loop in [`TurnOrchestrator::run`] is the only code that
//! mutates session state. Observers read snapshots through an
//! [`OrchestratorHandle`].
//!
//! ```text
//!   capture ──┐                       ┌── playback
//!   channel ──┼──► queue ──► run() ───┼── channel dispatch
//!   handle  ──┤                       └── watch / broadcast snapshots
//!   inference ┘ (spawned task replies)
//! ```

mod event;
mod handle;

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, mpsc, watch};

pub use event::Submission;
pub use handle::OrchestratorHandle;

use event::{Event, WeakEventSender, forward};

use crate::inference::InferenceClient;
use crate::relay::{ChannelEvent, ChannelState, CommandChannel, CommandConnector};
use crate::session::{
    DeviceCommand, DeviceState, InferenceReply, Notice, NoticeKind, Phase, Role, SessionState,
    SwitchPosition, Turn, Utterance, UtteranceSource,
};
use crate::transcript::TranscriptLog;
use crate::voice::{CaptureEvent, CaptureSource, PlaybackSink};
use crate::{Error, Result};

/// Notices buffered per slow subscriber before it starts lagging
const NOTICE_CAPACITY: usize = 64;

/// Session behaviour switches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Start capture as soon as the session starts
    pub auto_listen: bool,
    /// Restart capture after every completed turn
    pub continuous: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            auto_listen: true,
            continuous: false,
        }
    }
}

/// Collaborators the orchestrator drives
pub struct Components {
    /// Speech capture; `None` runs a typed-only session
    pub capture: Option<Box<dyn CaptureSource>>,
    pub inference: Arc<dyn InferenceClient>,
    pub playback: Arc<dyn PlaybackSink>,
    /// Opens the command channel, again on every restart
    pub connector: Arc<dyn CommandConnector>,
}

/// The session state machine
pub struct TurnOrchestrator {
    config: SessionConfig,
    phase: Phase,

    capture: Option<Box<dyn CaptureSource>>,
    voice_available: bool,
    capture_generation: u64,

    inference: Arc<dyn InferenceClient>,
    playback: Arc<dyn PlaybackSink>,

    connector: Arc<dyn CommandConnector>,
    channel: Option<Box<dyn CommandChannel>>,
    channel_state: ChannelState,
    channel_generation: u64,

    transcript: TranscriptLog,
    epoch: u64,

    queue: WeakEventSender,
    events: mpsc::UnboundedReceiver<Event>,

    session_tx: watch::Sender<SessionState>,
    device_tx: watch::Sender<DeviceState>,
    transcript_tx: watch::Sender<Vec<Turn>>,
    notices: broadcast::Sender<Notice>,
}

impl TurnOrchestrator {
    /// Create an orchestrator and start its first session
    ///
    /// Connects the command channel and, when configured, starts capture.
    /// Must be called from within a Tokio runtime; drive it with
    /// [`TurnOrchestrator::run`].
    #[must_use]
    pub fn new(components: Components, config: SessionConfig) -> (Self, OrchestratorHandle) {
        let (queue, events) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = watch::channel(SessionState::default());
        let (device_tx, device_rx) = watch::channel(DeviceState::default());
        let (transcript_tx, transcript_rx) = watch::channel(Vec::new());
        let (notices, startup_notices) = broadcast::channel(NOTICE_CAPACITY);

        let weak_queue = queue.downgrade();
        let handle = OrchestratorHandle {
            queue,
            session: session_rx,
            device: device_rx,
            transcript: transcript_rx,
            notices: notices.clone(),
            startup_notices: Arc::new(Mutex::new(Some(startup_notices))),
        };

        let voice_available = components.capture.is_some();
        let mut orchestrator = Self {
            config,
            phase: Phase::Idle,
            capture: components.capture,
            voice_available,
            capture_generation: 0,
            inference: components.inference,
            playback: components.playback,
            connector: components.connector,
            channel: None,
            channel_state: ChannelState::Closed,
            channel_generation: 0,
            transcript: TranscriptLog::new(),
            epoch: 0,
            queue: weak_queue,
            events,
            session_tx,
            device_tx,
            transcript_tx,
            notices,
        };

        orchestrator.start_session();
        (orchestrator, handle)
    }

    /// Current phase
    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// Process events until shut down or every handle is dropped
    ///
    /// Capture and the command channel are released when this returns.
    pub async fn run(mut self) {
        tracing::info!(voice = self.voice_available, "session started");

        loop {
            match self.events.recv().await {
                Some(Event::Shutdown) => {
                    tracing::info!("shutdown requested");
                    break;
                }
                Some(event) => self.handle_event(event),
                None => {
                    tracing::info!("all handles dropped");
                    break;
                }
            }
        }

        self.teardown();
        tracing::info!("session stopped");
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Submit { utterance, reply } => {
                let outcome = self.submit(utterance);
                let _ = reply.send(outcome);
            }
            Event::ToggleCapture { reply } => {
                self.toggle_capture();
                let _ = reply.send(self.snapshot());
            }
            Event::Restart { reply } => {
                self.restart();
                let _ = reply.send(self.snapshot());
            }
            Event::Capture { generation, event } => {
                if generation == self.capture_generation {
                    self.on_capture(event);
                } else {
                    tracing::debug!(generation, "dropping event from stale capture");
                }
            }
            Event::Channel { generation, event } => {
                if generation == self.channel_generation {
                    self.on_channel(event);
                } else {
                    tracing::debug!(generation, "dropping event from stale channel");
                }
            }
            Event::Inferred { epoch, result } => {
                if epoch == self.epoch && self.phase == Phase::Thinking {
                    self.on_inferred(result);
                } else {
                    tracing::debug!(epoch, current = self.epoch, "discarding stale reply");
                }
            }
            Event::Shutdown => {}
        }
    }

    /// Accept an utterance for inference
    ///
    /// The user turn is recorded before the request is issued.
    fn submit(&mut self, utterance: Utterance) -> Submission {
        if utterance.is_blank() {
            tracing::debug!("ignoring blank utterance");
            return Submission::Empty;
        }

        match (self.phase, utterance.source()) {
            (Phase::Thinking, _) => {
                tracing::debug!("request in flight, dropping utterance");
                return Submission::Busy;
            }
            (Phase::Idle, UtteranceSource::Voice) => {
                tracing::debug!("capture is off, dropping voice utterance");
                return Submission::NotListening;
            }
            (Phase::Listening, _) => self.stop_capture(),
            (Phase::Idle, UtteranceSource::Typed) => {}
        }

        let turn = self.record(Role::User, utterance.text());
        self.set_phase(Phase::Thinking);

        tracing::info!(
            sequence = turn.sequence,
            source = ?utterance.source(),
            epoch = self.epoch,
            "utterance submitted"
        );

        let inference = Arc::clone(&self.inference);
        let queue = self.queue.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let result = inference.infer(&utterance).await;
            if let Some(queue) = queue.upgrade() {
                let _ = queue.send(Event::Inferred { epoch, result });
            }
        });

        Submission::Accepted {
            sequence: turn.sequence,
        }
    }

    fn on_inferred(&mut self, result: Result<InferenceReply>) {
        match result {
            Ok(reply) => {
                let turn = self.record(Role::Assistant, &reply.text);
                tracing::info!(
                    sequence = turn.sequence,
                    action = ?reply.action,
                    "reply received"
                );

                self.playback.speak(&reply.text);

                if let Some(action) = reply.action {
                    self.dispatch(DeviceCommand::from(action));
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "inference failed");
                self.notify(Notice::error(
                    NoticeKind::InferenceFailed,
                    format!("could not get a reply: {e}"),
                ));
            }
        }

        self.set_phase(Phase::Idle);
        if self.config.continuous && self.voice_available {
            self.start_capture();
        }
    }

    fn dispatch(&mut self, command: DeviceCommand) {
        let result = self.channel.as_ref().map_or(
            Err(Error::ChannelUnavailable(ChannelState::Closed)),
            |channel| channel.dispatch(command),
        );

        if let Err(e) = result {
            tracing::warn!(action = %command.action, error = %e, "device action not delivered");
            self.notify(Notice::warning(
                NoticeKind::DispatchSkipped,
                format!("could not send {}: {e}", command.action),
            ));
        }
    }

    fn toggle_capture(&mut self) {
        match self.phase {
            Phase::Idle => {
                if !self.voice_available {
                    tracing::debug!("voice input unavailable, toggle ignored");
                    return;
                }
                self.start_capture();
            }
            Phase::Listening => {
                self.stop_capture();
                self.set_phase(Phase::Idle);
            }
            Phase::Thinking => {
                tracing::debug!("request in flight, toggle ignored");
            }
        }
    }

    fn start_capture(&mut self) {
        let Some(capture) = self.capture.as_mut() else {
            return;
        };

        self.capture_generation += 1;
        let generation = self.capture_generation;
        let (tx, rx) = mpsc::unbounded_channel();
        forward(rx, self.queue.clone(), move |event| Event::Capture {
            generation,
            event,
        });

        match capture.start(tx) {
            Ok(()) => self.set_phase(Phase::Listening),
            Err(e) if e.is_capture_unavailable() => {
                tracing::error!(error = %e, "speech capture unavailable, voice input disabled");
                self.voice_available = false;
                self.notify(Notice::error(
                    NoticeKind::CaptureUnavailable,
                    "speech capture is not available; type your requests instead",
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start capture");
                self.notify(Notice::warning(
                    NoticeKind::CaptureFailed,
                    format!("could not start listening: {e}"),
                ));
            }
        }
    }

    /// Stop capture and disown anything it still reports
    fn stop_capture(&mut self) {
        if let Some(capture) = self.capture.as_mut() {
            capture.stop();
        }
        self.capture_generation += 1;
    }

    fn on_capture(&mut self, event: CaptureEvent) {
        match event {
            CaptureEvent::Utterance(utterance) => {
                let outcome = self.submit(utterance);
                tracing::debug!(?outcome, "voice utterance handled");
            }
            CaptureEvent::Ended(error) => {
                if self.phase != Phase::Listening {
                    return;
                }
                self.capture_generation += 1;
                self.set_phase(Phase::Idle);

                match error {
                    Some(e) => {
                        tracing::warn!(error = %e, "capture ended with error");
                        self.notify(Notice::warning(
                            NoticeKind::CaptureFailed,
                            format!("listening stopped: {e}"),
                        ));
                    }
                    None => tracing::debug!("capture ended without a phrase"),
                }
            }
        }
    }

    fn on_channel(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::State(state) => {
                tracing::info!(state = %state, "command channel state changed");
                self.channel_state = state;
                self.publish_session();
            }
            ChannelEvent::Switch(position) => {
                tracing::info!(position = %position, "switch position reported");
                self.set_switch(position);
            }
        }
    }

    fn connect_channel(&mut self) {
        self.channel_generation += 1;
        let generation = self.channel_generation;
        let (tx, rx) = mpsc::unbounded_channel();
        forward(rx, self.queue.clone(), move |event| Event::Channel {
            generation,
            event,
        });

        let channel = self.connector.connect(tx);
        self.channel_state = channel.state();
        self.channel = Some(channel);
        self.publish_session();
    }

    fn close_channel(&mut self) {
        if let Some(mut channel) = self.channel.take() {
            channel.close();
        }
        self.channel_generation += 1;
        self.channel_state = ChannelState::Closed;
    }

    fn start_session(&mut self) {
        self.connect_channel();
        if self.config.auto_listen && self.voice_available {
            self.start_capture();
        }
    }

    fn restart(&mut self) {
        tracing::info!(epoch = self.epoch + 1, "restarting session");
        self.epoch += 1;
        self.stop_capture();
        self.close_channel();
        self.set_switch(SwitchPosition::Unknown);
        self.set_phase(Phase::Idle);
        self.start_session();
    }

    /// Release capture and the channel; safe to call more than once
    fn teardown(&mut self) {
        if let Some(mut capture) = self.capture.take() {
            capture.stop();
        }
        self.capture_generation += 1;
        self.close_channel();
        self.voice_available = false;
        self.set_phase(Phase::Idle);
    }

    fn record(&mut self, role: Role, text: &str) -> Turn {
        let turn = self.transcript.append(role, text);
        let published = turn.clone();
        self.transcript_tx.send_modify(|turns| turns.push(published));
        turn
    }

    fn notify(&self, notice: Notice) {
        // No subscribers is fine
        let _ = self.notices.send(notice);
    }

    fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase change");
            self.phase = phase;
        }
        self.publish_session();
    }

    fn set_switch(&self, position: SwitchPosition) {
        self.device_tx.send_if_modified(|device| {
            let changed = device.switch_position != position;
            device.switch_position = position;
            changed
        });
    }

    const fn snapshot(&self) -> SessionState {
        SessionState {
            listening: matches!(self.phase, Phase::Listening),
            thinking: matches!(self.phase, Phase::Thinking),
            command_channel_connected: matches!(self.channel_state, ChannelState::Open),
        }
    }

    fn publish_session(&self) {
        let next = self.snapshot();
        self.session_tx.send_if_modified(|current| {
            let changed = *current != next;
            *current = next;
            changed
        });
    }
}

impl Drop for TurnOrchestrator {
    fn drop(&mut self) {
        self.teardown();
    }
}
