//! Cloneable front door to a running orchestrator

use std::sync::{Arc, Mutex};

use tokio::sync::{broadcast, oneshot, watch};

use super::event::{Event, EventSender, Submission};
use crate::session::{DeviceState, Notice, SessionState, Turn, Utterance};

/// Handle used by front-ends to drive and observe a session
///
/// Commands go through the orchestrator queue; state is read from
/// snapshots the orchestrator publishes. Nothing here mutates session
/// state directly.
#[derive(Clone)]
pub struct OrchestratorHandle {
    pub(super) queue: EventSender,
    pub(super) session: watch::Receiver<SessionState>,
    pub(super) device: watch::Receiver<DeviceState>,
    pub(super) transcript: watch::Receiver<Vec<Turn>>,
    pub(super) notices: broadcast::Sender<Notice>,
    /// Subscribed before the session starts; handed to the first subscriber
    pub(super) startup_notices: Arc<Mutex<Option<broadcast::Receiver<Notice>>>>,
}

impl OrchestratorHandle {
    /// Submit typed input
    pub async fn submit_text(&self, text: impl Into<String>) -> Submission {
        self.submit(Utterance::typed(text)).await
    }

    /// Submit an utterance from any source
    pub async fn submit(&self, utterance: Utterance) -> Submission {
        let (reply, rx) = oneshot::channel();
        if self.queue.send(Event::Submit { utterance, reply }).is_err() {
            return Submission::Closed;
        }
        rx.await.unwrap_or(Submission::Closed)
    }

    /// Start or stop capture
    ///
    /// Returns the session state after the toggle, or `None` once the
    /// orchestrator has stopped.
    pub async fn toggle_capture(&self) -> Option<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.queue.send(Event::ToggleCapture { reply }).ok()?;
        rx.await.ok()
    }

    /// Abandon the current session and start a fresh one
    ///
    /// Replies to requests made before the restart are discarded.
    pub async fn restart(&self) -> Option<SessionState> {
        let (reply, rx) = oneshot::channel();
        self.queue.send(Event::Restart { reply }).ok()?;
        rx.await.ok()
    }

    /// Ask the orchestrator to stop
    pub fn shutdown(&self) {
        if self.queue.send(Event::Shutdown).is_err() {
            tracing::debug!("orchestrator already stopped");
        }
    }

    /// Whether the orchestrator is still running
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.queue.is_closed()
    }

    #[must_use]
    pub fn session(&self) -> SessionState {
        *self.session.borrow()
    }

    #[must_use]
    pub fn device(&self) -> DeviceState {
        *self.device.borrow()
    }

    #[must_use]
    pub fn transcript(&self) -> Vec<Turn> {
        self.transcript.borrow().clone()
    }

    #[must_use]
    pub fn subscribe_session(&self) -> watch::Receiver<SessionState> {
        self.session.clone()
    }

    #[must_use]
    pub fn subscribe_device(&self) -> watch::Receiver<DeviceState> {
        self.device.clone()
    }

    #[must_use]
    pub fn subscribe_transcript(&self) -> watch::Receiver<Vec<Turn>> {
        self.transcript.clone()
    }

    /// Subscribe to notices
    ///
    /// The first subscriber also receives notices raised while the session
    /// was starting, before anyone could subscribe.
    #[must_use]
    pub fn subscribe_notices(&self) -> broadcast::Receiver<Notice> {
        self.startup_notices
            .lock()
            .ok()
            .and_then(|mut startup| startup.take())
            .unwrap_or_else(|| self.notices.subscribe())
    }
}
