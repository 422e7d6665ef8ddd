//! Orchestrator event queue

use tokio::sync::{mpsc, oneshot};

use crate::Result;
use crate::relay::ChannelEvent;
use crate::session::{InferenceReply, SessionState, Utterance};
use crate::voice::CaptureEvent;

/// Outcome of handing an utterance to the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Recorded as a user turn and sent for inference
    Accepted {
        /// Sequence number of the user turn
        sequence: u64,
    },
    /// Blank text, dropped
    Empty,
    /// A request is already in flight, dropped
    Busy,
    /// Voice utterance arrived while capture was off, dropped
    NotListening,
    /// The orchestrator has stopped
    Closed,
}

impl Submission {
    /// Whether the utterance started a turn
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Everything the dispatcher loop reacts to
pub(crate) enum Event {
    Submit {
        utterance: Utterance,
        reply: oneshot::Sender<Submission>,
    },
    ToggleCapture {
        reply: oneshot::Sender<SessionState>,
    },
    Restart {
        reply: oneshot::Sender<SessionState>,
    },
    Shutdown,
    /// Tagged with the capture activation that produced it
    Capture {
        generation: u64,
        event: CaptureEvent,
    },
    /// Tagged with the channel connection that produced it
    Channel {
        generation: u64,
        event: ChannelEvent,
    },
    /// Tagged with the session epoch the request was made in
    Inferred {
        epoch: u64,
        result: Result<InferenceReply>,
    },
}

pub(crate) type EventSender = mpsc::UnboundedSender<Event>;

/// Held by the orchestrator and its helpers so that only handles keep the
/// queue open
pub(crate) type WeakEventSender = mpsc::WeakUnboundedSender<Event>;

/// Relay events from a leaf-specific queue into the dispatcher queue
///
/// The forwarder ends when either side goes away.
pub(crate) fn forward<T, F>(
    mut source: mpsc::UnboundedReceiver<T>,
    queue: WeakEventSender,
    wrap: F,
) where
    T: Send + 'static,
    F: Fn(T) -> Event + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(item) = source.recv().await {
            let Some(queue) = queue.upgrade() else {
                break;
            };
            if queue.send(wrap(item)).is_err() {
                break;
            }
        }
    });
}
