//! Voice input and output
//!
//! Capture turns microphone audio into finalized utterances, playback turns
//! reply text into speech. Both sit behind small traits so the orchestrator
//! never touches audio devices directly.

mod capture;
mod catalog;
mod endpoint;
mod playback;
mod recognizer;
mod stt;
mod tts;

use tokio::sync::mpsc;

pub use capture::{Microphone, SAMPLE_RATE, samples_to_wav};
pub use catalog::{Voice, VoiceCatalog, select_voice};
pub use endpoint::{PhraseDetector, PhraseStatus};
pub use playback::{AudioPlayback, DecodedAudio, SpeechPlayback, decode_mp3};
pub use recognizer::SpeechRecognizer;
pub use stt::{SttProvider, Transcriber};
pub use tts::{Synthesizer, TtsProvider, openai_voices};

use crate::session::Utterance;
use crate::{Error, Result};

/// Outcome of one capture activation
///
/// An activation ends with exactly one event: either the recognised phrase
/// or `Ended` when no phrase was produced.
#[derive(Debug)]
pub enum CaptureEvent {
    /// A finalized phrase
    Utterance(Utterance),
    /// Capture stopped without a phrase; carries the failure, if any
    Ended(Option<Error>),
}

/// Where a capture source reports its outcome
pub type CaptureEventSender = mpsc::UnboundedSender<CaptureEvent>;

/// Single-utterance speech capture
pub trait CaptureSource: Send {
    /// Begin listening for one phrase; a no-op while already active
    ///
    /// # Errors
    ///
    /// Returns [`Error::CaptureUnavailable`] when the platform cannot capture
    /// speech at all, or another error if this attempt failed
    fn start(&mut self, events: CaptureEventSender) -> Result<()>;

    /// Stop listening without reporting anything; a no-op while inactive
    fn stop(&mut self);

    /// Whether an activation is still running
    fn is_active(&self) -> bool;
}

/// Speech output
pub trait PlaybackSink: Send + Sync {
    /// Speak `text` in the background
    ///
    /// Returns immediately. Failures are logged by the implementation and
    /// never reported back.
    fn speak(&self, text: &str);
}

/// [`PlaybackSink`] for sessions without speech output
#[derive(Debug, Clone, Copy, Default)]
pub struct MutePlayback;

impl PlaybackSink for MutePlayback {
    fn speak(&self, text: &str) {
        tracing::debug!(chars = text.len(), "speech output disabled, reply not spoken");
    }
}
