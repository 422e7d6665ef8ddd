//! Microphone-backed speech recognizer
//!
//! Each activation runs on its own thread (cpal streams are not `Send`):
//! open the microphone, record until a phrase is endpointed, transcribe it
//! on the Tokio runtime, report exactly one [`CaptureEvent`], then exit.
//! `start` never waits for the device; a failure to open it is reported as
//! [`CaptureEvent::Ended`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::capture::{Microphone, SAMPLE_RATE, samples_to_wav};
use super::endpoint::{PhraseDetector, PhraseStatus};
use super::stt::Transcriber;
use super::{CaptureEvent, CaptureEventSender, CaptureSource};
use crate::session::Utterance;
use crate::{Error, Result};

/// How often the capture thread drains the microphone buffer
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Audio processing chunk size (100ms at 16kHz)
const CHUNK_SIZE: usize = 1600;

struct Activation {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
}

/// [`CaptureSource`] that records one phrase and transcribes it
pub struct SpeechRecognizer {
    transcriber: Arc<Transcriber>,
    runtime: tokio::runtime::Handle,
    leading_silence: Duration,
    activation: Option<Activation>,
}

impl SpeechRecognizer {
    /// Create a recognizer that transcribes on the current Tokio runtime
    ///
    /// # Errors
    ///
    /// Returns error when called outside a Tokio runtime
    pub fn new(transcriber: Transcriber, leading_silence: Duration) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Config(format!("speech recognizer needs a runtime: {e}")))?;

        Ok(Self {
            transcriber: Arc::new(transcriber),
            runtime,
            leading_silence,
            activation: None,
        })
    }
}

impl CaptureSource for SpeechRecognizer {
    fn start(&mut self, events: CaptureEventSender) -> Result<()> {
        if self.is_active() {
            return Ok(());
        }

        if !Microphone::is_available() {
            tracing::error!("speech capture not supported: no input device");
            return Err(Error::CaptureUnavailable(
                "no input device available".to_string(),
            ));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let worker = CaptureWorker {
            transcriber: Arc::clone(&self.transcriber),
            runtime: self.runtime.clone(),
            leading_silence_samples: leading_silence_samples(self.leading_silence),
            stop: Arc::clone(&stop),
            finished: Arc::clone(&finished),
            events,
        };

        std::thread::Builder::new()
            .name("speech-capture".to_string())
            .spawn(move || worker.run())?;

        self.activation = Some(Activation { stop, finished });
        tracing::info!("listening for a phrase");
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(activation) = self.activation.take() {
            activation.stop.store(true, Ordering::SeqCst);
            tracing::debug!("capture stop requested");
        }
    }

    fn is_active(&self) -> bool {
        self.activation
            .as_ref()
            .is_some_and(|a| !a.finished.load(Ordering::SeqCst))
    }
}

impl Drop for SpeechRecognizer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[allow(clippy::cast_possible_truncation)]
fn leading_silence_samples(window: Duration) -> usize {
    (window.as_millis() as usize).saturating_mul(SAMPLE_RATE as usize) / 1000
}

/// Map what an activation produced to the event it reports
fn outcome_event(outcome: Result<String>) -> CaptureEvent {
    match outcome {
        Ok(text) if !text.trim().is_empty() => CaptureEvent::Utterance(Utterance::voice(text)),
        Ok(_) => CaptureEvent::Ended(None),
        Err(e) => CaptureEvent::Ended(Some(e)),
    }
}

struct CaptureWorker {
    transcriber: Arc<Transcriber>,
    runtime: tokio::runtime::Handle,
    leading_silence_samples: usize,
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    events: CaptureEventSender,
}

impl CaptureWorker {
    fn run(self) {
        let outcome = match Microphone::open().and_then(|mut m| m.start().map(|()| m)) {
            Ok(mut microphone) => {
                let outcome = self.record_phrase(&microphone);
                microphone.stop();
                outcome
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to start microphone");
                (!self.stop.load(Ordering::SeqCst)).then_some(Err(e))
            }
        };

        // The flag flips before the event is queued so the receiver
        // always sees an inactive source
        self.finished.store(true, Ordering::SeqCst);
        if let Some(outcome) = outcome {
            let _ = self.events.send(outcome_event(outcome));
        }
    }

    /// Returns `None` when stopped from outside, which reports nothing
    fn record_phrase(&self, microphone: &Microphone) -> Option<Result<String>> {
        let mut detector = PhraseDetector::with_leading_silence(self.leading_silence_samples);
        let mut pending = Vec::with_capacity(CHUNK_SIZE * 2);

        loop {
            std::thread::sleep(POLL_INTERVAL);
            if self.stop.load(Ordering::SeqCst) {
                return None;
            }

            pending.extend(microphone.take_buffer());
            if pending.len() < CHUNK_SIZE {
                continue;
            }

            let status = detector.process(&pending);
            pending.clear();

            match status {
                PhraseStatus::Waiting | PhraseStatus::Speaking => {}
                PhraseStatus::TimedOut => {
                    tracing::debug!("no speech before timeout");
                    return Some(Ok(String::new()));
                }
                PhraseStatus::Complete => break,
            }
        }

        microphone.clear_buffer();
        let phrase = detector.take_phrase();
        let result = samples_to_wav(&phrase, SAMPLE_RATE).and_then(|wav| {
            self.runtime
                .block_on(async { self.transcriber.transcribe(&wav).await })
        });

        if self.stop.load(Ordering::SeqCst) {
            return None;
        }
        Some(result)
    }
}
