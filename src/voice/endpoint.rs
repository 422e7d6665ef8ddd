//! Phrase endpointing
//!
//! Decides when a single spoken phrase has finished, using RMS energy over
//! incoming chunks: speech starts when energy crosses a threshold and ends
//! after a run of silence.

use super::capture::SAMPLE_RATE;

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech for a phrase (0.3 seconds at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800;

/// Silence that ends a phrase (0.5 seconds at 16kHz)
const TRAILING_SILENCE_SAMPLES: usize = 8000;

/// Default silence allowed before any speech (5 seconds at 16kHz)
const DEFAULT_LEADING_SILENCE_SAMPLES: usize = SAMPLE_RATE as usize * 5;

/// Where the detector is after a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhraseStatus {
    /// No speech yet
    Waiting,
    /// Speech in progress
    Speaking,
    /// A phrase has ended; take it with [`PhraseDetector::take_phrase`]
    Complete,
    /// Nobody spoke within the leading-silence window
    TimedOut,
}

/// Single-phrase endpoint detector
pub struct PhraseDetector {
    status: PhraseStatus,
    phrase: Vec<f32>,
    silence: usize,
    waited: usize,
    leading_silence_limit: usize,
}

impl Default for PhraseDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PhraseDetector {
    /// Create a detector with the default 5 second leading-silence window
    #[must_use]
    pub const fn new() -> Self {
        Self::with_leading_silence(DEFAULT_LEADING_SILENCE_SAMPLES)
    }

    /// Create a detector that gives up after `samples` of silence before speech
    #[must_use]
    pub const fn with_leading_silence(samples: usize) -> Self {
        Self {
            status: PhraseStatus::Waiting,
            phrase: Vec::new(),
            silence: 0,
            waited: 0,
            leading_silence_limit: samples,
        }
    }

    /// Feed one chunk of samples
    pub fn process(&mut self, samples: &[f32]) -> PhraseStatus {
        let is_speech = calculate_energy(samples) > ENERGY_THRESHOLD;

        match self.status {
            PhraseStatus::Waiting => {
                if is_speech {
                    self.status = PhraseStatus::Speaking;
                    self.phrase.extend_from_slice(samples);
                    self.silence = 0;
                    tracing::trace!("speech started");
                } else {
                    self.waited += samples.len();
                    if self.waited > self.leading_silence_limit {
                        self.status = PhraseStatus::TimedOut;
                    }
                }
            }
            PhraseStatus::Speaking => {
                self.phrase.extend_from_slice(samples);

                if is_speech {
                    self.silence = 0;
                } else {
                    self.silence += samples.len();
                }

                if self.silence > TRAILING_SILENCE_SAMPLES {
                    if self.phrase.len() - self.silence > MIN_SPEECH_SAMPLES {
                        tracing::debug!(samples = self.phrase.len(), "phrase complete");
                        self.status = PhraseStatus::Complete;
                    } else {
                        tracing::trace!("speech too short, discarding");
                        self.discard();
                    }
                }
            }
            PhraseStatus::Complete | PhraseStatus::TimedOut => {}
        }

        self.status
    }

    /// Take the finished phrase and reset
    pub fn take_phrase(&mut self) -> Vec<f32> {
        self.status = PhraseStatus::Waiting;
        self.silence = 0;
        self.waited = 0;
        std::mem::take(&mut self.phrase)
    }

    /// Samples of the phrase collected so far
    #[must_use]
    pub fn phrase(&self) -> &[f32] {
        &self.phrase
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> PhraseStatus {
        self.status
    }

    fn discard(&mut self) {
        self.status = PhraseStatus::Waiting;
        self.phrase.clear();
        self.silence = 0;
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_energy_calculation() {
        let silence = vec![0.0f32; 100];
        assert!(calculate_energy(&silence) < 0.001);

        let loud = vec![0.5f32; 100];
        assert!(calculate_energy(&loud) > 0.4);

        assert!(calculate_energy(&[]) < f32::EPSILON);
    }

    #[test]
    fn test_short_blip_is_discarded() {
        let mut detector = PhraseDetector::new();

        assert_eq!(detector.process(&[0.5; 800]), PhraseStatus::Speaking);
        for _ in 0..6 {
            detector.process(&[0.0; 1600]);
        }

        assert_eq!(detector.status(), PhraseStatus::Waiting);
        assert!(detector.phrase().is_empty());
    }
}
