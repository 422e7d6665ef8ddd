//! Speech playback to speakers

use std::future::Future;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedStreamConfigRange};
use tokio::sync::mpsc;

use super::PlaybackSink;
use super::catalog::{VoiceCatalog, select_voice};
use super::tts::{Synthesizer, TtsProvider, openai_voices};
use crate::{Error, Result};

/// Decoded audio ready for a device
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    /// Mono samples in `[-1.0, 1.0]`
    pub samples: Vec<f32>,
    /// Samples per second
    pub sample_rate: u32,
}

/// Plays mono samples on the default output device
///
/// The device is opened per call; cpal streams cannot leave the thread that
/// built them, so callers run [`AudioPlayback::play`] on a blocking thread.
pub struct AudioPlayback;

impl AudioPlayback {
    /// Play samples and block until they have been rendered
    ///
    /// # Errors
    ///
    /// Returns error if no output device can play the given rate
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn play(audio: &DecodedAudio) -> Result<()> {
        if audio.samples.is_empty() {
            return Ok(());
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Playback("no output device available".to_string()))?;

        let config = output_config(&device, audio.sample_rate)?;
        let channels = usize::from(config.channels);

        let samples: Arc<[f32]> = audio.samples.as_slice().into();
        let position = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicBool::new(false));

        let stream = {
            let samples = Arc::clone(&samples);
            let position = Arc::clone(&position);
            let finished = Arc::clone(&finished);

            device
                .build_output_stream(
                    &config,
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        for frame in data.chunks_mut(channels) {
                            let pos = position.load(Ordering::Relaxed);
                            let sample = if let Some(&s) = samples.get(pos) {
                                position.store(pos + 1, Ordering::Relaxed);
                                s
                            } else {
                                finished.store(true, Ordering::Release);
                                0.0
                            };
                            frame.fill(sample);
                        }
                    },
                    |err| {
                        tracing::error!(error = %err, "audio playback error");
                    },
                    None,
                )
                .map_err(|e| Error::Playback(e.to_string()))?
        };

        stream.play().map_err(|e| Error::Playback(e.to_string()))?;

        let duration_ms =
            (samples.len() as u64 * 1000) / u64::from(audio.sample_rate.max(1));
        let deadline = Instant::now() + Duration::from_millis(duration_ms + 500);

        while !finished.load(Ordering::Acquire) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(50));
        }

        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
        drop(stream);

        tracing::debug!(samples = samples.len(), "playback complete");
        Ok(())
    }
}

fn output_config(device: &cpal::Device, sample_rate: u32) -> Result<StreamConfig> {
    let supports = |c: &SupportedStreamConfigRange, channels: u16| {
        c.channels() == channels
            && c.min_sample_rate() <= SampleRate(sample_rate)
            && c.max_sample_rate() >= SampleRate(sample_rate)
    };

    let configs: Vec<SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|e| Error::Playback(e.to_string()))?
        .collect();

    // Mono first, stereo as fallback
    let range = configs
        .iter()
        .find(|c| supports(c, 1))
        .or_else(|| configs.iter().find(|c| supports(c, 2)))
        .ok_or_else(|| {
            Error::Playback(format!("no output config supports {sample_rate} Hz"))
        })?;

    Ok(range.clone().with_sample_rate(SampleRate(sample_rate)).config())
}

/// Decode MP3 bytes to mono samples
///
/// # Errors
///
/// Returns error if the data is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut audio = DecodedAudio::default();

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                if audio.sample_rate == 0 {
                    audio.sample_rate = u32::try_from(frame.sample_rate).unwrap_or(0);
                }

                if frame.channels == 2 {
                    audio.samples.extend(frame.data.chunks(2).map(|pair| {
                        let left = f32::from(pair[0]) / 32768.0;
                        let right = f32::from(pair.get(1).copied().unwrap_or(pair[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    audio
                        .samples
                        .extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(audio)
}

/// Synthesizes one text and plays it on the output device
struct Speaker {
    synthesizer: Arc<Synthesizer>,
    catalog: VoiceCatalog,
    preference: String,
    output: tokio::sync::Mutex<()>,
}

impl Speaker {
    async fn speak(&self, text: &str) -> Result<()> {
        if text.trim().is_empty() {
            tracing::debug!("nothing to speak");
            return Ok(());
        }

        // Held from synthesis through playback so outputs keep their order
        let _guard = self.output.lock().await;

        let voices = self
            .catalog
            .voices_or_wait()
            .await
            .ok_or_else(|| Error::Playback("voice catalog unavailable".to_string()))?;
        let voice = select_voice(&voices, &self.preference)
            .ok_or_else(|| Error::Playback("no voices available".to_string()))?;

        tracing::debug!(voice = %voice.id, chars = text.len(), "synthesizing reply");
        let mp3 = self.synthesizer.synthesize(text, voice).await?;
        let audio = decode_mp3(&mp3)?;

        tokio::task::spawn_blocking(move || AudioPlayback::play(&audio))
            .await
            .map_err(|e| Error::Playback(format!("playback task failed: {e}")))?
    }
}

/// Run `speak` for each queued text, one at a time and in queue order
///
/// The task ends once every sender is dropped. Must be called from within
/// a Tokio runtime.
pub(crate) fn spawn_speech_queue<F, Fut>(speak: F) -> mpsc::UnboundedSender<String>
where
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            speak(text).await;
        }
        tracing::debug!("speech queue closed");
    });
    tx
}

/// [`PlaybackSink`] that synthesizes and plays replies
///
/// Replies are spoken one at a time in the order they were handed over.
#[derive(Clone)]
pub struct SpeechPlayback {
    speaker: Arc<Speaker>,
    queue: mpsc::UnboundedSender<String>,
}

impl SpeechPlayback {
    /// Create a playback sink
    ///
    /// `preference` is matched against voice names and tags, e.g. `female`.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn new(synthesizer: Synthesizer, catalog: VoiceCatalog, preference: String) -> Self {
        let speaker = Arc::new(Speaker {
            synthesizer: Arc::new(synthesizer),
            catalog,
            preference,
            output: tokio::sync::Mutex::new(()),
        });

        let worker = Arc::clone(&speaker);
        let queue = spawn_speech_queue(move |text| {
            let worker = Arc::clone(&worker);
            async move {
                if let Err(e) = worker.speak(&text).await {
                    tracing::warn!(error = %e, "speech output failed");
                }
            }
        });

        Self { speaker, queue }
    }

    /// Create a playback sink with the catalog the backend calls for
    ///
    /// `OpenAI` voices are known up front. `ElevenLabs` voices are listed in
    /// the background; until that finishes, speech waits for the catalog.
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn spawn(synthesizer: Synthesizer, preference: String) -> Self {
        let catalog = match synthesizer.provider() {
            TtsProvider::OpenAi => VoiceCatalog::ready(openai_voices()),
            TtsProvider::ElevenLabs => VoiceCatalog::pending(),
        };
        let playback = Self::new(synthesizer, catalog, preference);

        if playback.catalog().snapshot().is_none() {
            let synthesizer = Arc::clone(&playback.speaker.synthesizer);
            let catalog = playback.catalog().clone();
            tokio::spawn(async move {
                let voices = synthesizer.list_voices().await.unwrap_or_else(|e| {
                    tracing::warn!(error = %e, "failed to list voices");
                    Vec::new()
                });
                catalog.populate(voices);
            });
        }

        playback
    }

    /// Voice catalog this sink selects from
    #[must_use]
    pub fn catalog(&self) -> &VoiceCatalog {
        &self.speaker.catalog
    }

    /// Synthesize and play `text`, returning once it has been played
    ///
    /// Blank text is skipped. Waits for any output already playing.
    ///
    /// # Errors
    ///
    /// Returns error if no voice is available, or synthesis or playback fails
    pub async fn speak_and_wait(&self, text: &str) -> Result<()> {
        self.speaker.speak(text).await
    }
}

impl PlaybackSink for SpeechPlayback {
    fn speak(&self, text: &str) {
        if self.queue.send(text.to_string()).is_err() {
            tracing::warn!("speech queue closed, reply not spoken");
        }
    }
}
