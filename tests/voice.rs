//! Voice pipeline integration tests
//!
//! Tests voice components without requiring audio hardware

use std::io::Cursor;

use relay_console::voice::{
    PhraseDetector, PhraseStatus, SAMPLE_RATE, Voice, VoiceCatalog, decode_mp3, openai_voices,
    samples_to_wav, select_voice,
};

mod common;

/// Processing chunk used by the recognizer (100ms)
const CHUNK: usize = 1600;

/// Generate sine wave audio samples
fn generate_sine_samples(frequency: f32, duration_secs: f32, amplitude: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    (0..num_samples)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            amplitude * (2.0 * std::f32::consts::PI * frequency * t).sin()
        })
        .collect()
}

/// Generate silence
fn generate_silence(duration_secs: f32) -> Vec<f32> {
    let num_samples = (SAMPLE_RATE as f32 * duration_secs) as usize;
    vec![0.0; num_samples]
}

/// Feed audio in recognizer-sized chunks, returning the last status
fn feed(detector: &mut PhraseDetector, samples: &[f32]) -> PhraseStatus {
    let mut status = detector.status();
    for chunk in samples.chunks(CHUNK) {
        status = detector.process(chunk);
        if matches!(status, PhraseStatus::Complete | PhraseStatus::TimedOut) {
            break;
        }
    }
    status
}

#[test]
fn test_phrase_detector_starts_waiting() {
    let detector = PhraseDetector::new();
    assert_eq!(detector.status(), PhraseStatus::Waiting);
    assert!(detector.phrase().is_empty());
}

#[test]
fn test_phrase_completes_after_trailing_silence() {
    let mut detector = PhraseDetector::new();

    let speech = generate_sine_samples(440.0, 1.0, 0.5);
    assert_eq!(feed(&mut detector, &speech), PhraseStatus::Speaking);

    let silence = generate_silence(1.0);
    assert_eq!(feed(&mut detector, &silence), PhraseStatus::Complete);

    let phrase = detector.take_phrase();
    assert!(phrase.len() >= speech.len());
    assert_eq!(detector.status(), PhraseStatus::Waiting);
}

#[test]
fn test_quiet_audio_is_not_speech() {
    let mut detector = PhraseDetector::new();

    let hum = generate_sine_samples(60.0, 1.0, 0.01);
    assert_eq!(feed(&mut detector, &hum), PhraseStatus::Waiting);
    assert!(detector.phrase().is_empty());
}

#[test]
fn test_short_blip_is_discarded() {
    let mut detector = PhraseDetector::new();

    let blip = generate_sine_samples(440.0, 0.2, 0.5);
    assert_eq!(feed(&mut detector, &blip), PhraseStatus::Speaking);
    assert_eq!(feed(&mut detector, &generate_silence(1.0)), PhraseStatus::Waiting);
    assert!(detector.phrase().is_empty());
}

#[test]
fn test_leading_silence_times_out() {
    let mut detector = PhraseDetector::with_leading_silence(SAMPLE_RATE as usize / 2);

    let silence = generate_silence(1.0);
    assert_eq!(feed(&mut detector, &silence), PhraseStatus::TimedOut);
}

#[test]
fn test_default_leading_silence_is_five_seconds() {
    let mut detector = PhraseDetector::new();

    assert_eq!(feed(&mut detector, &generate_silence(4.5)), PhraseStatus::Waiting);
    assert_eq!(feed(&mut detector, &generate_silence(1.0)), PhraseStatus::TimedOut);
}

#[test]
fn test_samples_to_wav() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    assert_eq!(&wav[0..4], b"RIFF");
    assert_eq!(&wav[8..12], b"WAVE");
}

#[test]
fn test_wav_roundtrip() {
    let samples = generate_sine_samples(440.0, 0.1, 0.5);
    let wav = samples_to_wav(&samples, SAMPLE_RATE).unwrap();

    let reader = hound::WavReader::new(Cursor::new(wav)).unwrap();
    let spec = reader.spec();
    assert_eq!(spec.channels, 1);
    assert_eq!(spec.sample_rate, SAMPLE_RATE);
    assert_eq!(spec.bits_per_sample, 16);
    assert_eq!(reader.len() as usize, samples.len());
}

#[test]
fn test_decode_empty_input() {
    let audio = decode_mp3(&[]).unwrap();
    assert!(audio.samples.is_empty());
}

#[test]
fn test_openai_catalog_prefers_female_voice() {
    let voices = openai_voices();
    let voice = select_voice(&voices, "female").unwrap();
    assert!(voice.tags.iter().any(|t| t == "female"));
}

#[test]
fn test_unknown_preference_falls_back_to_first_voice() {
    let voices = openai_voices();
    let voice = select_voice(&voices, "robotic").unwrap();
    assert_eq!(voice.id, voices[0].id);
}

#[tokio::test]
async fn test_catalog_wait_resolves_on_populate() {
    let catalog = VoiceCatalog::pending();
    let waiter = {
        let catalog = catalog.clone();
        tokio::spawn(async move { catalog.voices_or_wait().await })
    };

    tokio::task::yield_now().await;
    catalog.populate(vec![Voice {
        id: "21m00Tcm4TlvDq8ikWAM".to_string(),
        name: "Rachel".to_string(),
        tags: vec!["female".to_string(), "american".to_string()],
    }]);

    let voices = tokio::time::timeout(common::WAIT, waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(select_voice(&voices, "female").unwrap().name, "Rachel");
}
