//! Text-to-speech (TTS) backends

use secrecy::{ExposeSecret, SecretString};

use super::catalog::Voice;
use crate::{Error, Result};

/// TTS provider backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TtsProvider {
    /// `OpenAI` speech endpoint
    OpenAi,
    /// `ElevenLabs`
    ElevenLabs,
}

impl TtsProvider {
    /// Parse a provider name from configuration
    ///
    /// # Errors
    ///
    /// Returns error for unknown provider names
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "elevenlabs" | "eleven_labs" => Ok(Self::ElevenLabs),
            other => Err(Error::Config(format!("unknown TTS provider: {other}"))),
        }
    }
}

/// `OpenAI` voices with the descriptive tags used for voice preference
const OPENAI_VOICES: &[(&str, &[&str])] = &[
    ("alloy", &["neutral"]),
    ("echo", &["male"]),
    ("fable", &["male", "british"]),
    ("onyx", &["male", "deep"]),
    ("nova", &["female"]),
    ("shimmer", &["female"]),
];

#[derive(serde::Deserialize)]
struct ElevenLabsVoices {
    voices: Vec<ElevenLabsVoice>,
}

#[derive(serde::Deserialize)]
struct ElevenLabsVoice {
    voice_id: String,
    name: String,
    #[serde(default)]
    labels: std::collections::HashMap<String, String>,
}

/// Synthesizes speech from text
pub struct Synthesizer {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    speed: f32,
    provider: TtsProvider,
}

impl Synthesizer {
    /// Create a synthesizer
    ///
    /// # Errors
    ///
    /// Returns error if the API key is empty
    pub fn new(
        provider: TtsProvider,
        api_key: SecretString,
        model: String,
        speed: f32,
    ) -> Result<Self> {
        if api_key.expose_secret().is_empty() {
            return Err(Error::Config(format!("API key required for {provider:?} TTS")));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            speed,
            provider,
        })
    }

    /// Backend in use
    #[must_use]
    pub const fn provider(&self) -> TtsProvider {
        self.provider
    }

    /// Voices the backend offers
    ///
    /// # Errors
    ///
    /// Returns error if the voice list cannot be fetched
    pub async fn list_voices(&self) -> Result<Vec<Voice>> {
        match self.provider {
            TtsProvider::OpenAi => Ok(openai_voices()),
            TtsProvider::ElevenLabs => self.list_elevenlabs_voices().await,
        }
    }

    /// Synthesize `text` with the given voice
    ///
    /// Returns MP3 bytes.
    ///
    /// # Errors
    ///
    /// Returns error if synthesis fails
    pub async fn synthesize(&self, text: &str, voice: &Voice) -> Result<Vec<u8>> {
        match self.provider {
            TtsProvider::OpenAi => self.synthesize_openai(text, voice).await,
            TtsProvider::ElevenLabs => self.synthesize_elevenlabs(text, voice).await,
        }
    }

    async fn synthesize_openai(&self, text: &str, voice: &Voice) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct TtsRequest<'a> {
            model: &'a str,
            input: &'a str,
            voice: &'a str,
            speed: f32,
        }

        let request = TtsRequest {
            model: &self.model,
            input: text,
            voice: &voice.id,
            speed: self.speed,
        };

        let response = self
            .client
            .post("https://api.openai.com/v1/audio/speech")
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("OpenAI TTS error {status}: {body}")));
        }

        let audio = response.bytes().await.map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }

    async fn synthesize_elevenlabs(&self, text: &str, voice: &Voice) -> Result<Vec<u8>> {
        #[derive(serde::Serialize)]
        struct ElevenLabsRequest<'a> {
            text: &'a str,
            model_id: &'a str,
        }

        let url = format!(
            "https://api.elevenlabs.io/v1/text-to-speech/{}",
            voice.id
        );

        let response = self
            .client
            .post(&url)
            .header("xi-api-key", self.api_key.expose_secret())
            .header("Accept", "audio/mpeg")
            .json(&ElevenLabsRequest {
                text,
                model_id: &self.model,
            })
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Tts(format!("ElevenLabs TTS error {status}: {body}")));
        }

        let audio = response.bytes().await.map_err(|e| Error::Tts(e.to_string()))?;
        Ok(audio.to_vec())
    }

    async fn list_elevenlabs_voices(&self) -> Result<Vec<Voice>> {
        let response = self
            .client
            .get("https://api.elevenlabs.io/v1/voices")
            .header("xi-api-key", self.api_key.expose_secret())
            .send()
            .await
            .map_err(|e| Error::Tts(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            return Err(Error::Tts(format!("ElevenLabs voice list error {status}")));
        }

        let body: ElevenLabsVoices = response
            .json()
            .await
            .map_err(|e| Error::Tts(format!("failed to parse voice list: {e}")))?;

        Ok(body
            .voices
            .into_iter()
            .map(|v| Voice {
                id: v.voice_id,
                name: v.name,
                tags: v.labels.into_values().collect(),
            })
            .collect())
    }
}

/// Built-in `OpenAI` voice list
#[must_use]
pub fn openai_voices() -> Vec<Voice> {
    OPENAI_VOICES
        .iter()
        .map(|(id, tags)| Voice {
            id: (*id).to_string(),
            name: (*id).to_string(),
            tags: tags.iter().map(|t| (*t).to_string()).collect(),
        })
        .collect()
}
