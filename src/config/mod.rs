//! Configuration management
//!
//! Layers, lowest precedence first: built-in defaults, the TOML file,
//! environment variables, then command-line overrides.

pub mod file;

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::orchestrator::SessionConfig;
use crate::voice::{SttProvider, Synthesizer, Transcriber, TtsProvider};
use crate::{Error, Result};

/// Default reasoning endpoint
pub const DEFAULT_INFERENCE_URL: &str = "http://localhost:8000/aiLoad";

/// Default relay command channel
pub const DEFAULT_COMMAND_URL: &str = "ws://localhost:8000/ws/switch-control/";

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_LEADING_SILENCE_SECS: f64 = 5.0;

/// Console configuration
#[derive(Debug)]
pub struct Config {
    /// Reasoning backend endpoint
    pub inference_url: Url,

    /// Per-request timeout for the reasoning backend
    pub inference_timeout: Duration,

    /// Relay WebSocket endpoint
    pub command_url: Url,

    /// Turn-taking behaviour
    pub session: SessionConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable voice input and output
    pub enabled: bool,

    pub stt_provider: SttProvider,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// BCP-47 recognition language
    pub language: String,

    /// Silence tolerated before any speech
    pub leading_silence: Duration,

    pub tts_provider: TtsProvider,

    /// TTS model (e.g. "tts-1", "eleven_monolingual_v1")
    pub tts_model: String,

    /// TTS speed multiplier
    pub tts_speed: f32,

    /// Word matched against voice names and tags
    pub preference: String,
}

/// API keys for the speech services
#[derive(Debug, Default)]
pub struct ApiKeys {
    pub openai: Option<SecretString>,
    pub elevenlabs: Option<SecretString>,
    pub deepgram: Option<SecretString>,
}

/// Command-line overrides, applied last
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    /// Explicit config file instead of the standard path
    pub config_path: Option<PathBuf>,
    /// Force voice off
    pub disable_voice: bool,
    pub inference_url: Option<String>,
    pub command_url: Option<String>,
}

impl Config {
    /// Load configuration from the file, the process environment and `overrides`
    ///
    /// # Errors
    ///
    /// Returns error if an explicit config file is unreadable or a value is invalid
    pub fn load(overrides: &Overrides) -> Result<Self> {
        let fc = match &overrides.config_path {
            Some(path) => file::load_from(path)?,
            None => file::load_config_file(),
        };

        Self::resolve(fc, |name| std::env::var(name).ok(), overrides)
    }

    /// Merge a parsed file, an environment lookup and overrides
    ///
    /// # Errors
    ///
    /// Returns error if a URL or provider name is invalid
    pub fn resolve(
        fc: file::ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: &Overrides,
    ) -> Result<Self> {
        let env_bool = |name: &str| env(name).map(|v| matches!(v.as_str(), "1" | "true" | "yes"));

        let inference_url = overrides
            .inference_url
            .clone()
            .or_else(|| env("RELAY_INFERENCE_URL"))
            .or(fc.inference.url)
            .unwrap_or_else(|| DEFAULT_INFERENCE_URL.to_string());
        let inference_url = parse_url(&inference_url, &["http", "https"])?;

        let inference_timeout = env("RELAY_INFERENCE_TIMEOUT_SECS")
            .and_then(|v| v.parse().ok())
            .or(fc.inference.timeout_secs)
            .map_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS), Duration::from_secs);

        let command_url = overrides
            .command_url
            .clone()
            .or_else(|| env("RELAY_COMMAND_URL"))
            .or(fc.relay.url)
            .unwrap_or_else(|| DEFAULT_COMMAND_URL.to_string());
        let command_url = parse_url(&command_url, &["ws", "wss"])?;

        let session = SessionConfig {
            auto_listen: env_bool("RELAY_AUTO_LISTEN")
                .or(fc.session.auto_listen)
                .unwrap_or(true),
            continuous: env_bool("RELAY_CONTINUOUS")
                .or(fc.session.continuous)
                .unwrap_or(false),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY")
                .or(fc.api_keys.openai)
                .map(SecretString::from),
            elevenlabs: env("ELEVENLABS_API_KEY")
                .or(fc.api_keys.elevenlabs)
                .map(SecretString::from),
            deepgram: env("DEEPGRAM_API_KEY")
                .or(fc.api_keys.deepgram)
                .map(SecretString::from),
        };

        let fv = fc.voice;
        let stt_provider = SttProvider::parse(
            &env("RELAY_STT_PROVIDER")
                .or(fv.stt_provider)
                .unwrap_or_else(|| "whisper".to_string()),
        )?;
        let tts_provider = TtsProvider::parse(
            &env("RELAY_TTS_PROVIDER")
                .or(fv.tts_provider)
                .unwrap_or_else(|| "openai".to_string()),
        )?;

        let leading_silence_secs = fv
            .leading_silence_secs
            .unwrap_or(DEFAULT_LEADING_SILENCE_SECS);
        let leading_silence = Duration::try_from_secs_f64(leading_silence_secs)
            .map_err(|e| Error::Config(format!("invalid leading_silence_secs: {e}")))?;

        let voice = VoiceConfig {
            enabled: !overrides.disable_voice
                && env_bool("RELAY_VOICE_ENABLED")
                    .or(fv.enabled)
                    .unwrap_or(true),
            stt_provider,
            stt_model: env("RELAY_STT_MODEL")
                .or(fv.stt_model)
                .unwrap_or_else(|| default_stt_model(stt_provider).to_string()),
            language: env("RELAY_LANGUAGE")
                .or(fv.language)
                .unwrap_or_else(|| "en-US".to_string()),
            leading_silence,
            tts_provider,
            tts_model: env("RELAY_TTS_MODEL")
                .or(fv.tts_model)
                .unwrap_or_else(|| default_tts_model(tts_provider).to_string()),
            tts_speed: env("RELAY_TTS_SPEED")
                .and_then(|v| v.parse().ok())
                .or(fv.tts_speed)
                .unwrap_or(1.0),
            preference: env("RELAY_VOICE_PREFERENCE")
                .or(fv.preference)
                .unwrap_or_else(|| "female".to_string()),
        };

        Ok(Self {
            inference_url,
            inference_timeout,
            command_url,
            session,
            voice,
            api_keys,
        })
    }

    /// Build the speech-to-text client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is missing
    pub fn transcriber(&self) -> Result<Transcriber> {
        let key = match self.voice.stt_provider {
            SttProvider::Whisper => self.api_keys.openai.as_ref(),
            SttProvider::Deepgram => self.api_keys.deepgram.as_ref(),
        };
        let key = key.map(copy_secret).ok_or_else(|| {
            Error::Config(format!(
                "no API key for {:?} speech-to-text",
                self.voice.stt_provider
            ))
        })?;

        Transcriber::new(
            self.voice.stt_provider,
            key,
            self.voice.stt_model.clone(),
            self.voice.language.clone(),
        )
    }

    /// Build the text-to-speech client for the configured backend
    ///
    /// # Errors
    ///
    /// Returns error if the backend's API key is missing
    pub fn synthesizer(&self) -> Result<Synthesizer> {
        let key = match self.voice.tts_provider {
            TtsProvider::OpenAi => self.api_keys.openai.as_ref(),
            TtsProvider::ElevenLabs => self.api_keys.elevenlabs.as_ref(),
        };
        let key = key.map(copy_secret).ok_or_else(|| {
            Error::Config(format!(
                "no API key for {:?} text-to-speech",
                self.voice.tts_provider
            ))
        })?;

        Synthesizer::new(
            self.voice.tts_provider,
            key,
            self.voice.tts_model.clone(),
            self.voice.tts_speed,
        )
    }
}

const fn default_stt_model(provider: SttProvider) -> &'static str {
    match provider {
        SttProvider::Whisper => "whisper-1",
        SttProvider::Deepgram => "nova-2",
    }
}

const fn default_tts_model(provider: TtsProvider) -> &'static str {
    match provider {
        TtsProvider::OpenAi => "tts-1",
        TtsProvider::ElevenLabs => "eleven_monolingual_v1",
    }
}

fn copy_secret(secret: &SecretString) -> SecretString {
    SecretString::from(secret.expose_secret().to_owned())
}

fn parse_url(raw: &str, schemes: &[&str]) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| Error::Config(format!("invalid URL {raw}: {e}")))?;
    if !schemes.contains(&url.scheme()) {
        return Err(Error::Config(format!(
            "URL {raw} must use one of: {}",
            schemes.join(", ")
        )));
    }
    Ok(url)
}
