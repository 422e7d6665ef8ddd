//! TOML configuration file loading
//!
//! Supports `~/.config/relay-console/config.toml` as a persistent config
//! source. All fields are optional; the file is a partial overlay on top of
//! defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::{Error, Result};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub session: SessionFileConfig,

    /// Reasoning backend
    #[serde(default)]
    pub inference: InferenceFileConfig,

    /// Device command channel
    #[serde(default)]
    pub relay: RelayFileConfig,

    /// Voice input/output
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for speech services
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct SessionFileConfig {
    /// Start listening as soon as a session starts
    pub auto_listen: Option<bool>,

    /// Listen again after every reply
    pub continuous: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InferenceFileConfig {
    /// Endpoint URL (e.g. `http://localhost:8000/aiLoad`)
    pub url: Option<String>,

    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RelayFileConfig {
    /// WebSocket URL (e.g. `ws://localhost:8000/ws/switch-control/`)
    pub url: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable voice input/output
    pub enabled: Option<bool>,

    /// STT backend ("whisper" or "deepgram")
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    pub stt_model: Option<String>,

    /// Recognition language tag (e.g. "en-US")
    pub language: Option<String>,

    /// Seconds of silence before capture gives up waiting for speech
    pub leading_silence_secs: Option<f64>,

    /// TTS backend ("openai" or "elevenlabs")
    pub tts_provider: Option<String>,

    /// TTS model (e.g. "tts-1")
    pub tts_model: Option<String>,

    /// TTS speed multiplier
    pub tts_speed: Option<f32>,

    /// Word matched against voice names and tags (e.g. "female")
    pub preference: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ApiKeysFileConfig {
    pub openai: Option<String>,
    pub elevenlabs: Option<String>,
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
#[must_use]
pub fn load_config_file() -> ConfigFile {
    let Some(path) = config_file_path() else {
        return ConfigFile::default();
    };

    if !path.exists() {
        return ConfigFile::default();
    }

    match load_from(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to load config file, using defaults"
            );
            ConfigFile::default()
        }
    }
}

/// Load a config file the user pointed at explicitly
///
/// # Errors
///
/// Returns error if the file cannot be read or parsed
pub fn load_from(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
    let config = toml::from_str(&content)?;
    tracing::info!(path = %path.display(), "loaded config file");
    Ok(config)
}

/// Return the config file path: `~/.config/relay-console/config.toml`
#[must_use]
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("relay-console").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_partial_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[session]
continuous = true

[voice]
preference = "male"
"#
        )
        .unwrap();

        let config = load_from(file.path()).unwrap();
        assert_eq!(config.session.continuous, Some(true));
        assert_eq!(config.session.auto_listen, None);
        assert_eq!(config.voice.preference.as_deref(), Some("male"));
        assert!(config.inference.url.is_none());
    }

    #[test]
    fn test_unknown_section_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dashboard]\ntheme = \"dark\"").unwrap();

        assert!(matches!(load_from(file.path()), Err(Error::Toml(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = load_from(Path::new("/nonexistent/relay-console.toml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
