use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::audio::AudioSource;
use crate::session::{PlaybackTarget, SessionConfig};

/// Prefix of environment overrides, e.g. `VOICE_ONBOARDING__LIVE__VOICE_NAME=Puck`
pub const ENV_PREFIX: &str = "VOICE_ONBOARDING";

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub live: LiveConfig,
    pub audio: AudioConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

#[derive(Debug, Deserialize)]
pub struct LiveConfig {
    pub endpoint: String,
    pub model: String,
    pub voice_name: String,
    /// Environment variables holding the API key, first match wins
    pub api_key_vars: Vec<String>,
    #[serde(default = "default_setup_timeout_secs")]
    pub setup_timeout_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    pub input_sample_rate: u32,
    pub output_sample_rate: u32,
    pub frame_size: usize,
    pub playback: PlaybackTarget,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_setup_timeout_secs() -> u64 {
    15
}

impl Config {
    /// Load `path` (extension optional) with `VOICE_ONBOARDING__*` overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Session settings for capturing from `audio_source`
    pub fn session_config(&self, audio_source: AudioSource) -> SessionConfig {
        SessionConfig {
            endpoint: self.live.endpoint.clone(),
            model: self.live.model.clone(),
            voice_name: self.live.voice_name.clone(),
            api_key_vars: self.live.api_key_vars.clone(),
            setup_timeout: Duration::from_secs(self.live.setup_timeout_secs),
            input_sample_rate: self.audio.input_sample_rate,
            output_sample_rate: self.audio.output_sample_rate,
            frame_size: self.audio.frame_size,
            audio_source,
            playback: self.audio.playback,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[service]
name = "voice-onboarding"

[live]
endpoint = "wss://example.test/live"
model = "gemini-2.5-flash-native-audio-preview-09-2025"
voice_name = "Zephyr"
api_key_vars = ["GEMINI_API_KEY"]

[audio]
input_sample_rate = 16000
output_sample_rate = 24000
frame_size = 4096
playback = "virtual"
"#
        )
        .unwrap();

        let config = Config::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.service.log_level, "info");
        assert_eq!(config.audio.playback, PlaybackTarget::Virtual);

        let session = config.session_config(AudioSource::Microphone);
        assert_eq!(session.endpoint, "wss://example.test/live");
        assert_eq!(session.frame_size, 4096);
        assert_eq!(session.api_key_vars, vec!["GEMINI_API_KEY".to_string()]);
        assert_eq!(session.setup_timeout, Duration::from_secs(15));
    }

    #[test]
    fn test_missing_file_fails() {
        assert!(Config::load("/nonexistent/voice-onboarding").is_err());
    }
}
