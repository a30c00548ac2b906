use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::audio::{AudioBackendConfig, AudioSource};
use crate::error::AgentError;
use crate::live::messages::{
    AudioTranscriptionConfig, Content, GenerationConfig, Modality, SetupRequest, SpeechConfig,
};
use crate::live::DEFAULT_ENDPOINT;
use crate::onboarding::{payment_tool, system_instruction};

/// Where inbound speech is played
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackTarget {
    /// Default output device (requires the `cpal` feature)
    Speaker,
    /// Silent, clock-paced output
    Virtual,
}

/// Configuration for a live voice session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Websocket endpoint of the live API
    pub endpoint: String,

    /// Model identity, with or without the "models/" prefix
    pub model: String,

    /// Prebuilt voice for synthesized speech
    pub voice_name: String,

    /// Environment variables checked, in order, for the API key
    pub api_key_vars: Vec<String>,

    /// How long to wait for `setupComplete` after the socket opens
    pub setup_timeout: Duration,

    /// Capture rate the service expects (16kHz)
    pub input_sample_rate: u32,

    /// Rate of the PCM the service sends back (24kHz)
    pub output_sample_rate: u32,

    /// Samples per outbound audio frame
    pub frame_size: usize,

    /// Capture source
    pub audio_source: AudioSource,

    /// Playback sink
    pub playback: PlaybackTarget,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            api_key_vars: vec!["GEMINI_API_KEY".to_string(), "API_KEY".to_string()],
            setup_timeout: Duration::from_secs(15),
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            frame_size: 4096,
            audio_source: AudioSource::Microphone,
            playback: PlaybackTarget::Speaker,
        }
    }
}

impl SessionConfig {
    /// Read the API key from the environment.
    ///
    /// Checked once per connect, before any device or network resource is touched.
    pub fn read_api_key(&self) -> Result<String, AgentError> {
        self.api_key_vars
            .iter()
            .find_map(|var| std::env::var(var).ok().filter(|value| !value.trim().is_empty()))
            .ok_or_else(|| {
                AgentError::Configuration(format!(
                    "API key not set (checked {})",
                    self.api_key_vars.join(", ")
                ))
            })
    }

    pub fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            target_sample_rate: self.input_sample_rate,
            frame_size: self.frame_size,
            ..AudioBackendConfig::default()
        }
    }

    /// Setup message: audio responses, fixed voice, the onboarding script,
    /// the payment tool, and transcription in both directions
    pub fn setup_request(&self) -> SetupRequest {
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        SetupRequest {
            model,
            generation_config: GenerationConfig {
                response_modalities: vec![Modality::Audio],
                speech_config: Some(SpeechConfig::prebuilt(&self.voice_name)),
            },
            system_instruction: Some(Content::text(system_instruction())),
            tools: vec![payment_tool()],
            input_audio_transcription: Some(AudioTranscriptionConfig::default()),
            output_audio_transcription: Some(AudioTranscriptionConfig::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_rates() {
        let config = SessionConfig::default();
        assert_eq!(config.input_sample_rate, 16000);
        assert_eq!(config.output_sample_rate, 24000);
        assert_eq!(config.frame_size, 4096);
        assert_eq!(config.voice_name, "Zephyr");
    }

    #[test]
    fn test_setup_request_shape() {
        let setup = SessionConfig::default().setup_request();
        let json = serde_json::to_value(&setup).unwrap();

        assert_eq!(
            json["model"],
            "models/gemini-2.5-flash-native-audio-preview-09-2025"
        );
        assert_eq!(json["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Zephyr"
        );
        assert_eq!(json["inputAudioTranscription"], serde_json::json!({}));
        assert_eq!(json["outputAudioTranscription"], serde_json::json!({}));
        assert_eq!(
            json["tools"][0]["functionDeclarations"][0]["name"],
            "selectPaymentOption"
        );
    }

    #[test]
    fn test_missing_api_key_is_configuration_error() {
        let config = SessionConfig {
            api_key_vars: vec!["VOICE_ONBOARDING_TEST_UNSET_KEY".to_string()],
            ..SessionConfig::default()
        };
        let err = config.read_api_key().unwrap_err();
        assert!(matches!(err, AgentError::Configuration(_)));
    }
}
