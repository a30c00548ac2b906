use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

use super::config::{PlaybackTarget, SessionConfig};
use crate::audio::{
    AudioBackendFactory, CaptureBackend, OutputDevice, PlaybackListener, VirtualOutput,
};

/// Acquires the audio devices a session runs on
///
/// Called once per connect. Tests substitute their own devices here.
#[async_trait]
pub trait AudioDevices: Send + Sync {
    fn capture(&self, config: &SessionConfig) -> Result<Box<dyn CaptureBackend>>;

    /// Open the playback device. May block on hardware, so implementations
    /// move that work off the async workers.
    async fn output(
        &self,
        config: &SessionConfig,
        listener: Arc<dyn PlaybackListener>,
    ) -> Result<Box<dyn OutputDevice>>;
}

/// Devices chosen by `SessionConfig::audio_source` and `SessionConfig::playback`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemAudio;

#[async_trait]
impl AudioDevices for SystemAudio {
    fn capture(&self, config: &SessionConfig) -> Result<Box<dyn CaptureBackend>> {
        AudioBackendFactory::create(&config.audio_source, config.backend_config())
    }

    async fn output(
        &self,
        config: &SessionConfig,
        listener: Arc<dyn PlaybackListener>,
    ) -> Result<Box<dyn OutputDevice>> {
        match config.playback {
            PlaybackTarget::Virtual => Ok(Box::new(VirtualOutput::new(
                config.output_sample_rate,
                listener,
            ))),

            PlaybackTarget::Speaker => {
                #[cfg(feature = "cpal")]
                {
                    use crate::audio::device::SpeakerOutput;
                    use anyhow::Context;

                    let output = tokio::task::spawn_blocking(move || SpeakerOutput::new(listener))
                        .await
                        .context("Speaker setup task failed")??;
                    Ok(Box::new(output))
                }

                #[cfg(not(feature = "cpal"))]
                {
                    let _ = listener;
                    anyhow::bail!("Speaker playback requires building with the `cpal` feature")
                }
            }
        }
    }
}
