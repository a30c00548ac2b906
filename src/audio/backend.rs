use anyhow::Result;
use std::path::PathBuf;
use tokio::sync::mpsc;

/// One captured block of microphone audio
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Normalized samples (f32, mono)
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }
}

/// Configuration for audio capture
#[derive(Debug, Clone)]
pub struct AudioBackendConfig {
    /// Capture sample rate the live service expects
    pub target_sample_rate: u32,
    /// Samples per delivered frame
    pub frame_size: usize,
    /// Frames buffered between the device and the session before dropping
    pub channel_capacity: usize,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000, // 16kHz for the live input stream
            frame_size: 4096,
            channel_capacity: 32,
        }
    }
}

impl AudioBackendConfig {
    /// Duration of one frame in milliseconds
    pub fn frame_duration_ms(&self) -> u64 {
        self.frame_size as u64 * 1000 / self.target_sample_rate.max(1) as u64
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`cpal` feature)
/// - File: read from a WAV file, paced in real time (headless runs, testing)
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive fixed-size frames
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop capturing audio (no-op when not capturing)
    async fn stop(&mut self) -> Result<()>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Audio source type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioSource {
    /// Default microphone (requires the `cpal` feature)
    Microphone,
    /// WAV file stand-in for a microphone
    File(PathBuf),
}

/// Audio backend factory
pub struct AudioBackendFactory;

impl AudioBackendFactory {
    /// Create a capture backend for the given source
    pub fn create(
        source: &AudioSource,
        config: AudioBackendConfig,
    ) -> Result<Box<dyn CaptureBackend>> {
        match source {
            AudioSource::Microphone => {
                #[cfg(feature = "cpal")]
                {
                    use super::device::MicrophoneBackend;
                    Ok(Box::new(MicrophoneBackend::new(config)))
                }

                #[cfg(not(feature = "cpal"))]
                {
                    let _ = config;
                    anyhow::bail!("Microphone capture requires building with the `cpal` feature")
                }
            }

            AudioSource::File(path) => {
                use super::file::WavFileBackend;
                Ok(Box::new(WavFileBackend::new(path.clone(), config)))
            }
        }
    }
}
