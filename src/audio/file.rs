use anyhow::{bail, Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioBackendConfig, AudioFrame, CaptureBackend};

/// Mono f32 samples loaded from a WAV file
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<f32>,
}

impl AudioFile {
    /// Load a WAV file, mixing all channels down to mono
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let mut reader = WavReader::open(path).context("Failed to open WAV file")?;
        let spec = reader.spec();

        let interleaved: Vec<f32> = match (spec.sample_format, spec.bits_per_sample) {
            (hound::SampleFormat::Int, 16) => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / 32768.0))
                .collect::<Result<Vec<_>, _>>(),
            (hound::SampleFormat::Int, 32) => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
                .collect::<Result<Vec<_>, _>>(),
            (hound::SampleFormat::Float, 32) => {
                reader.samples::<f32>().collect::<Result<Vec<_>, _>>()
            }
            (format, bits) => bail!("Unsupported WAV format: {:?} {}-bit", format, bits),
        }
        .context("Failed to read audio samples")?;

        let channels = spec.channels.max(1);
        let samples = mix_to_mono(&interleaved, channels);
        let duration_seconds = samples.len() as f64 / spec.sample_rate as f64;

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Average interleaved channels into one
pub fn mix_to_mono(interleaved: &[f32], channels: u16) -> Vec<f32> {
    if channels <= 1 {
        return interleaved.to_vec();
    }
    interleaved
        .chunks_exact(channels as usize)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Capture backend that replays a WAV file as if it were a microphone
///
/// Frames are emitted at the rate they would arrive from a real device unless
/// pacing is disabled.
pub struct WavFileBackend {
    path: PathBuf,
    config: AudioBackendConfig,
    paced: bool,
    task: Option<JoinHandle<()>>,
}

impl WavFileBackend {
    pub fn new(path: PathBuf, config: AudioBackendConfig) -> Self {
        Self {
            path,
            config,
            paced: true,
            task: None,
        }
    }

    /// Emit frames as fast as the receiver accepts them
    pub fn unpaced(mut self) -> Self {
        self.paced = false;
        self
    }
}

#[async_trait::async_trait]
impl CaptureBackend for WavFileBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.is_capturing() {
            bail!("Already capturing");
        }

        let audio = AudioFile::open(&self.path)?;
        if audio.sample_rate != self.config.target_sample_rate {
            bail!(
                "Resampling not supported. Expected {}Hz, got {}Hz",
                self.config.target_sample_rate,
                audio.sample_rate
            );
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let frame_size = self.config.frame_size.max(1);
        let sample_rate = audio.sample_rate;
        let frame_duration = Duration::from_millis(self.config.frame_duration_ms().max(1));
        let paced = self.paced;

        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval(frame_duration);
            for (index, block) in audio.samples.chunks(frame_size).enumerate() {
                if paced {
                    interval.tick().await;
                }
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate,
                    timestamp_ms: index as u64 * frame_size as u64 * 1000 / sample_rate as u64,
                };
                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver dropped, stopping file capture");
                    return;
                }
            }
            debug!("Reached end of audio file");
        });

        self.task = Some(task);
        info!("File capture started: {}", self.path.display());

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(task) = self.task.take() {
            task.abort();
            info!("File capture stopped: {}", self.path.display());
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mix_to_mono_averages_channels() {
        let stereo = vec![0.5, -0.5, 1.0, 0.0];
        assert_eq!(mix_to_mono(&stereo, 2), vec![0.0, 0.5]);
    }

    #[test]
    fn test_mix_to_mono_passthrough() {
        let mono = vec![0.1, 0.2, 0.3];
        assert_eq!(mix_to_mono(&mono, 1), mono);
    }
}
