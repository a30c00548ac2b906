// cpal-backed microphone capture and speaker playback
//
// cpal streams are not Send on every platform, so each stream lives on its
// own thread for its whole life and is dropped there when asked to stop.
// Starting and joining those threads blocks, so it runs on tokio's blocking
// pool rather than on the async workers.

use anyhow::{anyhow, bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle as ThreadHandle;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use super::backend::{AudioBackendConfig, AudioFrame, CaptureBackend};
use super::codec::PcmBuffer;
use super::playback::{OutputDevice, PlaybackId, PlaybackListener};

/// Keeps a stream thread alive until stopped
struct StreamThread {
    stop_tx: std_mpsc::Sender<()>,
    handle: Option<ThreadHandle<()>>,
}

impl StreamThread {
    /// Run `build` on a dedicated thread and hold its stream until stopped.
    /// Blocks until the stream is playing or has failed to start.
    fn spawn<F>(name: &str, build: F) -> Result<Self>
    where
        F: FnOnce() -> Result<cpal::Stream> + Send + 'static,
    {
        let (ready_tx, ready_rx) = std_mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();

        let handle = std::thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match build() {
                    Ok(stream) => stream,
                    Err(e) => {
                        let _ = ready_tx.send(Err(format!("{:#}", e)));
                        return;
                    }
                };
                if let Err(e) = stream.play() {
                    let _ = ready_tx.send(Err(format!("Failed to start stream: {}", e)));
                    return;
                }
                let _ = ready_tx.send(Ok(()));
                // Blocks until stop() or until the sender is dropped
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn audio thread")?;

        match ready_rx.recv() {
            Ok(Ok(())) => Ok(Self {
                stop_tx,
                handle: Some(handle),
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(anyhow!(e))
            }
            Err(_) => {
                let _ = handle.join();
                Err(anyhow!("Audio thread exited before the stream started"))
            }
        }
    }

    fn join(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Audio thread panicked");
            }
        }
    }

    /// Stop the stream and wait for its thread on the blocking pool
    async fn shutdown(mut self) -> Result<()> {
        tokio::task::spawn_blocking(move || self.join())
            .await
            .context("Audio thread shutdown task failed")
    }
}

impl Drop for StreamThread {
    // Signal only: the thread drops its stream and exits on its own
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
    }
}

/// Mixes device audio down to mono, decimates and cuts it into frames
struct Framer {
    channels: usize,
    decimation: usize,
    phase: usize,
    frame_size: usize,
    sample_rate: u32,
    pending: Vec<f32>,
    started: Instant,
    tx: mpsc::Sender<AudioFrame>,
    dropped: u64,
}

impl Framer {
    fn push(&mut self, interleaved: impl Iterator<Item = f32>) {
        let mut acc = 0.0f32;
        let mut n = 0usize;
        for sample in interleaved {
            acc += sample;
            n += 1;
            if n < self.channels {
                continue;
            }
            let mono = acc / self.channels as f32;
            acc = 0.0;
            n = 0;

            if self.phase == 0 {
                self.pending.push(mono);
            }
            self.phase = (self.phase + 1) % self.decimation;

            if self.pending.len() == self.frame_size {
                let samples = std::mem::replace(&mut self.pending, Vec::with_capacity(self.frame_size));
                let frame = AudioFrame {
                    samples,
                    sample_rate: self.sample_rate,
                    timestamp_ms: self.started.elapsed().as_millis() as u64,
                };
                // Never block the audio callback
                if self.tx.try_send(frame).is_err() {
                    self.dropped += 1;
                    if self.dropped % 100 == 1 {
                        warn!("Capture channel full, dropped {} frames", self.dropped);
                    }
                }
            }
        }
    }
}

/// Default-microphone capture backend
pub struct MicrophoneBackend {
    config: AudioBackendConfig,
    thread: Option<StreamThread>,
}

impl MicrophoneBackend {
    pub fn new(config: AudioBackendConfig) -> Self {
        Self {
            config,
            thread: None,
        }
    }
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        if self.thread.is_some() {
            bail!("Already capturing");
        }

        let (tx, rx) = mpsc::channel(self.config.channel_capacity);
        let config = self.config.clone();

        let thread = tokio::task::spawn_blocking(move || {
            StreamThread::spawn("mic-capture", move || {
                let host = cpal::default_host();
                let device = host
                    .default_input_device()
                    .ok_or_else(|| anyhow!("No microphone device found"))?;
                let supported = device
                    .default_input_config()
                    .context("Failed to get microphone config")?;

                let device_rate = supported.sample_rate().0;
                if device_rate % config.target_sample_rate != 0 {
                    bail!(
                        "Microphone runs at {}Hz, which is not a multiple of {}Hz",
                        device_rate,
                        config.target_sample_rate
                    );
                }

                let mut framer = Framer {
                    channels: supported.channels().max(1) as usize,
                    decimation: (device_rate / config.target_sample_rate) as usize,
                    phase: 0,
                    frame_size: config.frame_size.max(1),
                    sample_rate: config.target_sample_rate,
                    pending: Vec::with_capacity(config.frame_size),
                    started: Instant::now(),
                    tx,
                    dropped: 0,
                };

                info!(
                    "Microphone: {}Hz, {} channels, decimation {}",
                    device_rate, framer.channels, framer.decimation
                );

                let stream_config: cpal::StreamConfig = supported.config();
                let on_error = |e| error!("Microphone stream error: {}", e);
                let stream = match supported.sample_format() {
                    cpal::SampleFormat::F32 => device.build_input_stream(
                        &stream_config,
                        move |data: &[f32], _: &cpal::InputCallbackInfo| {
                            framer.push(data.iter().copied())
                        },
                        on_error,
                        None,
                    ),
                    cpal::SampleFormat::I16 => device.build_input_stream(
                        &stream_config,
                        move |data: &[i16], _: &cpal::InputCallbackInfo| {
                            framer.push(data.iter().map(|&s| s as f32 / 32768.0))
                        },
                        on_error,
                        None,
                    ),
                    other => bail!("Unsupported microphone sample format: {:?}", other),
                }
                .context("Failed to create microphone stream")?;

                Ok(stream)
            })
        })
        .await
        .context("Microphone setup task failed")??;

        self.thread = Some(thread);
        info!("Microphone capture started");

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        if let Some(thread) = self.thread.take() {
            thread.shutdown().await?;
            info!("Microphone capture stopped");
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}

struct Voice {
    id: PlaybackId,
    start_frame: u64,
    samples: Vec<f32>,
}

#[derive(Default)]
struct Timeline {
    position: u64,
    voices: Vec<Voice>,
}

/// Linear-interpolation resampler for mono chunks
fn resample_linear(samples: &[f32], from: u32, to: u32) -> Vec<f32> {
    if from == to || samples.is_empty() {
        return samples.to_vec();
    }
    let out_len = (samples.len() as u64 * to as u64 / from as u64) as usize;
    let step = from as f64 / to as f64;
    (0..out_len)
        .map(|i| {
            let pos = i as f64 * step;
            let idx = pos as usize;
            let frac = (pos - idx as f64) as f32;
            let a = samples[idx.min(samples.len() - 1)];
            let b = samples[(idx + 1).min(samples.len() - 1)];
            a + (b - a) * frac
        })
        .collect()
}

/// Default-speaker output with a sample-accurate clock
pub struct SpeakerOutput {
    device_rate: u32,
    timeline: Arc<Mutex<Timeline>>,
    thread: Option<StreamThread>,
}

impl SpeakerOutput {
    /// Open the default output device. Blocks until the stream is playing,
    /// so call it off the async workers.
    pub fn new(listener: Arc<dyn PlaybackListener>) -> Result<Self> {
        let timeline = Arc::new(Mutex::new(Timeline::default()));
        let (rate_tx, rate_rx) = std_mpsc::channel::<u32>();
        let shared = Arc::clone(&timeline);

        let thread = StreamThread::spawn("speaker-output", move || {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| anyhow!("No output device found"))?;
            let supported = device
                .default_output_config()
                .context("Failed to get output config")?;
            if supported.sample_format() != cpal::SampleFormat::F32 {
                bail!("Unsupported output sample format: {:?}", supported.sample_format());
            }

            let channels = supported.channels().max(1) as usize;
            let _ = rate_tx.send(supported.sample_rate().0);

            let stream = device
                .build_output_stream(
                    &supported.config(),
                    move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                        let Ok(mut timeline) = shared.lock() else {
                            data.fill(0.0);
                            return;
                        };
                        let frames = data.len() / channels;
                        let base = timeline.position;
                        for (i, frame) in data.chunks_mut(channels).enumerate() {
                            let pos = base + i as u64;
                            let mut sum = 0.0f32;
                            for voice in &timeline.voices {
                                if pos >= voice.start_frame {
                                    if let Some(s) = voice.samples.get((pos - voice.start_frame) as usize) {
                                        sum += s;
                                    }
                                }
                            }
                            frame.fill(sum.clamp(-1.0, 1.0));
                        }
                        timeline.position += frames as u64;

                        let position = timeline.position;
                        let mut finished = Vec::new();
                        timeline.voices.retain(|voice| {
                            let done = voice.start_frame + voice.samples.len() as u64 <= position;
                            if done {
                                finished.push(voice.id);
                            }
                            !done
                        });
                        drop(timeline);
                        for id in finished {
                            listener.chunk_ended(id);
                        }
                    },
                    |e| error!("Output stream error: {}", e),
                    None,
                )
                .context("Failed to create output stream")?;

            Ok(stream)
        })?;

        let device_rate = rate_rx
            .recv()
            .map_err(|_| anyhow!("Output device did not report a sample rate"))?;

        info!("Speaker output started at {}Hz", device_rate);

        Ok(Self {
            device_rate,
            timeline,
            thread: Some(thread),
        })
    }
}

impl OutputDevice for SpeakerOutput {
    fn sample_rate(&self) -> u32 {
        self.device_rate
    }

    fn current_time(&self) -> f64 {
        match self.timeline.lock() {
            Ok(timeline) => timeline.position as f64 / self.device_rate as f64,
            Err(_) => 0.0,
        }
    }

    fn start(&mut self, id: PlaybackId, buffer: PcmBuffer, at: f64) -> Result<()> {
        if self.thread.is_none() {
            bail!("Output device is closed");
        }
        let mono = super::file::mix_to_mono(&buffer.samples, buffer.channels);
        let samples = resample_linear(&mono, buffer.sample_rate, self.device_rate);
        let start_frame = (at.max(0.0) * self.device_rate as f64).round() as u64;

        let mut timeline = self
            .timeline
            .lock()
            .map_err(|_| anyhow!("Output timeline poisoned"))?;
        timeline.voices.push(Voice {
            id,
            start_frame,
            samples,
        });
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.retain(|voice| voice.id != id);
        }
    }

    fn close(&mut self) -> Result<()> {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.voices.clear();
        }
        if let Some(thread) = self.thread.take() {
            // Dropping signals the stream thread without waiting for it
            drop(thread);
            info!("Speaker output closed");
        }
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.thread.is_none()
    }
}
