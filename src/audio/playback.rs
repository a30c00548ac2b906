// Gap-free playback scheduling
//
// Inbound audio arrives as discrete network messages. Each decoded chunk is
// started on the output device clock exactly where the previous one ends, so
// consecutive chunks play back-to-back. A chunk is never started in the past.

use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::codec::PcmBuffer;

/// Identifies one scheduled chunk on an output device
pub type PlaybackId = u64;

/// Receives completion notifications from an output device
pub trait PlaybackListener: Send + Sync {
    /// Called once when a chunk finishes playing naturally.
    /// Stopped chunks are not reported.
    fn chunk_ended(&self, id: PlaybackId);
}

/// An audio output with its own monotonic clock
pub trait OutputDevice: Send {
    /// Output sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Device clock in seconds
    fn current_time(&self) -> f64;

    /// Start playing `buffer` at device time `at`
    fn start(&mut self, id: PlaybackId, buffer: PcmBuffer, at: f64) -> Result<()>;

    /// Stop a chunk immediately (no-op for unknown or finished chunks)
    fn stop(&mut self, id: PlaybackId);

    /// Release the device. Closing an already-closed device succeeds.
    fn close(&mut self) -> Result<()>;

    fn is_closed(&self) -> bool;
}

/// Placement of one scheduled chunk on the device timeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledChunk {
    pub id: PlaybackId,
    pub start_time: f64,
    pub duration: f64,
}

/// Schedules decoded chunks back-to-back and tracks the ones in flight
pub struct PlaybackScheduler {
    device: Box<dyn OutputDevice>,
    next_start_time: f64,
    scheduled: HashSet<PlaybackId>,
    next_id: PlaybackId,
}

impl PlaybackScheduler {
    pub fn new(device: Box<dyn OutputDevice>) -> Self {
        Self {
            device,
            next_start_time: 0.0,
            scheduled: HashSet::new(),
            next_id: 0,
        }
    }

    /// Schedule a chunk right after the previously scheduled one
    pub fn schedule_chunk(&mut self, buffer: PcmBuffer) -> Result<ScheduledChunk> {
        self.next_start_time = self.next_start_time.max(self.device.current_time());

        let id = self.next_id;
        self.next_id += 1;

        let start_time = self.next_start_time;
        let duration = buffer.duration_secs();
        self.device.start(id, buffer, start_time)?;

        self.next_start_time += duration;
        self.scheduled.insert(id);

        debug!(
            "Scheduled chunk {} at {:.3}s ({:.3}s, {} in flight)",
            id,
            start_time,
            duration,
            self.scheduled.len()
        );

        Ok(ScheduledChunk {
            id,
            start_time,
            duration,
        })
    }

    /// Record that a chunk finished. Returns true when this left nothing in flight.
    pub fn chunk_ended(&mut self, id: PlaybackId) -> bool {
        self.scheduled.remove(&id) && self.scheduled.is_empty()
    }

    /// Stop everything in flight and reset the cursor (barge-in)
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.scheduled.len();
        for id in self.scheduled.drain() {
            self.device.stop(id);
        }
        self.next_start_time = 0.0;
        if stopped > 0 {
            debug!("Interrupted playback: {} chunks stopped", stopped);
        }
        stopped
    }

    /// Stop playback and release the device
    pub fn close(&mut self) -> Result<()> {
        self.interrupt();
        if self.device.is_closed() {
            return Ok(());
        }
        self.device.close()
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn in_flight(&self) -> usize {
        self.scheduled.len()
    }

    pub fn is_idle(&self) -> bool {
        self.scheduled.is_empty()
    }

    pub fn is_scheduled(&self, id: PlaybackId) -> bool {
        self.scheduled.contains(&id)
    }

    pub fn device(&self) -> &dyn OutputDevice {
        self.device.as_ref()
    }
}

/// Silent output paced by the tokio clock
///
/// Reports completion exactly when a real device would, without producing
/// sound. Used for headless runs and tests.
pub struct VirtualOutput {
    sample_rate: u32,
    origin: Instant,
    listener: Arc<dyn PlaybackListener>,
    voices: HashMap<PlaybackId, JoinHandle<()>>,
    closed: bool,
}

impl VirtualOutput {
    pub fn new(sample_rate: u32, listener: Arc<dyn PlaybackListener>) -> Self {
        Self {
            sample_rate,
            origin: Instant::now(),
            listener,
            voices: HashMap::new(),
            closed: false,
        }
    }
}

impl OutputDevice for VirtualOutput {
    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    fn start(&mut self, id: PlaybackId, buffer: PcmBuffer, at: f64) -> Result<()> {
        if self.closed {
            bail!("Output device is closed");
        }
        if buffer.sample_rate != self.sample_rate {
            warn!(
                "Chunk sample rate {}Hz does not match output {}Hz",
                buffer.sample_rate, self.sample_rate
            );
        }

        self.voices.retain(|_, voice| !voice.is_finished());

        let ends_at = self.origin + Duration::from_secs_f64((at + buffer.duration_secs()).max(0.0));
        let listener = Arc::clone(&self.listener);
        let voice = tokio::spawn(async move {
            tokio::time::sleep_until(ends_at).await;
            listener.chunk_ended(id);
        });
        self.voices.insert(id, voice);

        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        if let Some(voice) = self.voices.remove(&id) {
            voice.abort();
        }
    }

    fn close(&mut self) -> Result<()> {
        for (_, voice) in self.voices.drain() {
            voice.abort();
        }
        self.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for VirtualOutput {
    fn drop(&mut self) {
        for (_, voice) in self.voices.drain() {
            voice.abort();
        }
    }
}
