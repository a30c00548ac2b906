// Integration tests for gap-free playback scheduling

use anyhow::Result;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use voice_onboarding::audio::{
    OutputDevice, PcmBuffer, PlaybackId, PlaybackListener, PlaybackScheduler, VirtualOutput,
};

#[derive(Default)]
struct DeviceLog {
    now: f64,
    started: Vec<(PlaybackId, f64)>,
    stopped: Vec<PlaybackId>,
    closed: bool,
}

/// Output whose clock only moves when the test says so
struct ManualOutput {
    log: Arc<Mutex<DeviceLog>>,
}

impl OutputDevice for ManualOutput {
    fn sample_rate(&self) -> u32 {
        24000
    }

    fn current_time(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn start(&mut self, id: PlaybackId, _buffer: PcmBuffer, at: f64) -> Result<()> {
        self.log.lock().unwrap().started.push((id, at));
        Ok(())
    }

    fn stop(&mut self, id: PlaybackId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn close(&mut self) -> Result<()> {
        self.log.lock().unwrap().closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.log.lock().unwrap().closed
    }
}

fn manual_scheduler() -> (PlaybackScheduler, Arc<Mutex<DeviceLog>>) {
    let log = Arc::new(Mutex::new(DeviceLog::default()));
    let device = ManualOutput {
        log: Arc::clone(&log),
    };
    (PlaybackScheduler::new(Box::new(device)), log)
}

/// Mono 24kHz buffer of `secs` seconds
fn chunk(secs: f64) -> PcmBuffer {
    PcmBuffer {
        samples: vec![0.0; (24000.0 * secs) as usize],
        sample_rate: 24000,
        channels: 1,
    }
}

#[test]
fn test_chunks_play_back_to_back() -> Result<()> {
    let (mut scheduler, log) = manual_scheduler();
    log.lock().unwrap().now = 1.0;

    let a = scheduler.schedule_chunk(chunk(0.5))?;
    let b = scheduler.schedule_chunk(chunk(0.25))?;
    let c = scheduler.schedule_chunk(chunk(0.5))?;

    assert_eq!(a.start_time, 1.0);
    assert_eq!(b.start_time, 1.5);
    assert_eq!(c.start_time, 1.75);
    assert_eq!(scheduler.next_start_time(), 2.25);
    assert_eq!(scheduler.in_flight(), 3);
    assert_eq!(log.lock().unwrap().started.len(), 3);

    Ok(())
}

#[test]
fn test_never_starts_in_the_past() -> Result<()> {
    let (mut scheduler, log) = manual_scheduler();

    scheduler.schedule_chunk(chunk(0.5))?;
    log.lock().unwrap().now = 3.0;
    let late = scheduler.schedule_chunk(chunk(0.5))?;

    assert_eq!(late.start_time, 3.0);
    assert_eq!(scheduler.next_start_time(), 3.5);

    let starts: Vec<f64> = log.lock().unwrap().started.iter().map(|s| s.1).collect();
    assert!(starts.windows(2).all(|w| w[0] <= w[1]));

    Ok(())
}

#[test]
fn test_idle_only_after_last_chunk_ends() -> Result<()> {
    let (mut scheduler, _log) = manual_scheduler();

    let a = scheduler.schedule_chunk(chunk(0.1))?;
    let b = scheduler.schedule_chunk(chunk(0.1))?;

    assert!(!scheduler.chunk_ended(a.id));
    assert!(scheduler.chunk_ended(b.id));
    assert!(scheduler.is_idle());

    // Unknown or repeated ids never report idle again
    assert!(!scheduler.chunk_ended(b.id));
    assert!(!scheduler.chunk_ended(999));

    Ok(())
}

#[test]
fn test_interrupt_stops_everything_and_resets_cursor() -> Result<()> {
    let (mut scheduler, log) = manual_scheduler();
    log.lock().unwrap().now = 2.0;

    let a = scheduler.schedule_chunk(chunk(1.0))?;
    let b = scheduler.schedule_chunk(chunk(1.0))?;

    assert_eq!(scheduler.interrupt(), 2);
    assert!(scheduler.is_idle());
    assert_eq!(scheduler.next_start_time(), 0.0);

    let mut stopped = log.lock().unwrap().stopped.clone();
    stopped.sort_unstable();
    assert_eq!(stopped, vec![a.id, b.id]);

    // The cursor is floored at device time on the next schedule
    let next = scheduler.schedule_chunk(chunk(0.5))?;
    assert_eq!(next.start_time, 2.0);

    Ok(())
}

#[test]
fn test_close_tolerates_closed_device() -> Result<()> {
    let (mut scheduler, log) = manual_scheduler();
    scheduler.schedule_chunk(chunk(0.5))?;

    scheduler.close()?;
    assert!(log.lock().unwrap().closed);
    assert!(scheduler.is_idle());

    scheduler.close()?;
    Ok(())
}

#[derive(Default)]
struct Completions(Mutex<Vec<PlaybackId>>);

impl PlaybackListener for Completions {
    fn chunk_ended(&self, id: PlaybackId) {
        self.0.lock().unwrap().push(id);
    }
}

#[tokio::test(start_paused = true)]
async fn test_virtual_output_reports_completion_in_order() -> Result<()> {
    let completions = Arc::new(Completions::default());
    let device = VirtualOutput::new(24000, completions.clone());
    let mut scheduler = PlaybackScheduler::new(Box::new(device));

    let a = scheduler.schedule_chunk(chunk(0.5))?;
    let b = scheduler.schedule_chunk(chunk(0.5))?;

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(*completions.0.lock().unwrap(), vec![a.id]);

    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(*completions.0.lock().unwrap(), vec![a.id, b.id]);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_virtual_output_stopped_chunks_do_not_complete() -> Result<()> {
    let completions = Arc::new(Completions::default());
    let device = VirtualOutput::new(24000, completions.clone());
    let mut scheduler = PlaybackScheduler::new(Box::new(device));

    scheduler.schedule_chunk(chunk(0.5))?;
    scheduler.interrupt();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(completions.0.lock().unwrap().is_empty());

    Ok(())
}
