use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::phase::ConnectionPhase;
use crate::onboarding::PaymentOption;

/// Counters for the current (or most recent) live session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    /// Id of the current or most recent session
    pub session_id: Option<Uuid>,

    pub phase: ConnectionPhase,

    /// When the session was opened
    pub started_at: Option<DateTime<Utc>>,

    /// Connected time in seconds (running total while connected)
    pub duration_secs: f64,

    /// Captured frames sent to the service
    pub frames_sent: u64,

    /// Captured frames dropped because the session was not connected
    pub frames_dropped: u64,

    /// Inbound audio chunks scheduled for playback
    pub chunks_scheduled: u64,

    /// Inbound audio payloads that failed to decode or schedule
    pub chunks_rejected: u64,

    pub interruptions: u64,

    pub tool_calls: u64,

    /// Latest payment option chosen through a tool call
    pub payment_option: Option<PaymentOption>,

    /// Entries in the transcript log
    pub transcript_entries: usize,
}

impl SessionStats {
    /// Fresh counters for a new session
    pub fn begin(session_id: Uuid) -> Self {
        Self {
            session_id: Some(session_id),
            phase: ConnectionPhase::Connecting,
            ..Self::default()
        }
    }

    /// Recompute `duration_secs` from `started_at`
    pub fn refresh_duration(&mut self, now: DateTime<Utc>) {
        if let Some(started_at) = self.started_at {
            let duration = now.signed_duration_since(started_at);
            self.duration_secs = duration.num_milliseconds() as f64 / 1000.0;
        }
    }
}
