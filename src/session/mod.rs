//! Live session management
//!
//! This module provides the `VoiceAgent` handle and the session state machine behind it:
//! - Connection lifecycle (connect, teardown, remote error and close)
//! - Capture pipeline → live connection
//! - Inbound audio → playback scheduler
//! - Transcript reconciliation for both speakers
//! - Tool calls → onboarding stage
//! - Status, snapshot and event observables

mod config;
mod devices;
mod phase;
mod session;
mod stats;
mod status;
mod transcript;

pub use config::{PlaybackTarget, SessionConfig};
pub use devices::{AudioDevices, SystemAudio};
pub use phase::{ConnectionPhase, IllegalTransition};
pub use session::VoiceAgent;
pub use stats::SessionStats;
pub use status::{button_label, AgentEvent, AgentSnapshot, AgentStatus};
pub use transcript::{Speaker, TranscriptEntry, TranscriptLog};
