pub mod audio;
pub mod config;
pub mod error;
pub mod live;
pub mod onboarding;
pub mod session;

pub use audio::{
    AudioBackendConfig, AudioBackendFactory, AudioFile, AudioFrame, AudioSource, CaptureBackend,
    PcmBuffer, PlaybackScheduler,
};
pub use config::Config;
pub use error::AgentError;
pub use live::{LiveClient, LiveTransport};
pub use onboarding::{OnboardingStage, PaymentOption};
pub use session::{
    AgentEvent, AgentSnapshot, AgentStatus, SessionConfig, SessionStats, Speaker, TranscriptEntry,
    VoiceAgent,
};
