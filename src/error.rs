use thiserror::Error;

/// Failures surfaced by the voice agent.
///
/// `Decode`, `AudioDecode` and `AudioFormat` are per-message: the offending
/// message is dropped and the session keeps running. Everything else ends the
/// session.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to open live session: {0}")]
    TransportOpen(String),

    #[error("audio device unavailable: {0}")]
    DeviceAcquisition(String),

    #[error("malformed base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),

    #[error("audio payload of {len} bytes is not a whole number of {frame_size}-byte frames")]
    AudioDecode { len: usize, frame_size: usize },

    #[error("unplayable audio format: {sample_rate}Hz, {channels} channels")]
    AudioFormat { sample_rate: u32, channels: u16 },

    #[error("remote error: {0}")]
    Remote(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("voice agent has shut down")]
    Shutdown,
}
