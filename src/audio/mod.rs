pub mod backend;
pub mod capture;
pub mod codec;
pub mod file;
pub mod playback;

#[cfg(feature = "cpal")]
pub mod device;

pub use backend::{AudioBackendConfig, AudioBackendFactory, AudioFrame, AudioSource, CaptureBackend};
pub use capture::{CapturePipeline, EncodedChunk, FrameSink};
pub use codec::{decode_audio_samples, decode_inbound, encode_outbound, PcmBuffer};
pub use file::{AudioFile, WavFileBackend};
pub use playback::{
    OutputDevice, PlaybackId, PlaybackListener, PlaybackScheduler, ScheduledChunk, VirtualOutput,
};
