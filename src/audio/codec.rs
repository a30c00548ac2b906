// PCM codec helpers for the live wire format
//
// Outbound: f32 samples -> 16-bit LE PCM -> base64
// Inbound:  base64 -> bytes -> 16-bit LE PCM -> f32 samples

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::error::AgentError;

/// A decoded, playable block of audio (f32 samples, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Normalized samples in [-1, 1]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
}

impl PcmBuffer {
    /// Number of frames (samples per channel)
    pub fn frames(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frames() as f64 / self.sample_rate as f64
    }
}

/// Quantize one sample to 16-bit PCM, clamping out-of-range input.
fn quantize(sample: f32) -> i16 {
    let scaled = (sample.clamp(-1.0, 1.0) * 32768.0).round();
    scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16
}

/// Pack i16 samples as little-endian bytes
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    samples.iter().flat_map(|s| s.to_le_bytes()).collect()
}

/// Unpack little-endian bytes into i16 samples (a trailing odd byte is ignored)
pub fn bytes_to_pcm16(bytes: &[u8]) -> Vec<i16> {
    bytes
        .chunks_exact(2)
        .map(|chunk| i16::from_le_bytes([chunk[0], chunk[1]]))
        .collect()
}

/// Encode captured samples for the wire: 16-bit LE PCM, base64.
pub fn encode_outbound(samples: &[f32]) -> String {
    let pcm: Vec<i16> = samples.iter().map(|&s| quantize(s)).collect();
    BASE64.encode(pcm16_to_bytes(&pcm))
}

/// Decode a base64 payload back to raw bytes.
pub fn decode_inbound(payload: &str) -> Result<Vec<u8>, AgentError> {
    Ok(BASE64.decode(payload)?)
}

/// Interpret raw bytes as 16-bit LE PCM and build a playable buffer.
pub fn decode_audio_samples(
    bytes: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PcmBuffer, AgentError> {
    if sample_rate == 0 || channels == 0 {
        return Err(AgentError::AudioFormat {
            sample_rate,
            channels,
        });
    }

    let frame_size = 2 * channels as usize;
    if bytes.len() % frame_size != 0 {
        return Err(AgentError::AudioDecode {
            len: bytes.len(),
            frame_size,
        });
    }

    let samples = bytes_to_pcm16(bytes)
        .into_iter()
        .map(|s| s as f32 / 32768.0)
        .collect();

    Ok(PcmBuffer {
        samples,
        sample_rate,
        channels,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quantize_extremes() {
        assert_eq!(quantize(1.0), i16::MAX);
        assert_eq!(quantize(-1.0), i16::MIN);
        assert_eq!(quantize(0.0), 0);
        assert_eq!(quantize(2.5), i16::MAX);
        assert_eq!(quantize(-7.0), i16::MIN);
        assert_eq!(quantize(f32::NAN), 0);
    }

    #[test]
    fn test_encode_is_little_endian() {
        let encoded = encode_outbound(&[0.5]);
        let bytes = decode_inbound(&encoded).unwrap();
        // 0.5 * 32768 = 16384 = 0x4000
        assert_eq!(bytes, vec![0x00, 0x40]);
    }

    #[test]
    fn test_decode_rejects_zero_channels() {
        let err = decode_audio_samples(&[0, 0], 24000, 0).unwrap_err();
        assert!(matches!(err, AgentError::AudioDecode { .. }));
    }

    #[test]
    fn test_buffer_duration() {
        let buffer = decode_audio_samples(&vec![0u8; 24000 * 2], 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 24000);
        assert!((buffer.duration_secs() - 1.0).abs() < 1e-9);
    }
}
