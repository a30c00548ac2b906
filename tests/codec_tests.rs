// Integration tests for the live audio wire codec

use base64::Engine;
use voice_onboarding::audio::codec::{
    bytes_to_pcm16, decode_audio_samples, decode_inbound, encode_outbound, pcm16_to_bytes,
};
use voice_onboarding::AgentError;

fn round_trip(samples: &[f32]) -> Vec<f32> {
    let payload = encode_outbound(samples);
    let bytes = decode_inbound(&payload).unwrap();
    decode_audio_samples(&bytes, 16000, 1).unwrap().samples
}

#[test]
fn test_round_trip_within_one_step() {
    let samples: Vec<f32> = (0..4096)
        .map(|i| (i as f32 * 0.05).sin() * 0.8)
        .collect();

    let decoded = round_trip(&samples);

    assert_eq!(decoded.len(), samples.len());
    for (original, restored) in samples.iter().zip(&decoded) {
        assert!(
            (original - restored).abs() <= 1.0 / 32768.0,
            "{} decoded as {}",
            original,
            restored
        );
    }
}

#[test]
fn test_out_of_range_samples_saturate() {
    let decoded = round_trip(&[1.0, 1.5, -1.0, -3.0]);

    assert_eq!(decoded[0], 32767.0 / 32768.0);
    assert_eq!(decoded[1], 32767.0 / 32768.0);
    assert_eq!(decoded[2], -1.0);
    assert_eq!(decoded[3], -1.0);
}

#[test]
fn test_outbound_is_little_endian_base64() {
    let payload = encode_outbound(&[0.5]);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(&payload)
        .unwrap();

    // 0.5 * 32768 = 16384 = 0x4000
    assert_eq!(bytes, vec![0x00, 0x40]);
}

#[test]
fn test_empty_frame_encodes_to_empty_payload() {
    assert_eq!(encode_outbound(&[]), "");
    assert!(decode_inbound("").unwrap().is_empty());
}

#[test]
fn test_malformed_base64_is_decode_error() {
    let result = decode_inbound("not base64!!");
    assert!(matches!(result, Err(AgentError::Decode(_))));
}

#[test]
fn test_odd_length_is_audio_decode_error() {
    let result = decode_audio_samples(&[0u8; 3], 24000, 1);
    assert!(matches!(
        result,
        Err(AgentError::AudioDecode {
            len: 3,
            frame_size: 2
        })
    ));
}

#[test]
fn test_stereo_requires_whole_frames() {
    assert!(decode_audio_samples(&[0u8; 6], 24000, 2).is_err());

    let buffer = decode_audio_samples(&[0u8; 8], 24000, 2).unwrap();
    assert_eq!(buffer.frames(), 2);
    assert_eq!(buffer.samples.len(), 4);
}

#[test]
fn test_zero_channels_rejected() {
    assert!(matches!(
        decode_audio_samples(&[0u8; 4], 24000, 0),
        Err(AgentError::AudioFormat { channels: 0, .. })
    ));
}

#[test]
fn test_zero_sample_rate_rejected() {
    let bytes = pcm16_to_bytes(&vec![0i16; 2400]);
    assert!(matches!(
        decode_audio_samples(&bytes, 0, 1),
        Err(AgentError::AudioFormat { sample_rate: 0, .. })
    ));
}

#[test]
fn test_inbound_duration() {
    // One second of 24kHz mono
    let bytes = pcm16_to_bytes(&vec![0i16; 24000]);
    let buffer = decode_audio_samples(&bytes, 24000, 1).unwrap();

    assert_eq!(buffer.frames(), 24000);
    assert!((buffer.duration_secs() - 1.0).abs() < f64::EPSILON);
}

#[test]
fn test_pcm16_byte_helpers() {
    let samples = vec![i16::MIN, -1, 0, 1, i16::MAX];
    assert_eq!(bytes_to_pcm16(&pcm16_to_bytes(&samples)), samples);
}
