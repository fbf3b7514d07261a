//! 16-bit PCM conversion
//!
//! Capture side: f32 samples are clamped to [-1.0, 1.0] and scaled
//! asymmetrically (negative values by 32768, non-negative by 32767), rounded
//! half away from zero. `decode_samples` is the exact inverse of that scaling.
//!
//! Playback side: server audio is normalized by a flat 32768 divisor
//! (`normalize_i16`), which is the convention of the streaming backend.

use base64::{engine::general_purpose::STANDARD, Engine};

use crate::audio::error::{AudioError, AudioResult};

/// Scale applied to negative samples
pub const NEGATIVE_SCALE: f32 = 32768.0;

/// Scale applied to non-negative samples
pub const POSITIVE_SCALE: f32 = 32767.0;

/// Convert f32 samples to signed 16-bit PCM
///
/// # Example
/// ```
/// use lumeai_lib::audio::pcm::encode_samples;
///
/// assert_eq!(
///     encode_samples(&[0.5, -0.5, 1.0, -1.0]),
///     vec![16384, -16384, 32767, -32768]
/// );
/// ```
pub fn encode_samples(samples: &[f32]) -> Vec<i16> {
    samples.iter().map(|&sample| encode_sample(sample)).collect()
}

/// Convert a single f32 sample to i16
///
/// Rounds to nearest. Browser capture code that writes through
/// `DataView.setInt16` truncates instead, so `0.5` becomes 16384 here and
/// 16383 there; the two never differ by more than one step.
pub fn encode_sample(sample: f32) -> i16 {
    // NaN clamps to NaN; treat it as silence
    if sample.is_nan() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    let scaled = if clamped < 0.0 {
        clamped * NEGATIVE_SCALE
    } else {
        clamped * POSITIVE_SCALE
    };
    scaled.round() as i16
}

/// Inverse of [`encode_samples`]
pub fn decode_samples(samples: &[i16]) -> Vec<f32> {
    samples
        .iter()
        .map(|&sample| {
            if sample < 0 {
                sample as f32 / NEGATIVE_SCALE
            } else {
                sample as f32 / POSITIVE_SCALE
            }
        })
        .collect()
}

/// Normalize server PCM to f32 by dividing by 32768
pub fn normalize_i16(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&s| s as f32 / 32768.0).collect()
}

/// Serialize i16 samples as little-endian bytes
pub fn i16_to_le_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    bytes
}

/// Parse little-endian bytes into i16 samples
///
/// # Errors
/// Returns `AudioError::Decode` if the byte count is odd.
pub fn le_bytes_to_i16(bytes: &[u8]) -> AudioResult<Vec<i16>> {
    if bytes.len() % 2 != 0 {
        return Err(AudioError::Decode(format!(
            "PCM payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Encode f32 samples straight to the wire format (i16 little-endian bytes)
pub fn encode_frame(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&encode_sample(sample).to_le_bytes());
    }
    bytes
}

/// Decode a base64 PCM payload into normalized f32 samples
///
/// # Errors
/// Returns `AudioError::Decode` for invalid base64 or an odd byte count.
pub fn decode_base64_pcm(payload: &str) -> AudioResult<Vec<f32>> {
    let bytes = STANDARD
        .decode(payload.trim())
        .map_err(|e| AudioError::Decode(format!("invalid base64: {}", e)))?;
    let samples = le_bytes_to_i16(&bytes)?;
    Ok(normalize_i16(&samples))
}
