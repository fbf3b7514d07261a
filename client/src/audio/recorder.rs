//! Turn recording for the upload variant
//!
//! Captured frames are resampled to the speech rate as they arrive and kept
//! in memory until the turn ends, then written out as a 16-bit mono WAV.

use std::io::Cursor;

use hound::{WavReader, WavSpec, WavWriter};

use crate::audio::capture::AudioBlock;
use crate::audio::error::{AudioError, AudioResult};
use crate::audio::pcm::encode_sample;
use crate::audio::playback::PcmBuffer;
use crate::audio::resampler::AudioResampler;

/// In-memory recording of one user turn
#[derive(Debug)]
pub struct TurnRecorder {
    samples: Vec<f32>,
    sample_rate: u32,
    resampler: Option<AudioResampler>,
}

impl TurnRecorder {
    /// Create an empty recording at `sample_rate`
    pub fn new(sample_rate: u32) -> Self {
        Self {
            samples: Vec::new(),
            sample_rate,
            resampler: None,
        }
    }

    /// Append a captured block
    pub fn push(&mut self, block: &AudioBlock) {
        let resampler = match self.resampler {
            Some(r) if r.input_rate() == block.sample_rate => r,
            _ => {
                let r = AudioResampler::new(block.sample_rate, self.sample_rate);
                self.resampler = Some(r);
                r
            }
        };
        self.samples.extend_from_slice(&resampler.process(&block.samples));
    }

    /// Recorded samples
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Recording length in seconds
    pub fn duration_secs(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate.max(1) as f64
    }

    /// Whether nothing was recorded
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop everything recorded so far
    pub fn clear(&mut self) {
        self.samples.clear();
        self.resampler = None;
    }

    /// Encode the recording as a 16-bit mono WAV file
    pub fn to_wav_bytes(&self) -> AudioResult<Vec<u8>> {
        encode_wav(&self.samples, self.sample_rate)
    }
}

/// Encode mono f32 samples as a 16-bit PCM WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> AudioResult<Vec<u8>> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::with_capacity(44 + samples.len() * 2));
    {
        let mut writer = WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(encode_sample(sample))?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}

/// Decode a WAV file into mono f32 samples
///
/// Multi-channel files are mixed down by averaging each frame.
pub fn decode_wav(bytes: &[u8]) -> AudioResult<PcmBuffer> {
    let reader = WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.into_samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(AudioError::Decode(format!(
                    "unsupported bit depth {}",
                    spec.bits_per_sample
                )));
            }
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_value))
                .collect::<Result<_, _>>()?
        }
    };

    let samples = if channels == 1 {
        interleaved
    } else {
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
            .collect()
    };

    Ok(PcmBuffer::new(samples, spec.sample_rate))
}
