use std::borrow::Cow;

use tracing::debug;

/// Target rate expected by the speech backend
pub const SPEECH_SAMPLE_RATE: u32 = 16000;

/// Block-averaging rate converter
///
/// Converts captured audio from the device's native rate to a fixed target
/// rate. Each output sample is the mean of the contiguous input run that maps
/// onto it under the ratio `input_rate / output_rate`. Run boundaries are
/// cumulative rounded offsets (`round((i + 1) * ratio)`), so run widths differ
/// by at most one sample and every input sample is covered exactly once.
///
/// This is not a band-limited filter. It is deterministic and stateless, so
/// every block is converted independently of the previous one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioResampler {
    /// Input sample rate
    input_rate: u32,
    /// Output sample rate
    output_rate: u32,
}

impl AudioResampler {
    /// Create a resampler for the given rates
    ///
    /// # Example
    /// ```
    /// use lumeai_lib::audio::resampler::AudioResampler;
    ///
    /// let resampler = AudioResampler::new(48000, 16000);
    /// let output = resampler.process(&[0.3; 4096]);
    /// assert_eq!(output.len(), 1365);
    /// ```
    pub fn new(input_rate: u32, output_rate: u32) -> Self {
        debug!("Creating resampler: {} Hz -> {} Hz", input_rate, output_rate);
        Self {
            input_rate,
            output_rate,
        }
    }

    /// Create a resampler targeting the speech rate (16 kHz)
    pub fn to_speech_rate(input_rate: u32) -> Self {
        Self::new(input_rate, SPEECH_SAMPLE_RATE)
    }

    /// Convert one block of samples
    ///
    /// Returns the input unchanged (borrowed) when both rates are equal.
    pub fn process<'a>(&self, input: &'a [f32]) -> Cow<'a, [f32]> {
        downsample(input, self.input_rate, self.output_rate)
    }

    /// Number of output samples produced for `input_len` input samples
    pub fn output_len(&self, input_len: usize) -> usize {
        if self.input_rate == self.output_rate {
            return input_len;
        }
        let ratio = self.ratio();
        (input_len as f64 / ratio).round() as usize
    }

    /// Ratio of input rate to output rate
    pub fn ratio(&self) -> f64 {
        self.input_rate as f64 / self.output_rate as f64
    }

    /// Get the input sample rate
    pub fn input_rate(&self) -> u32 {
        self.input_rate
    }

    /// Get the output sample rate
    pub fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Whether this resampler passes samples through untouched
    pub fn is_passthrough(&self) -> bool {
        self.input_rate == self.output_rate
    }
}

/// Convert `input` from `input_rate` to `output_rate` by block averaging
///
/// Empty runs (possible when upsampling) produce `0.0`.
pub fn downsample(input: &[f32], input_rate: u32, output_rate: u32) -> Cow<'_, [f32]> {
    if input_rate == output_rate {
        return Cow::Borrowed(input);
    }

    let ratio = input_rate as f64 / output_rate as f64;
    let output_len = (input.len() as f64 / ratio).round() as usize;
    let mut output = Vec::with_capacity(output_len);

    let mut offset = 0usize;
    for slot in 0..output_len {
        let next_offset = ((slot + 1) as f64 * ratio).round() as usize;
        let end = next_offset.min(input.len());

        let run = if offset < end { &input[offset..end] } else { &[][..] };
        let sample = if run.is_empty() {
            0.0
        } else {
            // Accumulate in f64 so long runs average the same way regardless of order
            let sum: f64 = run.iter().map(|&s| s as f64).sum();
            (sum / run.len() as f64) as f32
        };

        output.push(sample);
        offset = next_offset;
    }

    Cow::Owned(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_returns_borrowed_input() {
        let input = vec![0.1, -0.2, 0.3];
        let output = downsample(&input, 16000, 16000);

        assert!(matches!(output, Cow::Borrowed(_)));
        assert_eq!(&*output, &input[..]);
    }

    #[test]
    fn test_48k_to_16k_averages_triplets() {
        let input = vec![0.0, 0.3, 0.6, 1.0, 1.0, 1.0];
        let output = downsample(&input, 48000, 16000);

        assert_eq!(output.len(), 2);
        assert!((output[0] - 0.3).abs() < 1e-6);
        assert!((output[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_44k_block_length() {
        let resampler = AudioResampler::new(44100, 16000);

        // 4096 / 2.75625 = 1486.08
        assert_eq!(resampler.process(&[0.0; 4096]).len(), 1486);
        assert_eq!(resampler.output_len(4096), 1486);
    }

    #[test]
    fn test_run_widths_differ_by_at_most_one() {
        let ratio = 44100.0f64 / 16000.0;
        let mut previous = 0usize;
        let mut widths = Vec::new();
        for slot in 0..1486usize {
            let next = ((slot + 1) as f64 * ratio).round() as usize;
            widths.push(next - previous);
            previous = next;
        }

        let min = *widths.iter().min().unwrap();
        let max = *widths.iter().max().unwrap();
        assert!(max - min <= 1, "widths ranged {}..={}", min, max);
    }

    #[test]
    fn test_upsampling_yields_zero_for_empty_runs() {
        // ratio 0.5: every other run is empty
        let output = downsample(&[0.8, 0.4], 8000, 16000);

        assert_eq!(output.len(), 4);
        assert_eq!(output[0], 0.8);
        assert_eq!(output[1], 0.0);
        assert_eq!(output[2], 0.4);
        assert_eq!(output[3], 0.0);
    }

    #[test]
    fn test_empty_input() {
        assert!(downsample(&[], 48000, 16000).is_empty());
    }

    #[test]
    fn test_constant_signal_is_preserved() {
        let output = downsample(&[0.25; 4096], 48000, 16000);
        assert!(output.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_speech_rate_constructor() {
        let resampler = AudioResampler::to_speech_rate(48000);
        assert_eq!(resampler.output_rate(), SPEECH_SAMPLE_RATE);
        assert!((resampler.ratio() - 3.0).abs() < f64::EPSILON);
        assert!(!resampler.is_passthrough());
    }
}
