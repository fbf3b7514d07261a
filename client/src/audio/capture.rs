use crate::audio::device::resolve_input_device;
use crate::audio::error::{AudioError, AudioResult};
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{FromSample, SizedSample, Stream, StreamConfig};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Samples per captured frame, matching a 4096-sample processing node
pub const DEFAULT_FRAME_SIZE: usize = 4096;

/// A block of captured mono samples tagged with its source rate
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Source sample rate in Hz
    pub sample_rate: u32,
}

impl AudioBlock {
    /// Create a new block
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Number of samples in the block
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the block holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration of the block in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Source of microphone frames
///
/// Opening a microphone is the native counterpart of asking the user for
/// capture permission: an implementation either hands back the device's
/// native sample rate and starts delivering [`AudioBlock`]s on `sender`, or
/// fails and delivers nothing.
pub trait Microphone {
    /// Open the device and start delivering frames
    ///
    /// # Returns
    /// The native sample rate of the delivered blocks.
    fn open(&mut self, sender: mpsc::Sender<AudioBlock>) -> AudioResult<u32>;

    /// Release the device. Safe to call when already closed.
    fn close(&mut self);

    /// Whether the device is currently open
    fn is_open(&self) -> bool;
}

/// Splits an arbitrary callback stream into fixed-size mono frames
///
/// Only the first channel of interleaved input is kept.
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    channels: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// Create an assembler producing `frame_size`-sample frames from
    /// `channels`-channel interleaved input
    pub fn new(frame_size: usize, channels: usize) -> Self {
        Self {
            frame_size: frame_size.max(1),
            channels: channels.max(1),
            pending: Vec::with_capacity(frame_size.max(1) * 2),
        }
    }

    /// Feed interleaved samples, calling `emit` for every completed frame
    pub fn push<F: FnMut(Vec<f32>)>(&mut self, interleaved: &[f32], mut emit: F) {
        self.pending
            .extend(interleaved.iter().step_by(self.channels).copied());

        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            emit(frame);
        }
    }

    /// Samples waiting for a full frame
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Microphone backed by a cpal input stream
///
/// The stream is created on [`Microphone::open`] and dropped on
/// [`Microphone::close`]. `cpal::Stream` is not `Send`, so this type lives on
/// the thread that drives the session loop.
pub struct DeviceMicrophone {
    /// Requested device name, `None` for the host default
    device_id: Option<String>,
    /// Samples per delivered frame
    frame_size: usize,
    /// The audio input stream (None when closed)
    stream: Option<Stream>,
    /// Sample rate of the open stream
    sample_rate: Option<u32>,
}

impl DeviceMicrophone {
    /// Create a microphone handle without touching the device yet
    ///
    /// # Example
    /// ```no_run
    /// use lumeai_lib::audio::capture::{DeviceMicrophone, Microphone, DEFAULT_FRAME_SIZE};
    /// use tokio::sync::mpsc;
    ///
    /// let (tx, _rx) = mpsc::channel(32);
    /// let mut mic = DeviceMicrophone::new(None, DEFAULT_FRAME_SIZE);
    /// let rate = mic.open(tx).unwrap();
    /// println!("Capturing at {} Hz", rate);
    /// mic.close();
    /// ```
    pub fn new(device_id: Option<String>, frame_size: usize) -> Self {
        Self {
            device_id,
            frame_size,
            stream: None,
            sample_rate: None,
        }
    }

    /// Sample rate of the open stream, if any
    pub fn sample_rate(&self) -> Option<u32> {
        self.sample_rate
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &StreamConfig,
        frame_size: usize,
        sender: mpsc::Sender<AudioBlock>,
    ) -> AudioResult<Stream>
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        let sample_rate = config.sample_rate.0;
        let mut assembler = FrameAssembler::new(frame_size, config.channels as usize);
        let mut scratch: Vec<f32> = Vec::with_capacity(frame_size * 2);

        device
            .build_input_stream(
                config,
                move |data: &[T], _: &cpal::InputCallbackInfo| {
                    scratch.clear();
                    scratch.extend(data.iter().map(|&s| s.to_sample::<f32>()));
                    assembler.push(&scratch, |frame| {
                        // Never block the audio thread; a full channel drops the frame
                        let _ = sender.try_send(AudioBlock::new(frame, sample_rate));
                    });
                },
                move |err| {
                    error!("Audio input stream error: {}", err);
                },
                None,
            )
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))
    }
}

impl Microphone for DeviceMicrophone {
    fn open(&mut self, sender: mpsc::Sender<AudioBlock>) -> AudioResult<u32> {
        if let Some(rate) = self.sample_rate.filter(|_| self.stream.is_some()) {
            warn!("Microphone already open");
            return Ok(rate);
        }

        let host = cpal::default_host();
        let device = resolve_input_device(&host, self.device_id.as_deref())?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio input device: {}", device_name);

        let supported = device.default_input_config()?;
        let config: StreamConfig = supported.config();
        let sample_rate = config.sample_rate.0;

        info!(
            "Device config: {} Hz, {} channels, {:?}",
            sample_rate,
            config.channels,
            supported.sample_format()
        );

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, self.frame_size, sender)?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, self.frame_size, sender)?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, self.frame_size, sender)?
            }
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other))),
        };

        stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;

        self.stream = Some(stream);
        self.sample_rate = Some(sample_rate);
        info!("Microphone opened");

        Ok(sample_rate)
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            info!("Closing microphone");
            drop(stream);
            debug!("Microphone closed");
        }
        self.sample_rate = None;
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for DeviceMicrophone {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assembler_emits_fixed_frames() {
        let mut assembler = FrameAssembler::new(4, 1);
        let mut frames = Vec::new();

        assembler.push(&[0.1, 0.2, 0.3], |f| frames.push(f));
        assert!(frames.is_empty());
        assert_eq!(assembler.pending(), 3);

        assembler.push(&[0.4, 0.5, 0.6, 0.7, 0.8, 0.9], |f| frames.push(f));
        assert_eq!(frames, vec![vec![0.1, 0.2, 0.3, 0.4], vec![0.5, 0.6, 0.7, 0.8]]);
        assert_eq!(assembler.pending(), 1);
    }

    #[test]
    fn test_assembler_keeps_first_channel() {
        let mut assembler = FrameAssembler::new(2, 2);
        let mut frames = Vec::new();

        assembler.push(&[0.1, -0.1, 0.2, -0.2], |f| frames.push(f));
        assert_eq!(frames, vec![vec![0.1, 0.2]]);
    }

    #[test]
    fn test_audio_block_duration() {
        let block = AudioBlock::new(vec![0.0; 4800], 48000);
        assert_eq!(block.len(), 4800);
        assert!((block.duration_secs() - 0.1).abs() < 1e-9);
        assert_eq!(AudioBlock::new(vec![], 0).duration_secs(), 0.0);
    }

    #[tokio::test]
    async fn test_device_microphone_open_close() {
        let (tx, _rx) = mpsc::channel(8);
        let mut mic = DeviceMicrophone::new(None, DEFAULT_FRAME_SIZE);
        assert!(!mic.is_open());

        match mic.open(tx) {
            Ok(rate) => {
                assert!(rate > 0);
                assert!(mic.is_open());
            }
            Err(e) => eprintln!("Warning: No audio device available for testing: {}", e),
        }

        mic.close();
        assert!(!mic.is_open());
        // Safe to close twice
        mic.close();
    }

    #[test]
    fn test_unknown_device_fails() {
        let (tx, _rx) = mpsc::channel(8);
        let mut mic = DeviceMicrophone::new(Some("NonExistentDevice".into()), DEFAULT_FRAME_SIZE);
        assert!(mic.open(tx).is_err());
    }
}
