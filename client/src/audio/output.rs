//! Audio output using cpal and a ring buffer of scheduled clips
//!
//! The main thread pushes `(start_frame, clip)` pairs into a ring buffer; the
//! audio callback pops them into a [`Mixer`] that renders each clip from its
//! start frame on. The callback also advances a shared frame counter, which
//! is the device clock the playback scheduler reads.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, SizedSample};
use ringbuf::{
    HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{debug, error, info, warn};

use crate::audio::error::{AudioError, AudioResult};
use crate::audio::playback::{OutputDevice, PcmBuffer, PlaybackError, PlaybackResult};

/// Clips that can be waiting for the callback at once
const SCHEDULE_QUEUE_SIZE: usize = 256;

/// A clip placed at an absolute output frame
#[derive(Debug, Clone)]
pub struct ScheduledClip {
    /// Output frame at which the clip starts
    pub start_frame: u64,
    /// Mono samples at `sample_rate`
    pub samples: Vec<f32>,
    /// Source rate of `samples`
    pub sample_rate: u32,
}

#[derive(Debug)]
struct Voice {
    clip: ScheduledClip,
    /// Source samples advanced per output frame
    step: f64,
}

impl Voice {
    /// Sample for absolute output frame `frame`, `None` once past the end
    fn sample_at(&self, frame: u64) -> Option<f32> {
        if frame < self.clip.start_frame {
            return Some(0.0);
        }
        let pos = (frame - self.clip.start_frame) as f64 * self.step;
        let index = pos.floor() as usize;
        let samples = &self.clip.samples;
        if index >= samples.len() {
            return None;
        }
        let frac = (pos - index as f64) as f32;
        let next = samples.get(index + 1).copied().unwrap_or(samples[index]);
        Some(samples[index] + (next - samples[index]) * frac)
    }

    fn end_frame(&self) -> u64 {
        let frames = (self.clip.samples.len() as f64 / self.step).ceil() as u64;
        self.clip.start_frame + frames
    }
}

/// Renders scheduled clips against an output frame clock
///
/// Clips at a different rate than the output are linearly interpolated.
#[derive(Debug)]
pub struct Mixer {
    output_rate: u32,
    channels: usize,
    voices: Vec<Voice>,
}

impl Mixer {
    /// Create a mixer for an output of `output_rate` Hz and `channels` channels
    pub fn new(output_rate: u32, channels: usize) -> Self {
        Self {
            output_rate: output_rate.max(1),
            channels: channels.max(1),
            voices: Vec::new(),
        }
    }

    /// Add a clip
    pub fn add(&mut self, clip: ScheduledClip) {
        if clip.samples.is_empty() || clip.sample_rate == 0 {
            return;
        }
        let step = clip.sample_rate as f64 / self.output_rate as f64;
        self.voices.push(Voice { clip, step });
    }

    /// Number of clips not yet finished
    pub fn active(&self) -> usize {
        self.voices.len()
    }

    /// Fill interleaved `out` starting at absolute frame `first_frame`
    ///
    /// # Returns
    /// Number of frames rendered.
    pub fn render(&mut self, out: &mut [f32], first_frame: u64) -> usize {
        let frames = out.len() / self.channels;

        for (i, frame) in out.chunks_mut(self.channels).enumerate() {
            let clock = first_frame + i as u64;
            let mut mixed = 0.0f32;
            for voice in &self.voices {
                if let Some(sample) = voice.sample_at(clock) {
                    mixed += sample;
                }
            }
            frame.fill(mixed.clamp(-1.0, 1.0));
        }

        let end = first_frame + frames as u64;
        self.voices.retain(|voice| voice.end_frame() > end);
        frames
    }
}

/// Convert seconds on the output clock to a frame index
pub fn seconds_to_frame(seconds: f64, rate: u32) -> u64 {
    (seconds.max(0.0) * rate as f64).round() as u64
}

/// Output device backed by a cpal stream
///
/// The stream is built paused, so the device starts out suspended until the
/// first [`OutputDevice::resume`]. `cpal::Stream` is not `Send`; this type
/// stays on the session thread.
pub struct CpalOutput {
    producer: ringbuf::HeapProd<ScheduledClip>,
    stream: cpal::Stream,
    clock: Arc<AtomicU64>,
    sample_rate: u32,
    suspended: bool,
}

impl CpalOutput {
    /// Open the default output device
    pub fn new() -> AudioResult<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or(AudioError::OutputDeviceNotFound)?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

        let supported = device.default_output_config()?;
        let config: cpal::StreamConfig = supported.config();
        let sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        info!(
            "Using audio output device: {} ({} Hz, {} channels, {:?})",
            device_name,
            sample_rate,
            channels,
            supported.sample_format()
        );

        let ring = HeapRb::<ScheduledClip>::new(SCHEDULE_QUEUE_SIZE);
        let (producer, consumer) = ring.split();
        let clock = Arc::new(AtomicU64::new(0));
        let mixer = Mixer::new(sample_rate, channels);

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => {
                Self::build_stream::<f32>(&device, &config, mixer, consumer, clock.clone())?
            }
            cpal::SampleFormat::I16 => {
                Self::build_stream::<i16>(&device, &config, mixer, consumer, clock.clone())?
            }
            cpal::SampleFormat::U16 => {
                Self::build_stream::<u16>(&device, &config, mixer, consumer, clock.clone())?
            }
            other => return Err(AudioError::UnsupportedSampleFormat(format!("{:?}", other))),
        };

        // Some hosts start streams on creation
        if let Err(e) = stream.pause() {
            debug!("Could not pause new output stream: {}", e);
        }

        Ok(Self {
            producer,
            stream,
            clock,
            sample_rate,
            suspended: true,
        })
    }

    /// Output sample rate
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn build_stream<T>(
        device: &cpal::Device,
        config: &cpal::StreamConfig,
        mut mixer: Mixer,
        mut consumer: ringbuf::HeapCons<ScheduledClip>,
        clock: Arc<AtomicU64>,
    ) -> AudioResult<cpal::Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let mut scratch: Vec<f32> = vec![0.0; 4096];

        device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    while let Some(clip) = consumer.try_pop() {
                        mixer.add(clip);
                    }

                    if scratch.len() < data.len() {
                        scratch.resize(data.len(), 0.0);
                    }
                    let first_frame = clock.load(Ordering::Acquire);
                    let frames = mixer.render(&mut scratch[..data.len()], first_frame);

                    for (out, &sample) in data.iter_mut().zip(scratch.iter()) {
                        *out = T::from_sample(sample);
                    }
                    clock.store(first_frame + frames as u64, Ordering::Release);
                },
                |err| error!("Audio output stream error: {}", err),
                None,
            )
            .map_err(|e| AudioError::StreamBuildFailed(e.to_string()))
    }
}

impl OutputDevice for CpalOutput {
    fn current_time(&self) -> f64 {
        self.clock.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> PlaybackResult<()> {
        self.stream
            .play()
            .map_err(|e| PlaybackError::Resume(e.to_string()))?;
        self.suspended = false;
        debug!("Audio output resumed");
        Ok(())
    }

    fn schedule(&mut self, buffer: PcmBuffer, start_at: f64) -> PlaybackResult<()> {
        let clip = ScheduledClip {
            start_frame: seconds_to_frame(start_at, self.sample_rate),
            samples: buffer.samples,
            sample_rate: buffer.sample_rate,
        };

        if self.producer.try_push(clip).is_err() {
            warn!("Playback queue full, clip dropped");
            return Err(PlaybackError::Device("playback queue full".to_string()));
        }
        Ok(())
    }
}

/// Output that keeps time but plays nothing
///
/// Stands in when no output device is available, so text replies still work.
#[derive(Debug)]
pub struct SilentOutput {
    started: Instant,
}

impl SilentOutput {
    /// Start the clock
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SilentOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputDevice for SilentOutput {
    fn current_time(&self) -> f64 {
        self.started.elapsed().as_secs_f64()
    }

    fn is_suspended(&self) -> bool {
        false
    }

    fn resume(&mut self) -> PlaybackResult<()> {
        Ok(())
    }

    fn schedule(&mut self, buffer: PcmBuffer, start_at: f64) -> PlaybackResult<()> {
        debug!(
            samples = buffer.samples.len(),
            start_at, "No output device, clip discarded"
        );
        Ok(())
    }
}

/// Open the default output, falling back to [`SilentOutput`]
pub fn open_output() -> Box<dyn OutputDevice> {
    match CpalOutput::new() {
        Ok(output) => Box::new(output),
        Err(e) => {
            warn!("Audio output unavailable, replies will not be played: {}", e);
            Box::new(SilentOutput::new())
        }
    }
}
