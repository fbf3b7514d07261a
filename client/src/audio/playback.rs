//! Gapless scheduling of streamed reply audio
//!
//! Every chunk of a reply is decoded and placed on a single timeline cursor:
//! a chunk starts at `max(cursor, now + lead)` and the cursor advances by
//! exactly the chunk's duration. The first chunk after a reset is pushed out
//! by a fixed jitter offset, so chunks arriving at irregular network times
//! still play back to back.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::audio::error::AudioError;
use crate::audio::pcm::decode_base64_pcm;

/// Rate of the PCM the backend streams back
pub const PLAYBACK_SAMPLE_RATE: u32 = 44100;

/// Delay added when the timeline is first initialized after a reset
pub const JITTER_SECS: f64 = 0.12;

/// Minimum distance between "now" and a chunk's start
pub const SCHEDULE_LEAD_SECS: f64 = 0.01;

/// Playback errors
#[derive(Error, Debug)]
pub enum PlaybackError {
    /// Chunk payload could not be decoded
    #[error("Failed to decode audio chunk: {0}")]
    Decode(#[from] AudioError),

    /// Suspended output could not be resumed
    #[error("Could not resume audio output: {0}")]
    Resume(String),

    /// Output device failure
    #[error("Audio output error: {0}")]
    Device(String),
}

/// Result type for playback operations
pub type PlaybackResult<T> = Result<T, PlaybackError>;

/// Mono PCM ready for the output device
#[derive(Debug, Clone, PartialEq)]
pub struct PcmBuffer {
    /// Samples in [-1.0, 1.0]
    pub samples: Vec<f32>,
    /// Sample rate in Hz
    pub sample_rate: u32,
}

impl PcmBuffer {
    /// Create a buffer
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    /// Whether the buffer holds no samples
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Where decoded audio goes
///
/// Times are seconds on the device clock.
pub trait OutputDevice {
    /// Current device time
    fn current_time(&self) -> f64;

    /// Whether the device is suspended and must be resumed before use
    fn is_suspended(&self) -> bool;

    /// Resume a suspended device
    fn resume(&mut self) -> PlaybackResult<()>;

    /// Play `buffer` starting at device time `start_at`
    fn schedule(&mut self, buffer: PcmBuffer, start_at: f64) -> PlaybackResult<()>;
}

impl<T: OutputDevice + ?Sized> OutputDevice for Box<T> {
    fn current_time(&self) -> f64 {
        (**self).current_time()
    }

    fn is_suspended(&self) -> bool {
        (**self).is_suspended()
    }

    fn resume(&mut self) -> PlaybackResult<()> {
        (**self).resume()
    }

    fn schedule(&mut self, buffer: PcmBuffer, start_at: f64) -> PlaybackResult<()> {
        (**self).schedule(buffer, start_at)
    }
}

/// One received reply chunk
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackChunk {
    /// Base64 i16 little-endian PCM
    pub audio: String,
    /// Sequence number assigned by the server
    pub chunk_number: Option<u64>,
    /// Reply the chunk belongs to
    pub context_id: Option<String>,
}

/// Ledger entry for a scheduled chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRecord {
    /// Sequence number assigned by the server
    pub chunk_number: Option<u64>,
    /// Device time the chunk arrived
    pub received_at: f64,
    /// Device time the chunk starts
    pub start_at: f64,
    /// Chunk length in seconds
    pub duration: f64,
}

/// What happened to a chunk
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ChunkOutcome {
    /// Placed on the timeline
    Scheduled { start_at: f64, duration: f64 },
    /// The reply already completed or failed; chunk ignored
    SessionClosed,
    /// The payload decoded to zero samples
    Empty,
}

/// Timeline parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimelineConfig {
    /// Rate of the incoming PCM
    pub sample_rate: u32,
    /// Offset for the first chunk after a reset
    pub jitter_secs: f64,
    /// Minimum lead between "now" and a start
    pub lead_secs: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: PLAYBACK_SAMPLE_RATE,
            jitter_secs: JITTER_SECS,
            lead_secs: SCHEDULE_LEAD_SECS,
        }
    }
}

/// Schedules reply chunks back to back on an [`OutputDevice`]
pub struct PlaybackScheduler<D: OutputDevice> {
    device: D,
    config: TimelineConfig,
    /// Next start time; 0.0 means uninitialized
    timeline: f64,
    /// False between `audio_complete`/`audio_error` and the next `audio_start`
    accepting: bool,
    context_id: Option<String>,
    ledger: Vec<ChunkRecord>,
    unlocked: bool,
}

impl<D: OutputDevice> PlaybackScheduler<D> {
    /// Create a scheduler with an uninitialized timeline
    pub fn new(device: D, config: TimelineConfig) -> Self {
        Self {
            device,
            config,
            timeline: 0.0,
            accepting: true,
            context_id: None,
            ledger: Vec::new(),
            unlocked: false,
        }
    }

    /// Wake the output device ahead of the first reply
    ///
    /// Only the first call does anything.
    pub fn unlock(&mut self) -> PlaybackResult<()> {
        if self.unlocked {
            return Ok(());
        }
        self.ensure_running()?;
        self.unlocked = true;
        debug!("Playback unlocked");
        Ok(())
    }

    /// Whether [`unlock`](Self::unlock) has succeeded
    pub fn is_unlocked(&self) -> bool {
        self.unlocked
    }

    /// A new reply begins: reset the timeline and the chunk ledger
    pub fn on_audio_start(&mut self, context_id: Option<String>) {
        info!(context_id = ?context_id, "Audio reply started");
        self.timeline = 0.0;
        self.ledger.clear();
        self.context_id = context_id;
        self.accepting = true;
    }

    /// Decode and schedule one chunk
    ///
    /// # Errors
    /// [`PlaybackError::Decode`] for a malformed payload and
    /// [`PlaybackError::Resume`] if the device could not be resumed. Either
    /// way the chunk is dropped and the timeline is untouched.
    pub fn on_chunk(&mut self, chunk: &PlaybackChunk) -> PlaybackResult<ChunkOutcome> {
        if !self.accepting {
            debug!(chunk_number = ?chunk.chunk_number, "Reply closed, chunk ignored");
            return Ok(ChunkOutcome::SessionClosed);
        }

        let samples = decode_base64_pcm(&chunk.audio)?;
        if samples.is_empty() {
            return Ok(ChunkOutcome::Empty);
        }

        let received_at = self.device.current_time();
        let buffer = PcmBuffer::new(samples, self.config.sample_rate);
        let duration = buffer.duration();
        let start_at = self.schedule(buffer)?;

        self.ledger.push(ChunkRecord {
            chunk_number: chunk.chunk_number,
            received_at,
            start_at,
            duration,
        });
        debug!(
            chunk_number = ?chunk.chunk_number,
            start_at,
            duration,
            "Chunk scheduled"
        );

        Ok(ChunkOutcome::Scheduled { start_at, duration })
    }

    /// The reply finished; later chunks are ignored until the next start
    pub fn on_complete(&mut self, total_chunks: Option<u64>) {
        info!(
            total_chunks = ?total_chunks,
            scheduled = self.ledger.len(),
            "Audio reply complete"
        );
        self.accepting = false;
    }

    /// The reply failed; later chunks are ignored until the next start
    pub fn on_error(&mut self) {
        warn!(scheduled = self.ledger.len(), "Audio reply failed");
        self.accepting = false;
    }

    /// Play a complete clip as its own reply
    ///
    /// Used by the upload variant, which receives the whole reply at once.
    pub fn play_clip(&mut self, buffer: PcmBuffer) -> PlaybackResult<f64> {
        self.on_audio_start(None);
        if buffer.is_empty() {
            return Ok(self.device.current_time());
        }
        let start_at = self.schedule(buffer)?;
        self.accepting = false;
        Ok(start_at)
    }

    /// Device time at which everything scheduled so far has played
    pub fn playback_end(&self) -> f64 {
        self.timeline
    }

    /// Seconds of scheduled audio still ahead of the device clock
    pub fn remaining(&self) -> f64 {
        (self.timeline - self.device.current_time()).max(0.0)
    }

    /// Timeline cursor (0.0 when uninitialized)
    pub fn timeline(&self) -> f64 {
        self.timeline
    }

    /// Whether chunks are currently accepted
    pub fn is_accepting(&self) -> bool {
        self.accepting
    }

    /// Reply the scheduler is playing
    pub fn context_id(&self) -> Option<&str> {
        self.context_id.as_deref()
    }

    /// Chunks scheduled since the last reset
    pub fn ledger(&self) -> &[ChunkRecord] {
        &self.ledger
    }

    /// The output device
    pub fn device(&self) -> &D {
        &self.device
    }

    /// The output device, mutably
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    fn ensure_running(&mut self) -> PlaybackResult<()> {
        if self.device.is_suspended() {
            debug!("Output suspended, resuming");
            self.device.resume().map_err(|e| {
                warn!("Could not resume audio output: {}", e);
                match e {
                    PlaybackError::Resume(msg) => PlaybackError::Resume(msg),
                    other => PlaybackError::Resume(other.to_string()),
                }
            })?;
        }
        Ok(())
    }

    fn schedule(&mut self, buffer: PcmBuffer) -> PlaybackResult<f64> {
        self.ensure_running()?;

        let now = self.device.current_time();
        if self.timeline == 0.0 {
            self.timeline = now + self.config.jitter_secs;
        }

        let start_at = self.timeline.max(now + self.config.lead_secs);
        let duration = buffer.duration();
        self.device.schedule(buffer, start_at)?;
        self.timeline = start_at + duration;

        Ok(start_at)
    }
}
