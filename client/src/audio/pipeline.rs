use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::audio::capture::{AudioBlock, Microphone};
use crate::audio::error::AudioError;
use crate::audio::pcm::encode_frame;
use crate::audio::resampler::AudioResampler;
use crate::network::error::NetworkError;
use crate::network::transport::AudioTransport;
use crate::state::{CaptureState, StateError, StateManager};

/// Capture pipeline errors
#[derive(Error, Debug)]
pub enum CaptureError {
    /// The microphone could not be opened
    #[error("Microphone access denied or not available: {0}")]
    PermissionDenied(#[source] AudioError),

    /// A start was requested while capture is not idle
    #[error("Capture already active ({})", .0.name())]
    AlreadyActive(CaptureState),

    /// Invalid lifecycle transition
    #[error(transparent)]
    State(#[from] StateError),

    /// The transport failed while capturing
    #[error("Transport error: {0}")]
    Transport(#[from] NetworkError),
}

/// Result type for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Why a frame was not sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Pipeline is not in `Capturing`
    NotCapturing,
    /// Transport missing or not open
    TransportNotOpen,
}

/// What happened to one captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Encoded and handed to the transport
    Sent { samples: usize, bytes: usize },
    /// Dropped without sending
    Dropped(DropReason),
}

/// What a stop request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Nothing to stop (idle, still starting, or already stopped)
    NotActive,
    /// Capture ended
    Stopped {
        /// Whether the end-of-turn sentinel went out
        sentinel_sent: bool,
    },
}

/// Counters for the current or last capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames handed to the transport
    pub frames_sent: u64,
    /// Frames dropped for any reason
    pub frames_dropped: u64,
    /// Bytes handed to the transport
    pub bytes_sent: u64,
    /// Sentinels sent
    pub sentinels_sent: u64,
}

/// Microphone → resampler → encoder → transport
///
/// The pipeline owns the microphone and the transport handle and is the only
/// code that writes either. Lifecycle:
///
/// 1. [`request_start`](Self::request_start) opens the microphone
///    (`Idle → RequestingPermission`).
/// 2. [`attach_transport`](Self::attach_transport) hands over the connected
///    transport (`RequestingPermission → Capturing`), or
///    [`abort_start`](Self::abort_start) gives up (`→ Idle`).
/// 3. [`process_frame`](Self::process_frame) for every [`AudioBlock`].
/// 4. [`stop`](Self::stop) sends one sentinel, closes the transport and
///    releases the microphone (`Capturing → Stopping → Idle`).
///
/// # Example
/// ```no_run
/// use lumeai_lib::audio::capture::{DeviceMicrophone, DEFAULT_FRAME_SIZE};
/// use lumeai_lib::audio::pipeline::CapturePipeline;
/// use lumeai_lib::network::WsTransport;
/// use lumeai_lib::state::StateManager;
/// use tokio::sync::mpsc;
///
/// let mic = DeviceMicrophone::new(None, DEFAULT_FRAME_SIZE);
/// let mut pipeline: CapturePipeline<_, WsTransport> =
///     CapturePipeline::new(mic, 16000, StateManager::shared());
///
/// let (frames_tx, _frames_rx) = mpsc::channel(32);
/// let native_rate = pipeline.request_start(frames_tx).unwrap();
/// println!("Microphone at {} Hz", native_rate);
/// ```
pub struct CapturePipeline<M: Microphone, T: AudioTransport> {
    microphone: M,
    transport: Option<T>,
    resampler: Option<AudioResampler>,
    target_rate: u32,
    state: Arc<StateManager>,
    stats: PipelineStats,
}

impl<M: Microphone, T: AudioTransport> CapturePipeline<M, T> {
    /// Create an idle pipeline resampling to `target_rate`
    pub fn new(microphone: M, target_rate: u32, state: Arc<StateManager>) -> Self {
        Self {
            microphone,
            transport: None,
            resampler: None,
            target_rate,
            state,
            stats: PipelineStats::default(),
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> CaptureState {
        self.state.current()
    }

    /// Shared state manager
    pub fn state_manager(&self) -> Arc<StateManager> {
        self.state.clone()
    }

    /// Whether frames are currently flowing
    pub fn is_capturing(&self) -> bool {
        self.state.current().is_capturing()
    }

    /// Whether the transport is attached and open
    pub fn transport_open(&self) -> bool {
        self.transport.as_ref().is_some_and(|t| t.is_open())
    }

    /// Counters for the current or last capture
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    /// Rate frames are resampled to
    pub fn target_rate(&self) -> u32 {
        self.target_rate
    }

    /// Open the microphone
    ///
    /// # Returns
    /// The microphone's native sample rate.
    ///
    /// # Errors
    /// [`CaptureError::AlreadyActive`] unless idle;
    /// [`CaptureError::PermissionDenied`] if the device refuses, in which
    /// case the pipeline is back in `Idle`.
    pub fn request_start(&mut self, frames: mpsc::Sender<AudioBlock>) -> CaptureResult<u32> {
        let current = self.state.current();
        if !current.is_idle() {
            return Err(CaptureError::AlreadyActive(current));
        }

        self.state.transition(CaptureState::RequestingPermission)?;
        info!("Requesting microphone");

        match self.microphone.open(frames) {
            Ok(native_rate) => {
                self.resampler = Some(AudioResampler::new(native_rate, self.target_rate));
                self.stats = PipelineStats::default();
                debug!(native_rate, target_rate = self.target_rate, "Microphone granted");
                Ok(native_rate)
            }
            Err(e) => {
                warn!("Microphone refused: {}", e);
                self.microphone.close();
                self.state.transition(CaptureState::Idle)?;
                Err(CaptureError::PermissionDenied(e))
            }
        }
    }

    /// Attach the connected transport and start capturing
    ///
    /// If the pipeline is no longer waiting for a transport the transport is
    /// closed and an error returned.
    pub fn attach_transport(&mut self, mut transport: T) -> CaptureResult<()> {
        if let Err(e) = self.state.transition(CaptureState::Capturing) {
            transport.close();
            return Err(e.into());
        }

        self.transport = Some(transport);
        info!("Capture started");
        Ok(())
    }

    /// Give up a start that could not open its transport
    pub fn abort_start(&mut self) {
        if !self.state.current().is_requesting() {
            return;
        }

        self.microphone.close();
        self.resampler = None;
        if let Err(e) = self.state.transition(CaptureState::Idle) {
            warn!("Failed to abort start: {}", e);
            self.state.reset();
        }
        info!("Capture start aborted");
    }

    /// Resample, encode and send one frame
    ///
    /// Frames are dropped unless capturing with an open transport. A fatal
    /// transport error ends the capture (`→ Idle`) and is returned.
    pub fn process_frame(&mut self, block: &AudioBlock) -> CaptureResult<FrameOutcome> {
        if !self.state.current().is_capturing() {
            self.stats.frames_dropped += 1;
            return Ok(FrameOutcome::Dropped(DropReason::NotCapturing));
        }

        let Some(transport) = self.transport.as_mut().filter(|t| t.is_open()) else {
            self.stats.frames_dropped += 1;
            debug!("Transport not open, frame dropped");
            return Ok(FrameOutcome::Dropped(DropReason::TransportNotOpen));
        };

        let resampler = match self.resampler {
            Some(r) if r.input_rate() == block.sample_rate => r,
            _ => {
                let r = AudioResampler::new(block.sample_rate, self.target_rate);
                self.resampler = Some(r);
                r
            }
        };

        let resampled = resampler.process(&block.samples);
        let bytes = encode_frame(&resampled);
        let samples = resampled.len();
        let byte_count = bytes.len();

        match transport.send_audio(bytes) {
            Ok(()) => {
                self.stats.frames_sent += 1;
                self.stats.bytes_sent += byte_count as u64;
                Ok(FrameOutcome::Sent {
                    samples,
                    bytes: byte_count,
                })
            }
            Err(e) => {
                self.stats.frames_dropped += 1;
                self.handle_transport_lost();
                Err(CaptureError::Transport(e))
            }
        }
    }

    /// Stop capturing
    ///
    /// No-op unless capturing. Sends exactly one sentinel if the transport is
    /// open, then closes the transport and releases the microphone.
    pub fn stop(&mut self) -> StopOutcome {
        if !self.state.current().is_capturing() {
            debug!(state = self.state.current().name(), "Stop ignored");
            return StopOutcome::NotActive;
        }

        if let Err(e) = self.state.transition(CaptureState::Stopping) {
            warn!("Failed to enter Stopping: {}", e);
            return StopOutcome::NotActive;
        }
        info!("Stopping capture");

        let mut sentinel_sent = false;
        if let Some(mut transport) = self.transport.take() {
            if transport.is_open() {
                match transport.send_stop() {
                    Ok(()) => {
                        sentinel_sent = true;
                        self.stats.sentinels_sent += 1;
                    }
                    Err(e) => warn!("Failed to send end-of-turn sentinel: {}", e),
                }
            }
            transport.close();
        }

        self.release_microphone();

        if let Err(e) = self.state.transition(CaptureState::Idle) {
            warn!("Failed to return to Idle: {}", e);
            self.state.reset();
        }

        info!(
            frames_sent = self.stats.frames_sent,
            frames_dropped = self.stats.frames_dropped,
            "Capture stopped"
        );
        StopOutcome::Stopped { sentinel_sent }
    }

    /// The transport failed or closed underneath the pipeline
    ///
    /// Releases everything and returns to `Idle` without sending a sentinel.
    /// Returns whether a capture was actually ended.
    pub fn handle_transport_lost(&mut self) -> bool {
        if !self.state.current().is_capturing() {
            return false;
        }

        warn!("Transport lost while capturing");
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
        self.release_microphone();

        if let Err(e) = self.state.transition(CaptureState::Idle) {
            warn!("Failed to return to Idle: {}", e);
            self.state.reset();
        }
        true
    }

    fn release_microphone(&mut self) {
        self.microphone.close();
        self.resampler = None;
    }
}
