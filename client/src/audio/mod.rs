/// Microphone capture and frame assembly
pub mod capture;

/// Audio device enumeration
pub mod device;

/// Audio-related error types
pub mod error;

/// Output device (cpal stream + mixer)
pub mod output;

/// 16-bit PCM conversion
pub mod pcm;

/// Capture pipeline: resample, encode, transmit
pub mod pipeline;

/// Playback timeline scheduling
pub mod playback;

/// WAV recording for the upload variant
pub mod recorder;

/// Block-averaging resampler
pub mod resampler;

// Re-export commonly used types
pub use capture::{AudioBlock, DEFAULT_FRAME_SIZE, DeviceMicrophone, Microphone};
pub use device::{AudioDevice, DeviceKind, list_input_devices, list_output_devices};
pub use error::{AudioError, AudioResult};
pub use output::{CpalOutput, SilentOutput, open_output};
pub use pipeline::{CaptureError, CapturePipeline, CaptureResult, FrameOutcome, StopOutcome};
pub use playback::{
    OutputDevice, PcmBuffer, PlaybackChunk, PlaybackError, PlaybackScheduler, TimelineConfig,
};
pub use recorder::TurnRecorder;
pub use resampler::{AudioResampler, SPEECH_SAMPLE_RATE};
