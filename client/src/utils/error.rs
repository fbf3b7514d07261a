//! Application-wide error handling
//!
//! `AppError` aggregates the per-module errors and maps each one to an
//! [`ErrorCode`], a message for the status line and an optional recovery
//! hint.
//!
//! # Example
//!
//! ```
//! use lumeai_lib::utils::error::{AppError, ErrorCode};
//! use lumeai_lib::state::ConfigError;
//!
//! let err: AppError = ConfigError::MissingKeys(vec!["assembly_key"]).into();
//! assert_eq!(err.code(), ErrorCode::ConfigMissingKeys);
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::audio::error::AudioError;
use crate::audio::pipeline::CaptureError;
use crate::audio::playback::PlaybackError;
use crate::network::error::NetworkError;
use crate::session::SessionError;
use crate::state::config::ConfigError;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Audio device or codec error
    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),

    /// Capture lifecycle error
    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    /// Reply playback error
    #[error("Playback error: {0}")]
    Playback(#[from] PlaybackError),

    /// Transport error
    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Config(e) => AppError::Config(e),
            SessionError::Capture(e) => AppError::Capture(e),
            SessionError::Network(e) => AppError::Network(e),
            SessionError::Playback(e) => AppError::Playback(e),
            SessionError::Audio(e) => AppError::Audio(e),
        }
    }
}

/// Error codes for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Audio
    /// No microphone
    AudioDeviceNotFound,
    /// No speakers
    AudioOutputNotFound,
    /// Stream could not be built or failed
    AudioStreamError,
    /// Audio payload could not be decoded
    AudioDecodeFailed,

    // Capture
    /// Microphone refused
    CapturePermissionDenied,
    /// Capture already running
    CaptureAlreadyActive,

    // Playback
    /// Output device could not be resumed
    PlaybackResumeFailed,

    // Network
    /// Connection failed
    NetworkConnectionFailed,
    /// Connection timed out
    NetworkTimeout,
    /// Connection closed
    NetworkClosed,
    /// Server answered with an error status
    NetworkBadStatus,

    // Config
    /// Required API keys missing
    ConfigMissingKeys,
    /// Config file could not be read or written
    ConfigLoadFailed,
    /// Config content invalid
    ConfigInvalid,

    // General
    /// Internal error
    InternalError,
}

/// User-facing error details
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorContext {
    pub code: ErrorCode,
    /// Message for the status line
    pub message: String,
    /// Full error text, for logs
    pub detail: Option<String>,
    pub recovery_hint: Option<String>,
    pub recoverable: bool,
}

impl ErrorContext {
    /// Create a recoverable context
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            detail: None,
            recovery_hint: None,
            recoverable: true,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_recovery_hint(mut self, hint: impl Into<String>) -> Self {
        self.recovery_hint = Some(hint.into());
        self
    }

    pub fn not_recoverable(mut self) -> Self {
        self.recoverable = false;
        self
    }
}

impl AppError {
    /// Error code
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Audio(e) => audio_code(e),

            AppError::Capture(CaptureError::PermissionDenied(_)) => {
                ErrorCode::CapturePermissionDenied
            }
            AppError::Capture(CaptureError::AlreadyActive(_)) => ErrorCode::CaptureAlreadyActive,
            AppError::Capture(CaptureError::State(_)) => ErrorCode::InternalError,
            AppError::Capture(CaptureError::Transport(e)) => network_code(e),

            AppError::Playback(PlaybackError::Decode(_)) => ErrorCode::AudioDecodeFailed,
            AppError::Playback(PlaybackError::Resume(_)) => ErrorCode::PlaybackResumeFailed,
            AppError::Playback(PlaybackError::Device(_)) => ErrorCode::AudioStreamError,

            AppError::Network(e) => network_code(e),

            AppError::Config(ConfigError::MissingKeys(_)) => ErrorCode::ConfigMissingKeys,
            AppError::Config(ConfigError::Io(_)) | AppError::Config(ConfigError::Path(_)) => {
                ErrorCode::ConfigLoadFailed
            }
            AppError::Config(_) => ErrorCode::ConfigInvalid,

            AppError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message suitable for the status line
    pub fn user_message(&self) -> String {
        match self.code() {
            ErrorCode::AudioDeviceNotFound | ErrorCode::CapturePermissionDenied => {
                "Microphone access denied or not available".to_string()
            }
            ErrorCode::AudioOutputNotFound => "No audio output device available".to_string(),
            ErrorCode::AudioStreamError => "Audio device error, please try again".to_string(),
            ErrorCode::AudioDecodeFailed => "Could not decode reply audio".to_string(),
            ErrorCode::CaptureAlreadyActive => "Already recording".to_string(),
            ErrorCode::PlaybackResumeFailed => "Could not start audio playback".to_string(),
            ErrorCode::NetworkConnectionFailed | ErrorCode::NetworkTimeout => {
                "Connection error - Check your configuration".to_string()
            }
            ErrorCode::NetworkClosed => "Disconnected".to_string(),
            ErrorCode::NetworkBadStatus => "The server rejected the request".to_string(),
            ErrorCode::ConfigMissingKeys => "Missing Required API Keys".to_string(),
            ErrorCode::ConfigLoadFailed => "Could not read the configuration file".to_string(),
            ErrorCode::ConfigInvalid => "Invalid configuration".to_string(),
            ErrorCode::InternalError => match self {
                AppError::Internal(msg) => format!("Internal error: {}", msg),
                _ => "Internal error".to_string(),
            },
        }
    }

    /// Full context for the presentation layer
    pub fn context(&self) -> ErrorContext {
        let mut ctx = ErrorContext::new(self.code(), self.user_message())
            .with_detail(self.to_string());
        ctx.recovery_hint = self.recovery_suggestion();

        if !self.is_recoverable() {
            ctx = ctx.not_recoverable();
        }
        ctx
    }

    /// What the user can do about it
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self.code() {
            ErrorCode::AudioDeviceNotFound | ErrorCode::CapturePermissionDenied => Some(
                "Connect a microphone and allow this application to use it".to_string(),
            ),
            ErrorCode::NetworkConnectionFailed | ErrorCode::NetworkTimeout => Some(
                "Check that the server is running and `server.base_url` points at it".to_string(),
            ),
            ErrorCode::ConfigMissingKeys => Some(
                "Set them with `lumeai config set api.assembly_key <KEY>` and `api.gemini_key`"
                    .to_string(),
            ),
            ErrorCode::ConfigInvalid | ErrorCode::ConfigLoadFailed => Some(
                "Fix or reset the configuration with `lumeai config reset`".to_string(),
            ),
            _ => None,
        }
    }

    /// Whether another attempt can succeed without user intervention
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, AppError::Config(_) | AppError::Internal(_))
    }

    /// Whether the settings need attention
    pub fn needs_settings(&self) -> bool {
        matches!(self, AppError::Config(ConfigError::MissingKeys(_)))
    }
}

fn audio_code(err: &AudioError) -> ErrorCode {
    match err {
        AudioError::DeviceNotFound | AudioError::InvalidDeviceName => {
            ErrorCode::AudioDeviceNotFound
        }
        AudioError::OutputDeviceNotFound => ErrorCode::AudioOutputNotFound,
        AudioError::Decode(_) | AudioError::Wav(_) => ErrorCode::AudioDecodeFailed,
        _ => ErrorCode::AudioStreamError,
    }
}

fn network_code(err: &NetworkError) -> ErrorCode {
    match err {
        NetworkError::Timeout(_) => ErrorCode::NetworkTimeout,
        NetworkError::ConnectionClosed => ErrorCode::NetworkClosed,
        NetworkError::BadStatus { .. } => ErrorCode::NetworkBadStatus,
        NetworkError::InvalidConfig(_) => ErrorCode::ConfigInvalid,
        _ => ErrorCode::NetworkConnectionFailed,
    }
}

/// Result type for application operations
pub type AppResult<T> = Result<T, AppError>;

impl From<String> for AppError {
    fn from(msg: String) -> Self {
        AppError::Internal(msg)
    }
}

impl From<&str> for AppError {
    fn from(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }
}
