use thiserror::Error;

use super::app_state::CaptureState;

/// State-related errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    /// Transition not allowed by the capture lifecycle
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: CaptureState, to: CaptureState },
}

/// Result type for the state module
pub type StateResult<T> = Result<T, StateError>;
