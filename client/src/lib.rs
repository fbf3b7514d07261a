/// Audio capture, encoding and playback
pub mod audio;

/// Network communication with the voice backend
pub mod network;

/// Conversation sessions
pub mod session;

/// Capture state, status board and configuration
pub mod state;

/// Utility modules
pub mod utils;
