//! Network error types for the streaming and upload transports

use thiserror::Error;

/// Network-related errors
#[derive(Error, Debug)]
pub enum NetworkError {
    /// Failed to connect to server
    #[error("Failed to connect to server: {0}")]
    ConnectionFailed(String),

    /// Connection timeout
    #[error("Connection timeout after {0}ms")]
    Timeout(u64),

    /// WebSocket error
    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    /// Failed to (de)serialize a message
    #[error("Failed to parse message: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("Server returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    /// Transport is not open
    #[error("Connection closed")]
    ConnectionClosed,

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for network operations
pub type NetworkResult<T> = Result<T, NetworkError>;
