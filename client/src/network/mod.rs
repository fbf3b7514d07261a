//! Network communication with the voice backend
//!
//! Streaming goes over a WebSocket (`connection`, `tasks`, `transport`);
//! the non-streaming variant uses a single HTTP upload per turn (`upload`).

/// WebSocket connection management
pub mod connection;

/// Network error types
pub mod error;

/// Wire message definitions
pub mod messages;

/// Async tasks for concurrent send/receive operations
pub mod tasks;

/// Outbound transport abstraction
pub mod transport;

/// HTTP upload client
pub mod upload;

pub use connection::{StreamConfig, StreamConnection, WsReader, WsWriter};
pub use error::{NetworkError, NetworkResult};
pub use messages::{ClientFrame, STOP_SENTINEL, ServerMessage};
pub use transport::{AudioTransport, TransportConnector, TransportEvent, WsConnector, WsTransport};
pub use upload::{ChatTurnResponse, ChatUploadClient, FALLBACK_TEXT, HistoryEntry, TurnUploader};
