//! Wire messages of the streaming endpoint
//!
//! Outbound traffic is raw binary PCM plus a single text sentinel; inbound
//! traffic is JSON discriminated by a `type` field.

use serde::Deserialize;
use tokio_tungstenite::tungstenite::Message;

/// Text frame that ends a user turn
pub const STOP_SENTINEL: &str = "__stop";

// ============================================================================
// Client -> Server
// ============================================================================

/// A frame queued for the sender task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// i16 little-endian PCM at 16 kHz, mono
    Audio(Vec<u8>),
    /// End-of-turn sentinel
    Stop,
}

impl ClientFrame {
    /// Convert into a WebSocket message
    pub fn into_message(self) -> Message {
        match self {
            ClientFrame::Audio(bytes) => Message::Binary(bytes.into()),
            ClientFrame::Stop => Message::Text(STOP_SENTINEL.to_string().into()),
        }
    }

    /// Payload size in bytes
    pub fn len(&self) -> usize {
        match self {
            ClientFrame::Audio(bytes) => bytes.len(),
            ClientFrame::Stop => STOP_SENTINEL.len(),
        }
    }

    /// Whether the frame carries no payload
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Server -> Client
// ============================================================================

/// Messages received from the server
///
/// Unknown `type` values deserialize to [`ServerMessage::Unknown`]; a payload
/// without a `type` field is a parse error.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Speech-to-text result; partial unless `end_of_turn` is set
    Transcript {
        #[serde(default)]
        text: String,
        #[serde(default)]
        end_of_turn: bool,
    },

    /// Complete assistant reply
    LlmResponse {
        #[serde(default)]
        text: String,
    },

    /// Streamed fragment of the assistant reply
    LlmChunk {
        #[serde(default)]
        text: String,
    },

    /// A new audio reply begins; resets the playback timeline
    AudioStart {
        #[serde(default)]
        context_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    /// One piece of the audio reply
    AudioChunk {
        /// Base64 i16 little-endian PCM
        #[serde(default)]
        audio: String,
        #[serde(default)]
        chunk_number: Option<u64>,
        #[serde(default)]
        format: Option<String>,
        #[serde(default)]
        is_final: bool,
        #[serde(default)]
        context_id: Option<String>,
    },

    /// The audio reply finished
    AudioComplete {
        #[serde(default)]
        total_chunks: Option<u64>,
        #[serde(default)]
        context_id: Option<String>,
        #[serde(default)]
        message: Option<String>,
    },

    /// The audio reply failed
    AudioError {
        #[serde(default)]
        message: String,
    },

    /// Server-side failure
    Error {
        #[serde(default)]
        message: String,
    },

    /// Informational notice
    Info {
        #[serde(default)]
        message: String,
    },

    /// Any other `type`
    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The `type` discriminant, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Transcript { .. } => "transcript",
            ServerMessage::LlmResponse { .. } => "llm_response",
            ServerMessage::LlmChunk { .. } => "llm_chunk",
            ServerMessage::AudioStart { .. } => "audio_start",
            ServerMessage::AudioChunk { .. } => "audio_chunk",
            ServerMessage::AudioComplete { .. } => "audio_complete",
            ServerMessage::AudioError { .. } => "audio_error",
            ServerMessage::Error { .. } => "error",
            ServerMessage::Info { .. } => "info",
            ServerMessage::Unknown => "unknown",
        }
    }

    /// Check if this message belongs to the audio reply stream
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            ServerMessage::AudioStart { .. }
                | ServerMessage::AudioChunk { .. }
                | ServerMessage::AudioComplete { .. }
                | ServerMessage::AudioError { .. }
        )
    }

    /// Check if this is a server error that points at missing credentials
    pub fn is_credentials_error(&self) -> bool {
        match self {
            ServerMessage::Error { message } => {
                message.contains("API key") || message.contains("Missing")
            }
            _ => false,
        }
    }
}
