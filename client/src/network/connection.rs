//! WebSocket connection to the streaming endpoint
//!
//! Builds the `/ws/stream` URL from the configured server, session, persona
//! and API keys, performs the handshake and hands back split halves for the
//! sender and receiver tasks.

use crate::network::error::{NetworkError, NetworkResult};
use crate::state::config::{ApiConfig, ClientConfig, Persona};
use futures_util::{
    StreamExt,
    stream::{SplitSink, SplitStream},
};
use reqwest::Url;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, info};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Write half of the WebSocket stream
pub type WsWriter = SplitSink<WsStream, Message>;

/// Read half of the WebSocket stream
pub type WsReader = SplitStream<WsStream>;

/// Path of the streaming endpoint
const STREAM_PATH: &str = "/ws/stream";

/// Parameters of one streaming connection
///
/// # Example
/// ```
/// use lumeai_lib::network::StreamConfig;
/// use lumeai_lib::state::config::Persona;
///
/// let config = StreamConfig::new("ws://127.0.0.1:8000", "user-1")
///     .with_persona(Persona::Pirate)
///     .with_timeout(5000);
/// let url = config.build_url().unwrap();
/// assert!(url.starts_with("ws://127.0.0.1:8000/ws/stream?session=user-1&persona=pirate"));
/// ```
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// `ws://` or `wss://` base
    pub websocket_base: String,

    /// Capture-side session identifier
    pub session_id: String,

    /// Persona sent with the connection
    pub persona: Persona,

    /// Keys forwarded to the backend
    pub keys: ApiConfig,

    /// Handshake timeout in milliseconds
    pub timeout_ms: u64,
}

impl StreamConfig {
    /// Create a configuration with no keys and the default persona
    pub fn new(websocket_base: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            websocket_base: websocket_base.into(),
            session_id: session_id.into(),
            persona: Persona::Default,
            keys: ApiConfig::default(),
            timeout_ms: 10_000,
        }
    }

    /// Derive a configuration from the client settings
    pub fn from_client_config(config: &ClientConfig, session_id: impl Into<String>) -> Self {
        Self::new(config.server.websocket_base(), session_id)
            .with_persona(config.persona)
            .with_keys(config.api.clone())
            .with_timeout(config.server.connect_timeout_ms)
    }

    /// Set the persona
    pub fn with_persona(mut self, persona: Persona) -> Self {
        self.persona = persona;
        self
    }

    /// Set the API keys
    pub fn with_keys(mut self, keys: ApiConfig) -> Self {
        self.keys = keys;
        self
    }

    /// Set the handshake timeout in milliseconds
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Build the WebSocket URL with query parameters
    pub fn build_url(&self) -> NetworkResult<String> {
        let base = self.websocket_base.trim_end_matches('/');
        if !(base.starts_with("ws://") || base.starts_with("wss://")) {
            return Err(NetworkError::InvalidConfig(format!(
                "WebSocket base must use ws:// or wss://: {}",
                base
            )));
        }

        let mut params: Vec<(&str, &str)> = vec![
            ("session", self.session_id.as_str()),
            ("persona", self.persona.id()),
        ];
        params.extend(self.keys.query_pairs());

        let url = Url::parse_with_params(&format!("{}{}", base, STREAM_PATH), &params)
            .map_err(|e| NetworkError::InvalidConfig(format!("Invalid URL: {}", e)))?;

        Ok(url.to_string())
    }
}

/// An open streaming connection
#[derive(Debug)]
pub struct StreamConnection {
    ws_stream: WsStream,
}

impl StreamConnection {
    /// Connect to the streaming endpoint
    ///
    /// # Errors
    /// Returns [`NetworkError::Timeout`] if the handshake does not finish in
    /// time and [`NetworkError::ConnectionFailed`] for any other failure.
    pub async fn connect(config: &StreamConfig) -> NetworkResult<Self> {
        let url = config.build_url()?;
        info!(
            session_id = %config.session_id,
            persona = config.persona.id(),
            "Connecting to streaming endpoint"
        );
        debug!("Connection base: {}", config.websocket_base);

        let timeout = tokio::time::Duration::from_millis(config.timeout_ms);
        let (ws_stream, response) = tokio::time::timeout(timeout, connect_async(url))
            .await
            .map_err(|_| NetworkError::Timeout(config.timeout_ms))?
            .map_err(|e| NetworkError::ConnectionFailed(e.to_string()))?;

        info!("Connected (status: {})", response.status());

        Ok(Self { ws_stream })
    }

    /// Split into write and read halves
    pub fn split(self) -> (WsWriter, WsReader) {
        self.ws_stream.split()
    }
}
