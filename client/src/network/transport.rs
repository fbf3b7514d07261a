//! Outbound transport used by the capture pipeline
//!
//! The pipeline is the only writer of a transport. Everything else only asks
//! [`AudioTransport::is_open`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::network::connection::{StreamConfig, StreamConnection};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{ClientFrame, ServerMessage};
use crate::network::tasks::{receiver_task, sender_task};

/// Capacity of the inbound event queue
pub const EVENT_CAPACITY: usize = 256;

/// Something the transport observed
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A parsed server message
    Message(ServerMessage),
    /// A text frame that could not be parsed
    Malformed { raw: String, reason: String },
    /// The server closed the connection
    Closed,
    /// The connection failed
    Error(String),
}

/// Sink for encoded audio and the end-of-turn sentinel
pub trait AudioTransport {
    /// Whether frames can currently be sent
    fn is_open(&self) -> bool;

    /// Queue one frame of encoded PCM
    ///
    /// # Errors
    /// Only when the transport is gone; an open transport always accepts.
    fn send_audio(&mut self, pcm: Vec<u8>) -> NetworkResult<()>;

    /// Queue the end-of-turn sentinel
    fn send_stop(&mut self) -> NetworkResult<()>;

    /// Close the transport. Safe to call more than once.
    fn close(&mut self);
}

/// Opens transports for the session
pub trait TransportConnector {
    /// Transport produced by this connector
    type Transport: AudioTransport;

    /// Connect, returning the transport and its inbound events
    fn connect(
        &mut self,
        config: &StreamConfig,
    ) -> impl Future<Output = NetworkResult<(Self::Transport, mpsc::Receiver<TransportEvent>)>>;
}

/// Connector for [`WsTransport`]
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl TransportConnector for WsConnector {
    type Transport = WsTransport;

    async fn connect(
        &mut self,
        config: &StreamConfig,
    ) -> NetworkResult<(WsTransport, mpsc::Receiver<TransportEvent>)> {
        WsTransport::connect(config).await
    }
}

/// WebSocket transport: an unbounded queue drained by [`sender_task`]
///
/// Like a browser socket's send buffer, the queue never refuses a frame
/// while open, so audio and the end-of-turn sentinel are never dropped.
pub struct WsTransport {
    outbound: Option<mpsc::UnboundedSender<ClientFrame>>,
    open: Arc<AtomicBool>,
    tasks: Vec<JoinHandle<NetworkResult<()>>>,
}

impl WsTransport {
    /// Connect and spawn the sender and receiver tasks
    ///
    /// # Returns
    /// The transport and the receiver of inbound events.
    pub async fn connect(
        config: &StreamConfig,
    ) -> NetworkResult<(Self, mpsc::Receiver<TransportEvent>)> {
        let connection = StreamConnection::connect(config).await?;
        let (writer, reader) = connection.split();

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::channel(EVENT_CAPACITY);
        let open = Arc::new(AtomicBool::new(true));

        let sender = tokio::spawn(sender_task(writer, frame_rx, event_tx.clone(), open.clone()));
        let receiver = tokio::spawn(receiver_task(reader, event_tx, open.clone()));

        info!("Streaming transport ready");

        Ok((
            Self {
                outbound: Some(frame_tx),
                open,
                tasks: vec![sender, receiver],
            },
            event_rx,
        ))
    }

    /// A transport over a plain queue, with no socket behind it
    ///
    /// The receiver sees exactly the frames the transport would write.
    pub fn from_queue() -> (Self, mpsc::UnboundedReceiver<ClientFrame>) {
        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        (
            Self {
                outbound: Some(frame_tx),
                open: Arc::new(AtomicBool::new(true)),
                tasks: Vec::new(),
            },
            frame_rx,
        )
    }

    /// Shared open flag, cleared when either task fails
    pub fn open_flag(&self) -> Arc<AtomicBool> {
        self.open.clone()
    }

    fn enqueue(&mut self, frame: ClientFrame) -> NetworkResult<()> {
        if !self.is_open() {
            return Err(NetworkError::ConnectionClosed);
        }
        let outbound = self.outbound.as_ref().ok_or(NetworkError::ConnectionClosed)?;

        outbound.send(frame).map_err(|_| {
            self.open.store(false, Ordering::SeqCst);
            NetworkError::ConnectionClosed
        })
    }
}

impl AudioTransport for WsTransport {
    fn is_open(&self) -> bool {
        self.outbound.is_some() && self.open.load(Ordering::SeqCst)
    }

    fn send_audio(&mut self, pcm: Vec<u8>) -> NetworkResult<()> {
        self.enqueue(ClientFrame::Audio(pcm))
    }

    fn send_stop(&mut self) -> NetworkResult<()> {
        self.enqueue(ClientFrame::Stop)
    }

    fn close(&mut self) {
        // Dropping the queue lets the sender task flush and send a close frame
        if self.outbound.take().is_some() {
            debug!("Closing streaming transport");
        }
        self.open.store(false, Ordering::SeqCst);
        self.tasks.retain(|task| !task.is_finished());
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        self.close();
    }
}
