//! Async tasks for sending and receiving WebSocket frames
//!
//! One sender task drains the outbound queue in order; one receiver task
//! parses inbound text frames and forwards them as [`TransportEvent`]s.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::network::connection::{WsReader, WsWriter};
use crate::network::error::{NetworkError, NetworkResult};
use crate::network::messages::{ClientFrame, ServerMessage};
use crate::network::transport::TransportEvent;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

/// Sender task that writes queued frames to the WebSocket
///
/// Runs until the queue is closed, then closes the writer (sending a close
/// frame). A write failure marks the transport closed and is reported on
/// `events`.
///
/// # Example
/// ```no_run
/// use std::sync::{Arc, atomic::AtomicBool};
/// use tokio::sync::mpsc;
/// use lumeai_lib::network::{StreamConfig, StreamConnection};
/// use lumeai_lib::network::tasks::sender_task;
///
/// #[tokio::main]
/// async fn main() {
///     let config = StreamConfig::new("ws://127.0.0.1:8000", "user-1");
///     let conn = StreamConnection::connect(&config).await.unwrap();
///     let (writer, _reader) = conn.split();
///
///     let (frame_tx, frame_rx) = mpsc::unbounded_channel();
///     let (event_tx, _event_rx) = mpsc::channel(64);
///     let open = Arc::new(AtomicBool::new(true));
///
///     tokio::spawn(sender_task(writer, frame_rx, event_tx, open));
///     drop(frame_tx);
/// }
/// ```
pub async fn sender_task(
    mut ws_writer: WsWriter,
    mut frame_rx: mpsc::UnboundedReceiver<ClientFrame>,
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
) -> NetworkResult<()> {
    info!("Sender task started");

    let mut frame_count = 0u64;

    while let Some(frame) = frame_rx.recv().await {
        frame_count += 1;
        let is_stop = frame == ClientFrame::Stop;
        debug!("Sending frame #{} ({} bytes)", frame_count, frame.len());

        if let Err(e) = ws_writer.send(frame.into_message()).await {
            error!("Failed to send frame #{}: {}", frame_count, e);
            open.store(false, Ordering::SeqCst);
            let _ = events.send(TransportEvent::Error(e.to_string())).await;
            return Err(NetworkError::WebSocketError(e));
        }

        if is_stop {
            info!("End-of-turn sentinel sent");
        }
    }

    info!("Sender task completed: {} frames sent, queue closed", frame_count);

    if let Err(e) = ws_writer.close().await {
        warn!("Failed to close WebSocket writer: {}", e);
    }

    Ok(())
}

/// Receiver task that parses inbound frames and forwards them as events
///
/// Malformed text frames are reported and skipped; the task keeps reading.
/// The stream ending (or a close frame) yields [`TransportEvent::Closed`];
/// a protocol error yields [`TransportEvent::Error`].
pub async fn receiver_task(
    mut ws_reader: WsReader,
    events: mpsc::Sender<TransportEvent>,
    open: Arc<AtomicBool>,
) -> NetworkResult<()> {
    info!("Receiver task started");

    let mut message_count = 0u64;

    while let Some(msg_result) = ws_reader.next().await {
        let event = match msg_result {
            Ok(Message::Text(text)) => match ServerMessage::parse(&text) {
                Ok(server_msg) => {
                    message_count += 1;
                    debug!("Parsed message #{}: {}", message_count, server_msg.kind());
                    TransportEvent::Message(server_msg)
                }
                Err(e) => {
                    warn!("Could not parse server message: {}", e);
                    TransportEvent::Malformed {
                        raw: text.to_string(),
                        reason: e.to_string(),
                    }
                }
            },
            Ok(Message::Close(frame)) => {
                info!("Received close frame: {:?}", frame);
                break;
            }
            Ok(Message::Ping(data)) => {
                debug!("Received ping, length: {} bytes", data.len());
                continue;
            }
            Ok(Message::Pong(_)) => {
                debug!("Received pong");
                continue;
            }
            Ok(Message::Binary(data)) => {
                warn!("Received unexpected binary message: {} bytes", data.len());
                continue;
            }
            Ok(Message::Frame(_)) => {
                debug!("Received raw frame");
                continue;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                open.store(false, Ordering::SeqCst);
                let _ = events.send(TransportEvent::Error(e.to_string())).await;
                return Err(NetworkError::WebSocketError(e));
            }
        };

        if events.send(event).await.is_err() {
            warn!("Event receiver dropped, stopping receiver task");
            open.store(false, Ordering::SeqCst);
            return Ok(());
        }
    }

    info!(
        "Receiver task completed: {} messages received, stream ended",
        message_count
    );

    open.store(false, Ordering::SeqCst);
    let _ = events.send(TransportEvent::Closed).await;

    Ok(())
}
