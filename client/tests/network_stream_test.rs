//! Streaming transport against a local WebSocket server

use std::sync::{Arc, Mutex};

use futures_util::{SinkExt, StreamExt};
use lumeai_lib::network::{
    AudioTransport, NetworkError, ServerMessage, StreamConfig, StreamConnection, TransportEvent,
    WsTransport,
};
use lumeai_lib::state::Persona;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};

#[derive(Debug, PartialEq)]
enum Received {
    Audio(usize),
    Text(String),
}

/// Accept one connection, send `greeting`, record frames until the sentinel
async fn serve_once(
    listener: TcpListener,
    greeting: Vec<String>,
    uri: Arc<Mutex<Option<String>>>,
) -> Vec<Received> {
    let (stream, _) = listener.accept().await.unwrap();
    let mut ws = tokio_tungstenite::accept_hdr_async(stream, |req: &Request, resp: Response| {
        *uri.lock().unwrap() = Some(req.uri().to_string());
        Ok(resp)
    })
    .await
    .unwrap();

    for text in greeting {
        ws.send(Message::text(text)).await.unwrap();
    }

    let mut received = Vec::new();
    while let Some(Ok(message)) = ws.next().await {
        match message {
            Message::Binary(bytes) => received.push(Received::Audio(bytes.len())),
            Message::Text(text) => {
                let done = text.as_str() == "__stop";
                received.push(Received::Text(text.to_string()));
                if done {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    let _ = ws.close(None).await;
    received
}

async fn next_event(events: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_stream_round_trip() {
    println!("\n=== Streaming Round Trip Test ===");

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let uri = Arc::new(Mutex::new(None));
    let server = tokio::spawn(serve_once(
        listener,
        vec![
            r#"{"type":"transcript","text":"hello","end_of_turn":true}"#.to_string(),
            "this is not json".to_string(),
        ],
        uri.clone(),
    ));

    let config = StreamConfig::new(format!("ws://{}", addr), "user-7").with_persona(Persona::Pirate);
    let (mut transport, mut events) = WsTransport::connect(&config).await.unwrap();
    assert!(transport.is_open());

    transport.send_audio(vec![0u8; 320]).unwrap();
    transport.send_audio(vec![0u8; 640]).unwrap();
    transport.send_stop().unwrap();

    assert_eq!(
        next_event(&mut events).await,
        TransportEvent::Message(ServerMessage::Transcript {
            text: "hello".into(),
            end_of_turn: true
        })
    );
    assert!(matches!(
        next_event(&mut events).await,
        TransportEvent::Malformed { .. }
    ));

    transport.close();
    assert!(!transport.is_open());

    let received = timeout(Duration::from_secs(5), server).await.unwrap().unwrap();
    assert_eq!(
        received,
        vec![
            Received::Audio(320),
            Received::Audio(640),
            Received::Text("__stop".into())
        ]
    );

    assert_eq!(next_event(&mut events).await, TransportEvent::Closed);

    let uri = uri.lock().unwrap().clone().unwrap();
    assert!(uri.starts_with("/ws/stream?session=user-7&persona=pirate"));
    assert!(uri.contains("assembly_key="));
}

#[tokio::test]
async fn test_connect_refused() {
    // Bind then drop to get a port nobody listens on
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap()
    };

    let config = StreamConfig::new(format!("ws://{}", addr), "user-1").with_timeout(2_000);
    let result = StreamConnection::connect(&config).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_handshake_timeout() {
    // Accepts TCP but never answers the upgrade
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let _server = tokio::spawn(async move {
        let (_stream, _) = listener.accept().await.unwrap();
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let config = StreamConfig::new(format!("ws://{}", addr), "user-1").with_timeout(200);
    match StreamConnection::connect(&config).await {
        Err(NetworkError::Timeout(ms)) => assert_eq!(ms, 200),
        other => panic!("Expected timeout, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_http_base_is_rejected() {
    let config = StreamConfig::new("http://127.0.0.1:8000", "user-1");
    assert!(matches!(
        StreamConnection::connect(&config).await,
        Err(NetworkError::InvalidConfig(_))
    ));
}
