//! End-to-end relay tests over real websockets on the loopback interface.
//!
//! A mock translation service stands in for the remote endpoint and a fake
//! telephony client drives the listener, so the full path is exercised:
//! JSON framing on both legs, connector handshake, turn taking, and
//! outbound frame chunking.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::tungstenite::Error as WsError;

use voxbridge_app::config::SessionConfig;
use voxbridge_app::server;
use voxbridge_foundation::shutdown::ShutdownHandler;
use voxbridge_telemetry::RelayMetrics;
use voxbridge_translate::config::ConnectorConfig;

const TIMEOUT: Duration = Duration::from_secs(5);

async fn recv_json<S>(ws: &mut S) -> Value
where
    S: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a message")
            .expect("socket ended unexpectedly")
            .expect("socket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).expect("invalid json frame");
        }
    }
}

async fn send_json<S>(ws: &mut S, value: Value)
where
    S: Sink<Message, Error = WsError> + Unpin,
{
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send failed");
}

/// Bind the relay on an ephemeral port, pointed at the given translation
/// endpoint. Returns the telephony address.
async fn start_relay(translation_endpoint: String) -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut connector = ConnectorConfig::new(
        "realtime-translate-1".into(),
        "sk-test".into(),
        "translate".into(),
        "alloy".into(),
    );
    connector.endpoint = translation_endpoint;

    let config = Arc::new(SessionConfig {
        connector,
        connect_timeout: TIMEOUT,
    });
    let metrics = Arc::new(RelayMetrics::default());

    tokio::spawn(async move {
        let shutdown = ShutdownHandler::new().install().await;
        server::serve(listener, config, metrics, &shutdown).await;
    });

    addr
}

#[tokio::test]
async fn synthesized_audio_comes_back_as_fixed_size_frames() {
    let translation_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let translation_addr = translation_listener.local_addr().unwrap();

    let synthesized = vec![0x55u8; 350];
    let delta = BASE64.encode(&synthesized);

    let mock = tokio::spawn(async move {
        let (tcp, _) = translation_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        // The session configuration must be the first event on the wire.
        let first = recv_json(&mut ws).await;
        assert_eq!(first["type"], "session.update");
        assert_eq!(first["session"]["output_audio_format"], "g711_ulaw");
        send_json(&mut ws, json!({"type": "session.created"})).await;

        // First forwarded caller audio triggers one synthesized response.
        loop {
            let msg = recv_json(&mut ws).await;
            if msg["type"] == "input_audio_buffer.append" {
                assert_eq!(msg["audio"], "AAECAw==");
                break;
            }
        }
        send_json(&mut ws, json!({"type": "response.created"})).await;
        send_json(
            &mut ws,
            json!({"type": "response.audio.delta", "delta": delta}),
        )
        .await;
        send_json(&mut ws, json!({"type": "response.done"})).await;

        // Stay open until the relay tears the session down.
        while let Some(Ok(msg)) = ws.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    });

    let relay_addr = start_relay(format!("ws://{}", translation_addr)).await;
    let (mut telephony, _) =
        tokio_tungstenite::connect_async(format!("ws://{}", relay_addr))
            .await
            .unwrap();

    send_json(&mut telephony, json!({"event": "connected"})).await;
    send_json(
        &mut telephony,
        json!({"event": "start", "streamSid": "S1", "start": {"callSid": "C1"}}),
    )
    .await;
    send_json(
        &mut telephony,
        json!({"event": "media", "media": {"payload": "AAECAw=="}}),
    )
    .await;

    let mut frames = Vec::new();
    for _ in 0..3 {
        let msg = recv_json(&mut telephony).await;
        assert_eq!(msg["event"], "media");
        assert_eq!(msg["streamSid"], "S1");
        let payload = msg["media"]["payload"].as_str().unwrap();
        frames.push(BASE64.decode(payload).unwrap());
    }
    let lengths: Vec<usize> = frames.iter().map(|f| f.len()).collect();
    assert_eq!(lengths, vec![160, 160, 30]);
    let rejoined: Vec<u8> = frames.concat();
    assert_eq!(rejoined, synthesized);

    // Stop ends the call: both sockets close.
    send_json(&mut telephony, json!({"event": "stop"})).await;
    tokio::time::timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = telephony.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await
    .expect("telephony socket did not close after stop");

    tokio::time::timeout(TIMEOUT, mock)
        .await
        .expect("translation socket did not close after stop")
        .unwrap();
}

#[tokio::test]
async fn barge_in_reaches_the_translation_service_as_one_cancel() {
    let translation_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let translation_addr = translation_listener.local_addr().unwrap();

    let mock = tokio::spawn(async move {
        let (tcp, _) = translation_listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

        let first = recv_json(&mut ws).await;
        assert_eq!(first["type"], "session.update");
        send_json(&mut ws, json!({"type": "session.created"})).await;

        // Synthesis in flight, then the caller starts talking over it.
        send_json(&mut ws, json!({"type": "response.created"})).await;
        send_json(
            &mut ws,
            json!({"type": "input_audio_buffer.speech_started"}),
        )
        .await;

        let cancel = recv_json(&mut ws).await;
        assert_eq!(cancel["type"], "response.cancel");
        send_json(&mut ws, json!({"type": "response.cancelled"})).await;

        // A second speech start while idle must not produce another cancel.
        send_json(
            &mut ws,
            json!({"type": "input_audio_buffer.speech_started"}),
        )
        .await;
        let next = tokio::time::timeout(Duration::from_millis(500), ws.next()).await;
        assert!(
            next.is_err(),
            "unexpected message after idle speech start: {next:?}"
        );
    });

    let relay_addr = start_relay(format!("ws://{}", translation_addr)).await;
    let (mut telephony, _) =
        tokio_tungstenite::connect_async(format!("ws://{}", relay_addr))
            .await
            .unwrap();

    send_json(
        &mut telephony,
        json!({"event": "start", "streamSid": "S2", "start": {"callSid": "C2"}}),
    )
    .await;

    tokio::time::timeout(TIMEOUT, mock)
        .await
        .expect("mock translation service did not finish")
        .unwrap();
}

#[tokio::test]
async fn failed_connector_leaves_telephony_open_and_audio_dropped() {
    // No translation service listening: session open fails, the telephony
    // socket stays open, and media is silently dropped.
    let relay_addr = start_relay("ws://127.0.0.1:1".into()).await;
    let (mut telephony, _) =
        tokio_tungstenite::connect_async(format!("ws://{}", relay_addr))
            .await
            .unwrap();

    send_json(
        &mut telephony,
        json!({"event": "start", "streamSid": "S3", "start": {"callSid": "C3"}}),
    )
    .await;
    send_json(
        &mut telephony,
        json!({"event": "media", "media": {"payload": "AAECAw=="}}),
    )
    .await;

    // No error and no media comes back; the socket is still writable.
    let quiet = tokio::time::timeout(Duration::from_millis(500), telephony.next()).await;
    assert!(quiet.is_err(), "unexpected frame from idle session: {quiet:?}");

    send_json(&mut telephony, json!({"event": "stop"})).await;
    tokio::time::timeout(TIMEOUT, async {
        while let Some(Ok(msg)) = telephony.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    })
    .await
    .expect("telephony socket did not close after stop");
}
