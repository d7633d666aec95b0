use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use voxbridge_foundation::error::{SocketSide, TransportError};

use crate::config::{ConnectorConfig, PROTOCOL_HEADER_NAME, PROTOCOL_HEADER_VALUE};
use crate::protocol::{ClientEvent, ServerEvent};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Commands accepted by the connector's writer task.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// Append one base64 audio payload to the remote input buffer.
    Audio(String),
    /// Cancel the in-flight synthesis.
    Cancel,
    /// Close the socket.
    Close,
}

/// Handle to a connected translation session.
///
/// All sends are fire and forget: the remote protocol provides no
/// acknowledgments, so none are invented here. Once the socket is gone the
/// commands are dropped, which is the contract for a connector that is no
/// longer open.
#[derive(Clone)]
pub struct ConnectorHandle {
    cmd_tx: mpsc::Sender<Command>,
}

impl ConnectorHandle {
    pub fn new(cmd_tx: mpsc::Sender<Command>) -> Self {
        Self { cmd_tx }
    }

    /// Forward one audio payload; no-op if the socket is not open.
    pub fn send_audio(&self, payload: String) {
        if let Err(e) = self.cmd_tx.try_send(Command::Audio(payload)) {
            debug!("Dropping audio payload for translation service: {}", e);
        }
    }

    /// Send a cancellation. The remote side tolerates a cancel with no
    /// active synthesis, so this never fails.
    pub fn cancel(&self) {
        if let Err(e) = self.cmd_tx.try_send(Command::Cancel) {
            debug!("Dropping cancellation for translation service: {}", e);
        }
    }

    /// Close the socket unconditionally. Idempotent.
    pub fn close(&self) {
        let _ = self.cmd_tx.try_send(Command::Close);
    }
}

/// Open the outbound socket, push the one-time session configuration, and
/// spawn the reader/writer tasks.
///
/// Returns the command handle and the stream of decoded inbound events.
/// The event channel closing signals that the socket is gone.
pub async fn connect(
    config: &ConnectorConfig,
) -> Result<(ConnectorHandle, mpsc::Receiver<ServerEvent>), TransportError> {
    let connect_failed = |reason: String| TransportError::ConnectFailed {
        side: SocketSide::Translation,
        reason,
    };

    let mut request = config
        .url()
        .into_client_request()
        .map_err(|e| connect_failed(e.to_string()))?;
    let bearer = http::HeaderValue::from_str(&format!("Bearer {}", config.api_key))
        .map_err(|e| connect_failed(format!("invalid credential: {e}")))?;
    request.headers_mut().insert(http::header::AUTHORIZATION, bearer);
    request.headers_mut().insert(
        PROTOCOL_HEADER_NAME,
        http::HeaderValue::from_static(PROTOCOL_HEADER_VALUE),
    );

    let (ws, _response) = connect_async(request)
        .await
        .map_err(|e| connect_failed(e.to_string()))?;
    info!("Connected to translation service");

    let (mut sink, stream) = ws.split();

    // Exactly one session-configuration message, before any audio.
    let configure = ClientEvent::SessionUpdate {
        session: config.session.clone(),
    };
    let text = serde_json::to_string(&configure)
        .map_err(|e| connect_failed(format!("encode session configuration: {e}")))?;
    sink.send(Message::Text(text.into()))
        .await
        .map_err(|e| connect_failed(format!("send session configuration: {e}")))?;

    let (cmd_tx, cmd_rx) = mpsc::channel::<Command>(256);
    let (event_tx, event_rx) = mpsc::channel::<ServerEvent>(256);

    tokio::spawn(writer_task(sink, cmd_rx));
    tokio::spawn(reader_task(stream, event_tx));

    Ok((ConnectorHandle::new(cmd_tx), event_rx))
}

/// Serializes all outbound writes onto the socket.
async fn writer_task(mut sink: SplitSink<WsStream, Message>, mut cmd_rx: mpsc::Receiver<Command>) {
    while let Some(cmd) = cmd_rx.recv().await {
        let event = match cmd {
            Command::Audio(audio) => ClientEvent::InputAudioAppend { audio },
            Command::Cancel => {
                debug!("Sending synthesis cancellation");
                ClientEvent::ResponseCancel
            }
            Command::Close => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        };

        let text = match serde_json::to_string(&event) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode outbound translation event: {}", e);
                continue;
            }
        };
        if sink.send(Message::Text(text.into())).await.is_err() {
            break;
        }
    }
    debug!("Translation writer task finished");
}

/// Decodes inbound frames into events. Malformed messages are logged and
/// discarded; they never take the reader down.
async fn reader_task(mut stream: SplitStream<WsStream>, event_tx: mpsc::Sender<ServerEvent>) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerEvent>(text.as_str()) {
                Ok(event) => {
                    if event_tx.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("Discarding malformed translation message: {}", e);
                }
            },
            Ok(Message::Close(_)) => {
                info!("Translation service closed the connection");
                break;
            }
            Ok(_) => {
                // Binary/ping/pong frames are not part of the event protocol.
            }
            Err(e) => {
                warn!("Translation socket error: {}", e);
                break;
            }
        }
    }
    // Dropping event_tx tells the session the connector is gone.
    debug!("Translation reader task finished");
}
