//! Per-call relay session.
//!
//! One session owns one telephony websocket and at most one translation
//! connector. Both sockets are read by dedicated tasks that forward decoded
//! messages into a single inbox, so all session state (turn taking, latency
//! marks, identifiers) is touched from exactly one task and needs no
//! locking. Writes to each socket go through a dedicated writer task, so
//! outbound frames are never interleaved.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};

use voxbridge_audio::FrameChunker;
use voxbridge_foundation::error::{AppError, ProtocolDecodeError, SocketSide, TransportError};
use voxbridge_telemetry::{FpsTracker, RelayMetrics, TurnLatency};
use voxbridge_turn::{TurnAction, TurnController, TurnEvent};
use voxbridge_translate::protocol::ServerEvent;
use voxbridge_translate::{connector, ConnectorHandle};

use crate::config::SessionConfig;
use crate::telephony::{self, OutboundMessage, TelephonyMessage};

/// Messages merged into the session's single inbox.
#[derive(Debug)]
pub enum SessionInput {
    Telephony(TelephonyMessage),
    Translation(ServerEvent),
    TelephonyClosed,
    TranslationClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionFlow {
    Continue,
    Stop,
}

/// State for one telephony call being relayed.
pub struct CallSession {
    config: Arc<SessionConfig>,
    stream_sid: Option<String>,
    call_sid: Option<String>,
    connector: Option<ConnectorHandle>,
    turn: TurnController,
    latency: TurnLatency,
    chunker: FrameChunker,
    inbox_tx: mpsc::Sender<SessionInput>,
    telephony_tx: mpsc::Sender<OutboundMessage>,
    metrics: Arc<RelayMetrics>,
    media_fps: FpsTracker,
    closed: bool,
}

impl CallSession {
    pub fn new(
        config: Arc<SessionConfig>,
        inbox_tx: mpsc::Sender<SessionInput>,
        telephony_tx: mpsc::Sender<OutboundMessage>,
        metrics: Arc<RelayMetrics>,
    ) -> Self {
        Self {
            config,
            stream_sid: None,
            call_sid: None,
            connector: None,
            turn: TurnController::new(),
            latency: TurnLatency::default(),
            chunker: FrameChunker::default(),
            inbox_tx,
            telephony_tx,
            metrics,
            media_fps: FpsTracker::new(),
            closed: false,
        }
    }

    async fn handle(&mut self, input: SessionInput) -> SessionFlow {
        match input {
            SessionInput::Telephony(msg) => self.handle_telephony(msg).await,
            SessionInput::Translation(event) => self.handle_translation(event).await,
            SessionInput::TelephonyClosed => {
                if !self.closed {
                    info!("Telephony socket closed");
                }
                self.close();
                SessionFlow::Stop
            }
            SessionInput::TranslationClosed => {
                if !self.closed {
                    let err = AppError::from(TransportError::Closed {
                        side: SocketSide::Translation,
                    });
                    warn!("{} ({:?})", err, err.disposition());
                }
                self.close();
                SessionFlow::Stop
            }
        }
    }

    async fn handle_telephony(&mut self, msg: TelephonyMessage) -> SessionFlow {
        match msg {
            TelephonyMessage::Connected => {
                info!("Telephony transport connected");
                SessionFlow::Continue
            }

            TelephonyMessage::Start { stream_sid, start } => {
                if self.connector.is_some() || self.closed {
                    warn!("Ignoring duplicate stream start");
                    return SessionFlow::Continue;
                }
                info!(
                    stream_sid = %stream_sid,
                    call_sid = %start.call_sid,
                    "Media stream started"
                );
                self.stream_sid = Some(stream_sid);
                self.call_sid = Some(start.call_sid);
                self.open_connector().await;
                SessionFlow::Continue
            }

            TelephonyMessage::Media { media } => {
                self.metrics.increment_telephony_in();
                if let Some(fps) = self.media_fps.tick() {
                    self.metrics.update_telephony_in_fps(fps);
                }
                match &self.connector {
                    Some(handle) => {
                        handle.send_audio(media.payload);
                        self.metrics
                            .audio_payloads_forwarded
                            .fetch_add(1, Ordering::Relaxed);
                    }
                    None => {
                        // Deliberate backpressure choice: a connector that
                        // never came up must not stall the telephony leg.
                        self.metrics
                            .audio_payloads_dropped
                            .fetch_add(1, Ordering::Relaxed);
                    }
                }
                SessionFlow::Continue
            }

            TelephonyMessage::Stop => {
                if !self.closed {
                    info!("Media stream stopped");
                }
                self.close();
                SessionFlow::Stop
            }
        }
    }

    async fn open_connector(&mut self) {
        let result = tokio::time::timeout(
            self.config.connect_timeout,
            connector::connect(&self.config.connector),
        )
        .await;

        match result {
            Ok(Ok((handle, mut events))) => {
                self.connector = Some(handle);
                let inbox = self.inbox_tx.clone();
                tokio::spawn(async move {
                    while let Some(event) = events.recv().await {
                        if inbox.send(SessionInput::Translation(event)).await.is_err() {
                            return;
                        }
                    }
                    let _ = inbox.send(SessionInput::TranslationClosed).await;
                });
            }
            Ok(Err(e)) => {
                // Session open failed; the telephony socket stays open but
                // idle and every inbound payload is dropped.
                error!("Session open failed: {}", AppError::from(e));
            }
            Err(_) => {
                let err = AppError::from(TransportError::ReadyTimeout {
                    side: SocketSide::Translation,
                    timeout: self.config.connect_timeout,
                });
                error!("Session open failed: {}", err);
            }
        }
    }

    async fn handle_translation(&mut self, event: ServerEvent) -> SessionFlow {
        self.metrics
            .translation_events
            .fetch_add(1, Ordering::Relaxed);

        match event {
            ServerEvent::SessionCreated => {
                info!("Translation session created");
            }
            ServerEvent::SessionUpdated => {
                info!("Translation session configured");
            }

            ServerEvent::ResponseCreated => {
                self.turn.process(TurnEvent::SynthesisStarted);
                self.metrics
                    .synthesis_cycles
                    .fetch_add(1, Ordering::Relaxed);
                debug!("Synthesis started");
            }

            ServerEvent::ConversationItemCreated { item } => {
                if let Some(item) = item {
                    if item.role.as_deref() == Some("assistant") {
                        debug!("Assistant conversation item created");
                    }
                }
            }

            ServerEvent::ResponseAudioDelta { delta: Some(delta) } => {
                return self.relay_audio(delta).await;
            }
            ServerEvent::ResponseAudioDelta { delta: None } => {}

            ServerEvent::ResponseTranscriptDelta { delta } => {
                if let Some(delta) = delta {
                    debug!(target: "transcript", "{}", delta);
                }
            }
            ServerEvent::ResponseTranscriptDone { transcript } => {
                info!(
                    target: "transcript",
                    "Translated transcript: {}",
                    transcript.as_deref().unwrap_or("")
                );
            }

            ServerEvent::SpeechStarted => {
                debug!("Caller speech started");
                self.metrics.speech_started();
                self.latency.mark_speech_start();
                if let Some(TurnAction::CancelSynthesis) =
                    self.turn.process(TurnEvent::CallerSpeechStarted)
                {
                    info!("Caller barge-in, cancelling synthesis");
                    if let Some(handle) = &self.connector {
                        handle.cancel();
                    }
                    self.metrics.cancellations.fetch_add(1, Ordering::Relaxed);
                    self.latency.cancel_synthesis();
                }
            }

            ServerEvent::SpeechStopped => {
                self.metrics.speech_stopped();
                self.turn.process(TurnEvent::CallerSpeechStopped);
                match self.latency.mark_speech_stop() {
                    Some(duration) => {
                        debug!("Caller speech ended after {}ms", duration.as_millis())
                    }
                    None => debug!("Caller speech ended"),
                }
            }

            ServerEvent::InputTranscriptionCompleted { transcript } => {
                let transcript = transcript.unwrap_or_default();
                match self.latency.mark_transcript() {
                    Some(latency) => info!(
                        target: "transcript",
                        "Caller said {:?} (transcribed {}ms after speech end)",
                        transcript,
                        latency.as_millis()
                    ),
                    None => info!(target: "transcript", "Caller said {:?}", transcript),
                }
            }

            ServerEvent::ResponseDone => {
                self.turn.process(TurnEvent::SynthesisCompleted);
                let report = self.latency.finish_synthesis();
                if let Some(latency) = report.response_latency {
                    self.metrics.record_response_latency(latency);
                }
                if let Some(end_to_end) = report.end_to_end {
                    self.metrics.record_end_to_end(end_to_end);
                }
                info!(
                    speech_ms = report.speech_duration.map(|d| d.as_millis() as u64),
                    response_latency_ms = report.response_latency.map(|d| d.as_millis() as u64),
                    synthesis_ms = report.synthesis_duration.map(|d| d.as_millis() as u64),
                    end_to_end_ms = report.end_to_end.map(|d| d.as_millis() as u64),
                    "Synthesis completed"
                );
            }

            ServerEvent::ResponseCancelled => {
                self.turn.process(TurnEvent::SynthesisCancelled);
                self.latency.cancel_synthesis();
                debug!("Synthesis cancelled");
            }

            ServerEvent::Error { error } => {
                self.metrics.remote_errors.fetch_add(1, Ordering::Relaxed);
                let (code, message) = error
                    .map(|e| (e.code, e.message.unwrap_or_default()))
                    .unwrap_or((None, String::new()));
                let err = AppError::RemoteService { code, message };
                // Remote errors do not terminate the connector; the remote
                // either recovers or closes the socket itself.
                warn!("{}", err);
            }

            ServerEvent::Unknown => {
                debug!("Ignoring unrecognized translation event");
            }
        }

        SessionFlow::Continue
    }

    /// Relay one synthesized audio chunk: decode, split into wire-sized
    /// frames, and queue them for the telephony writer in order.
    async fn relay_audio(&mut self, delta: String) -> SessionFlow {
        let Some(stream_sid) = self.stream_sid.clone() else {
            debug!("Dropping synthesized audio before stream start");
            return SessionFlow::Continue;
        };

        if let Some(started) = self.latency.mark_synthesis_audio() {
            match started.response_latency {
                Some(latency) => {
                    info!(
                        "Synthesis began {}ms after caller speech end",
                        latency.as_millis()
                    );
                    self.metrics.record_response_latency(latency);
                }
                None => info!("Synthesis began"),
            }
        }

        let bytes = match BASE64.decode(delta.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                self.metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                let err = AppError::from(ProtocolDecodeError::Payload(e.to_string()));
                warn!("Discarding synthesized chunk: {}", err);
                return SessionFlow::Continue;
            }
        };
        self.metrics
            .audio_chunks_relayed
            .fetch_add(1, Ordering::Relaxed);

        for frame in self.chunker.frames(&bytes) {
            let msg = OutboundMessage::media(stream_sid.clone(), BASE64.encode(frame));
            if self.telephony_tx.send(msg).await.is_err() {
                let err = AppError::from(TransportError::WriteFailed {
                    side: SocketSide::Telephony,
                    reason: "writer task gone".into(),
                });
                warn!("{}", err);
                self.close();
                return SessionFlow::Stop;
            }
            self.metrics.increment_telephony_out();
        }

        SessionFlow::Continue
    }

    /// Idempotent teardown: close the connector first, then mark the
    /// session terminal. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        if let Some(handle) = self.connector.take() {
            handle.close();
        }
        self.closed = true;
        info!(
            stream_sid = self.stream_sid.as_deref().unwrap_or("-"),
            call_sid = self.call_sid.as_deref().unwrap_or("-"),
            "Session closed"
        );
    }
}

/// Drive one accepted telephony connection to completion.
pub async fn run_session(
    socket: WebSocketStream<TcpStream>,
    config: Arc<SessionConfig>,
    metrics: Arc<RelayMetrics>,
) {
    metrics.session_opened();

    let (sink, stream) = socket.split();
    let (telephony_tx, telephony_rx) = mpsc::channel::<OutboundMessage>(64);
    let writer = tokio::spawn(telephony_writer(sink, telephony_rx));

    let (inbox_tx, mut inbox_rx) = mpsc::channel::<SessionInput>(256);
    let reader = tokio::spawn(telephony_reader(stream, inbox_tx.clone(), metrics.clone()));

    let mut session = CallSession::new(config, inbox_tx, telephony_tx, metrics.clone());
    while let Some(input) = inbox_rx.recv().await {
        if session.handle(input).await == SessionFlow::Stop {
            break;
        }
    }
    session.close();
    drop(session);

    // The writer drains its queue and sends a close frame once the session
    // (the last sender) is gone; the reader ends with its socket.
    reader.abort();
    let _ = reader.await;
    let _ = writer.await;

    metrics.session_closed();
}

/// Decodes inbound telephony frames into the session inbox. Malformed
/// frames are logged and discarded; the stream continues.
async fn telephony_reader(
    mut stream: SplitStream<WebSocketStream<TcpStream>>,
    inbox: mpsc::Sender<SessionInput>,
    metrics: Arc<RelayMetrics>,
) {
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Text(text)) => match telephony::decode_message(text.as_str()) {
                Ok(msg) => {
                    if inbox.send(SessionInput::Telephony(msg)).await.is_err() {
                        return;
                    }
                }
                Err(e) => {
                    metrics.decode_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Discarding malformed telephony message: {}", e);
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Telephony socket error: {}", e);
                break;
            }
        }
    }
    let _ = inbox.send(SessionInput::TelephonyClosed).await;
}

/// Serializes all outbound writes onto the telephony socket.
async fn telephony_writer(
    mut sink: SplitSink<WebSocketStream<TcpStream>, Message>,
    mut out_rx: mpsc::Receiver<OutboundMessage>,
) {
    while let Some(msg) = out_rx.recv().await {
        match serde_json::to_string(&msg) {
            Ok(text) => {
                if sink.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            Err(e) => warn!("Failed to encode outbound telephony message: {}", e),
        }
    }
    let _ = sink.send(Message::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use voxbridge_translate::config::ConnectorConfig;
    use voxbridge_translate::connector::Command;
    use voxbridge_translate::protocol::RemoteError;
    use voxbridge_turn::SynthesisState;

    use crate::telephony::MediaPayload;

    fn test_config() -> Arc<SessionConfig> {
        Arc::new(SessionConfig {
            connector: ConnectorConfig::new(
                "realtime-translate-1".into(),
                "sk-test".into(),
                "translate".into(),
                "alloy".into(),
            ),
            connect_timeout: std::time::Duration::from_secs(1),
        })
    }

    struct Harness {
        session: CallSession,
        telephony_rx: mpsc::Receiver<OutboundMessage>,
        cmd_rx: mpsc::Receiver<Command>,
        metrics: Arc<RelayMetrics>,
    }

    /// Session with identifiers assigned and a connector attached, without
    /// touching any real socket.
    fn started_session() -> Harness {
        let metrics = Arc::new(RelayMetrics::default());
        let (inbox_tx, _inbox_rx) = mpsc::channel(16);
        let (telephony_tx, telephony_rx) = mpsc::channel(64);
        let (cmd_tx, cmd_rx) = mpsc::channel(16);

        let mut session =
            CallSession::new(test_config(), inbox_tx, telephony_tx, metrics.clone());
        session.stream_sid = Some("S1".into());
        session.call_sid = Some("C1".into());
        session.connector = Some(ConnectorHandle::new(cmd_tx));

        Harness {
            session,
            telephony_rx,
            cmd_rx,
            metrics,
        }
    }

    fn decoded_len(msg: &OutboundMessage) -> usize {
        let OutboundMessage::Media { media, .. } = msg;
        BASE64.decode(media.payload.as_bytes()).unwrap().len()
    }

    #[tokio::test]
    async fn media_without_connector_is_dropped_silently() {
        let metrics = Arc::new(RelayMetrics::default());
        let (inbox_tx, _inbox_rx) = mpsc::channel(16);
        let (telephony_tx, mut telephony_rx) = mpsc::channel(16);
        let mut session =
            CallSession::new(test_config(), inbox_tx, telephony_tx, metrics.clone());

        let flow = session
            .handle(SessionInput::Telephony(TelephonyMessage::Media {
                media: MediaPayload {
                    payload: "AAECAw==".into(),
                },
            }))
            .await;

        assert_eq!(flow, SessionFlow::Continue);
        assert!(telephony_rx.try_recv().is_err());
        assert_eq!(
            metrics.audio_payloads_dropped.load(Ordering::Relaxed),
            1
        );
    }

    #[tokio::test]
    async fn media_is_forwarded_to_the_connector() {
        let mut h = started_session();

        h.session
            .handle(SessionInput::Telephony(TelephonyMessage::Media {
                media: MediaPayload {
                    payload: "AAECAw==".into(),
                },
            }))
            .await;

        assert_eq!(
            h.cmd_rx.try_recv().unwrap(),
            Command::Audio("AAECAw==".into())
        );
    }

    #[tokio::test]
    async fn synthesized_audio_is_chunked_and_tagged_with_the_stream_sid() {
        let mut h = started_session();

        h.session
            .handle(SessionInput::Translation(ServerEvent::ResponseCreated))
            .await;
        let delta = BASE64.encode(vec![0x7Fu8; 350]);
        let flow = h
            .session
            .handle(SessionInput::Translation(ServerEvent::ResponseAudioDelta {
                delta: Some(delta),
            }))
            .await;
        assert_eq!(flow, SessionFlow::Continue);

        let mut lengths = Vec::new();
        while let Ok(msg) = h.telephony_rx.try_recv() {
            let OutboundMessage::Media { stream_sid, .. } = &msg;
            assert_eq!(stream_sid, "S1");
            lengths.push(decoded_len(&msg));
        }
        assert_eq!(lengths, vec![160, 160, 30]);
        assert_eq!(h.metrics.telephony_frames_out.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn frames_reassemble_to_the_original_chunk() {
        let mut h = started_session();
        let original: Vec<u8> = (0..=255u8).cycle().take(420).collect();

        h.session
            .handle(SessionInput::Translation(ServerEvent::ResponseAudioDelta {
                delta: Some(BASE64.encode(&original)),
            }))
            .await;

        let mut rejoined = Vec::new();
        while let Ok(msg) = h.telephony_rx.try_recv() {
            let OutboundMessage::Media { media, .. } = msg;
            rejoined.extend(BASE64.decode(media.payload.as_bytes()).unwrap());
        }
        assert_eq!(rejoined, original);
    }

    #[tokio::test]
    async fn barge_in_cancels_exactly_once_and_goes_idle() {
        let mut h = started_session();

        h.session
            .handle(SessionInput::Translation(ServerEvent::ResponseCreated))
            .await;
        h.session
            .handle(SessionInput::Translation(ServerEvent::SpeechStarted))
            .await;

        assert_eq!(h.cmd_rx.try_recv().unwrap(), Command::Cancel);
        assert!(h.cmd_rx.try_recv().is_err());
        // Idle immediately, without waiting for the cancelled ack.
        assert_eq!(h.session.turn.state(), SynthesisState::Idle);

        // A second speech start in the same lull cancels nothing.
        h.session
            .handle(SessionInput::Translation(ServerEvent::SpeechStarted))
            .await;
        assert!(h.cmd_rx.try_recv().is_err());
        assert_eq!(h.metrics.cancellations.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn speech_while_idle_sends_no_cancellation() {
        let mut h = started_session();

        h.session
            .handle(SessionInput::Translation(ServerEvent::SpeechStarted))
            .await;

        assert!(h.cmd_rx.try_recv().is_err());
        assert_eq!(h.metrics.cancellations.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn remote_error_keeps_the_session_running() {
        let mut h = started_session();

        let flow = h
            .session
            .handle(SessionInput::Translation(ServerEvent::Error {
                error: Some(RemoteError {
                    kind: Some("server_error".into()),
                    code: None,
                    message: Some("transient".into()),
                }),
            }))
            .await;

        assert_eq!(flow, SessionFlow::Continue);
        assert_eq!(h.metrics.remote_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn invalid_synthesized_base64_is_discarded() {
        let mut h = started_session();

        let flow = h
            .session
            .handle(SessionInput::Translation(ServerEvent::ResponseAudioDelta {
                delta: Some("!!!not-base64!!!".into()),
            }))
            .await;

        assert_eq!(flow, SessionFlow::Continue);
        assert!(h.telephony_rx.try_recv().is_err());
        assert_eq!(h.metrics.decode_errors.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn stop_tears_down_idempotently() {
        let mut h = started_session();

        let flow = h
            .session
            .handle(SessionInput::Telephony(TelephonyMessage::Stop))
            .await;
        assert_eq!(flow, SessionFlow::Stop);
        assert_eq!(h.cmd_rx.try_recv().unwrap(), Command::Close);

        // Second stop and a late socket-close produce no further actions.
        let flow = h
            .session
            .handle(SessionInput::Telephony(TelephonyMessage::Stop))
            .await;
        assert_eq!(flow, SessionFlow::Stop);
        let flow = h.session.handle(SessionInput::TelephonyClosed).await;
        assert_eq!(flow, SessionFlow::Stop);
        assert!(h.cmd_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn translation_socket_loss_stops_the_session() {
        let mut h = started_session();

        let flow = h.session.handle(SessionInput::TranslationClosed).await;
        assert_eq!(flow, SessionFlow::Stop);
        // Connector handle was already dropped by close().
        assert!(h.session.connector.is_none());
    }
}
