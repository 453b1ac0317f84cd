//! WebSocket client for Deepgram's real-time transcription API.
//!
//! One [`DeepgramSocket`] owns one WebSocket connection. Audio flows out as
//! binary frames through an unbounded channel, so sends never block the
//! caller; a single event loop handles outgoing frames, incoming messages,
//! transport pings, and shutdown signalling.
//!
//! Incoming text frames are delivered to the raw-message handler first (exact
//! bytes), then decoded into [`TranscriptMessage`] events. Decode failures are
//! reported through the error handler and leave the connection open.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use std::time::{Duration, Instant};

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::sync::{Notify, mpsc};
use tokio::time::timeout;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::Message,
    tungstenite::protocol::frame::CloseFrame,
    tungstenite::protocol::frame::coding::CloseCode,
};
use tracing::{debug, error, info, warn};

use super::messages::{ControlMessage, TranscriptMessage, TranscriptResponse};
use super::options::AudioStreamOptions;
use crate::error::{DeepgramError, DeepgramResult};

/// Handshake deadline for a single connection attempt.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport-level ping cadence, distinct from the application KeepAlive.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Close code reported when the connection ends without a close frame.
const ABNORMAL_CLOSE: u16 = 1006;

type EventFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Handler invoked once the WebSocket handshake completes.
pub type OpenHandler = Arc<dyn Fn() -> EventFuture + Send + Sync>;
/// Handler receiving every inbound text frame verbatim, before decoding.
pub type RawMessageHandler = Arc<dyn Fn(String) -> EventFuture + Send + Sync>;
/// Handler receiving decoded transcript events.
pub type TranscriptHandler = Arc<dyn Fn(TranscriptMessage) -> EventFuture + Send + Sync>;
/// Handler receiving transport and decode error descriptions.
pub type ErrorHandler = Arc<dyn Fn(String) -> EventFuture + Send + Sync>;
/// Handler receiving the close code when the connection ends.
pub type CloseHandler = Arc<dyn Fn(u16) -> EventFuture + Send + Sync>;

/// Optional event handlers; each slot is replace-not-append.
#[derive(Default)]
struct EventHandlers {
    on_open: RwLock<Option<OpenHandler>>,
    on_raw_message: RwLock<Option<RawMessageHandler>>,
    on_transcript: RwLock<Option<TranscriptHandler>>,
    on_error: RwLock<Option<ErrorHandler>>,
    on_close: RwLock<Option<CloseHandler>>,
}

fn load<T: Clone>(slot: &RwLock<Option<T>>) -> Option<T> {
    slot.read().map(|guard| guard.clone()).unwrap_or(None)
}

fn store<T>(slot: &RwLock<Option<T>>, handler: T) {
    if let Ok(mut guard) = slot.write() {
        *guard = Some(handler);
    }
}

impl EventHandlers {
    async fn emit_open(&self) {
        if let Some(handler) = load(&self.on_open) {
            handler().await;
        }
    }

    async fn emit_raw_message(&self, text: &str) {
        if let Some(handler) = load(&self.on_raw_message) {
            handler(text.to_string()).await;
        }
    }

    async fn emit_transcript(&self, message: TranscriptMessage) {
        if let Some(handler) = load(&self.on_transcript) {
            handler(message).await;
        }
    }

    async fn emit_error(&self, description: String) {
        if let Some(handler) = load(&self.on_error) {
            handler(description).await;
        }
    }

    async fn emit_close(&self, code: u16) {
        if let Some(handler) = load(&self.on_close) {
            handler(code).await;
        }
    }
}

/// One bidirectional transcription session over a WebSocket.
///
/// The socket is created disconnected; [`connect`](Self::connect) opens it
/// and [`disconnect`](Self::disconnect) ends it for good. Only one connect
/// attempt is meaningful per socket.
pub struct DeepgramSocket {
    url: String,
    api_key: String,
    handlers: Arc<EventHandlers>,
    connected: Arc<AtomicBool>,
    connect_started: AtomicBool,
    outbound: OnceLock<mpsc::UnboundedSender<Message>>,
    shutdown: Arc<Notify>,
    start_time: OnceLock<Instant>,
}

impl DeepgramSocket {
    /// Create a disconnected socket for the given endpoint and credential.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> DeepgramResult<Self> {
        let url = url.into();
        let api_key = api_key.into();
        if url.trim().is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "URL cannot be empty".to_string(),
            ));
        }
        if api_key.trim().is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "API key cannot be empty".to_string(),
            ));
        }

        Ok(Self {
            url,
            api_key,
            handlers: Arc::new(EventHandlers::default()),
            connected: Arc::new(AtomicBool::new(false)),
            connect_started: AtomicBool::new(false),
            outbound: OnceLock::new(),
            shutdown: Arc::new(Notify::new()),
            start_time: OnceLock::new(),
        })
    }

    /// Append the serialized stream options to the connect URL.
    ///
    /// Must be called before [`connect`](Self::connect).
    pub fn set_options(&mut self, options: &AudioStreamOptions) {
        self.url = options.append_to_url(&self.url);
    }

    /// The URL this socket will connect (or has connected) to.
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_on_open(&self, handler: OpenHandler) {
        store(&self.handlers.on_open, handler);
    }

    pub fn set_on_raw_message(&self, handler: RawMessageHandler) {
        store(&self.handlers.on_raw_message, handler);
    }

    pub fn set_on_transcript(&self, handler: TranscriptHandler) {
        store(&self.handlers.on_transcript, handler);
    }

    pub fn set_on_error(&self, handler: ErrorHandler) {
        store(&self.handlers.on_error, handler);
    }

    pub fn set_on_close(&self, handler: CloseHandler) {
        store(&self.handlers.on_close, handler);
    }

    /// Open the WebSocket connection.
    ///
    /// The `Authorization: Token <key>` header is attached to the handshake.
    /// `on_open` fires before this method returns, and no inbound frame is
    /// delivered before it. The event loop then runs until the server closes,
    /// the transport fails, or [`disconnect`](Self::disconnect) is called.
    pub async fn connect(&self) -> DeepgramResult<()> {
        if self.connect_started.swap(true, Ordering::SeqCst) {
            return Err(DeepgramError::IllegalState(
                "Socket already connected or closed; create a new one".to_string(),
            ));
        }

        let _ = self.start_time.set(Instant::now());

        let request = tokio_tungstenite::tungstenite::http::Request::builder()
            .uri(&self.url)
            .header("Authorization", format!("Token {}", self.api_key))
            .body(())
            .map_err(|e| {
                DeepgramError::InvalidArgument(format!("Invalid WebSocket URL: {e}"))
            })?;

        let (ws_stream, _) = match timeout(CONNECT_TIMEOUT, connect_async(request)).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => {
                return Err(DeepgramError::ConnectionFailed(format!(
                    "Failed to connect to Deepgram: {e}"
                )));
            }
            Err(_) => {
                return Err(DeepgramError::ConnectionFailed(
                    "Connection timeout".to_string(),
                ));
            }
        };

        debug!(url = %self.url, "Connected to Deepgram WebSocket API");
        self.connected.store(true, Ordering::SeqCst);
        self.handlers.emit_open().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel::<Message>();
        let _ = self.outbound.set(outbound_tx);

        let handlers = self.handlers.clone();
        let connected = self.connected.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            run_event_loop(ws_stream, outbound_rx, handlers, connected, shutdown).await;
        });

        Ok(())
    }

    /// Whether the open/close lifecycle has last crossed into the open state.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// When the last connect attempt started, for latency bookkeeping.
    pub fn start_time(&self) -> Option<Instant> {
        self.start_time.get().copied()
    }

    /// Enqueue a binary audio frame. Never blocks.
    pub fn send_audio(&self, audio_data: Vec<u8>) -> DeepgramResult<()> {
        if !self.is_connected() {
            return Err(DeepgramError::IllegalState(
                "Not connected to Deepgram".to_string(),
            ));
        }
        if audio_data.is_empty() {
            return Err(DeepgramError::InvalidArgument(
                "Audio data cannot be empty".to_string(),
            ));
        }
        self.enqueue(Message::Binary(Bytes::from(audio_data)))
    }

    /// Serialize a control message and enqueue it as a text frame.
    pub fn send_control(&self, message: &ControlMessage) -> DeepgramResult<()> {
        if !self.is_connected() {
            return Err(DeepgramError::IllegalState(
                "Not connected to Deepgram".to_string(),
            ));
        }
        let json = serde_json::to_string(message).map_err(|e| {
            DeepgramError::InvalidArgument(format!("Failed to serialize control message: {e}"))
        })?;
        self.enqueue(Message::Text(json.into()))
    }

    fn enqueue(&self, frame: Message) -> DeepgramResult<()> {
        let sender = self.outbound.get().ok_or_else(|| {
            DeepgramError::IllegalState("Not connected to Deepgram".to_string())
        })?;
        sender.send(frame).map_err(|_| {
            DeepgramError::NetworkError("Connection task has stopped".to_string())
        })
    }

    /// Close the connection. Idempotent; `on_close` fires exactly once, from
    /// the event loop, with code 1000 for a locally initiated close.
    pub fn disconnect(&self) {
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("Disconnecting from Deepgram WebSocket API");
        }
        self.shutdown.notify_one();
    }
}

impl Drop for DeepgramSocket {
    fn drop(&mut self) {
        self.shutdown.notify_one();
    }
}

async fn run_event_loop(
    ws_stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
    handlers: Arc<EventHandlers>,
    connected: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
) {
    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    let mut ping_timer = tokio::time::interval_at(
        tokio::time::Instant::now() + PING_INTERVAL,
        PING_INTERVAL,
    );
    let mut close_code: u16 = ABNORMAL_CLOSE;

    loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(frame) => {
                        if let Err(e) = ws_sink.send(frame).await {
                            error!("Failed to send WebSocket frame: {e}");
                            handlers
                                .emit_error(format!("Failed to send WebSocket frame: {e}"))
                                .await;
                            break;
                        }
                    }
                    None => {
                        // The socket was dropped; close the stream politely.
                        let _ = ws_sink
                            .send(Message::Close(Some(CloseFrame {
                                code: CloseCode::Normal,
                                reason: "".into(),
                            })))
                            .await;
                        close_code = 1000;
                        break;
                    }
                }
            }

            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        handle_text_frame(&handlers, text.as_str()).await;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        close_code = frame
                            .as_ref()
                            .map(|f| u16::from(f.code))
                            .unwrap_or(ABNORMAL_CLOSE);
                        debug!("Server closed connection with code {close_code}");
                        break;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        warn!("Unexpected binary message of {} bytes", data.len());
                    }
                    Some(Ok(_)) => {
                        // Ping/pong frames are answered by the transport.
                    }
                    Some(Err(e)) => {
                        error!("WebSocket error: {e}");
                        handlers.emit_error(e.to_string()).await;
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }

            _ = shutdown.notified() => {
                let _ = ws_sink
                    .send(Message::Close(Some(CloseFrame {
                        code: CloseCode::Normal,
                        reason: "".into(),
                    })))
                    .await;
                close_code = 1000;
                break;
            }

            _ = ping_timer.tick() => {
                if let Err(e) = ws_sink.send(Message::Ping(Bytes::new())).await {
                    error!("Failed to send ping: {e}");
                    handlers.emit_error(format!("Failed to send ping: {e}")).await;
                    break;
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    handlers.emit_close(close_code).await;
    debug!("Deepgram WebSocket connection closed");
}

async fn handle_text_frame(handlers: &EventHandlers, text: &str) {
    handlers.emit_raw_message(text).await;

    match serde_json::from_str::<TranscriptResponse>(text) {
        Ok(response) => {
            if let Some(message) = response.to_message() {
                handlers.emit_transcript(message).await;
            } else {
                debug!(response_type = %response.response_type, "Non-transcript event");
            }
        }
        Err(e) => {
            error!("Error parsing transcript response: {e}");
            handlers
                .emit_error(format!("Error parsing transcript response: {e}"))
                .await;
        }
    }
}
