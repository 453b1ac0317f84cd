//! In-process WebSocket server standing in for the Deepgram endpoint.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::frame::CloseFrame;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::Message;

#[derive(Default)]
struct ServerState {
    connections: AtomicUsize,
    saw_token_auth: AtomicBool,
    text_frames: Mutex<Vec<String>>,
    binary_frames: AtomicUsize,
    clients: Mutex<Vec<mpsc::UnboundedSender<Message>>>,
}

/// Mock transcription server. Accepts any number of WebSocket clients,
/// records what they send, and can push frames back at them.
pub struct MockDeepgramServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    accept_task: JoinHandle<()>,
}

impl MockDeepgramServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = Arc::new(ServerState::default());

        let accept_state = state.clone();
        let accept_task = tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else {
                    break;
                };
                let state = accept_state.clone();
                tokio::spawn(async move {
                    serve_client(stream, state).await;
                });
            }
        });

        Self {
            addr,
            state,
            accept_task,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }

    /// Whether every handshake so far carried an `Authorization: Token …`
    /// header.
    pub fn saw_token_auth(&self) -> bool {
        self.state.saw_token_auth.load(Ordering::SeqCst)
    }

    pub fn text_frames(&self) -> Vec<String> {
        self.state.text_frames.lock().unwrap().clone()
    }

    pub fn keep_alive_count(&self) -> usize {
        self.text_frames()
            .iter()
            .filter(|frame| frame.contains("\"KeepAlive\""))
            .count()
    }

    pub fn binary_frame_count(&self) -> usize {
        self.state.binary_frames.load(Ordering::SeqCst)
    }

    /// Push a text frame to every connected client.
    pub fn send_text_to_all(&self, text: &str) {
        let clients = self.state.clients.lock().unwrap();
        for client in clients.iter() {
            let _ = client.send(Message::Text(text.to_string().into()));
        }
    }

    /// Close every client connection with the given code.
    pub fn close_all(&self, code: u16) {
        let clients = self.state.clients.lock().unwrap();
        for client in clients.iter() {
            let _ = client.send(Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: "".into(),
            })));
        }
    }

    pub async fn wait_for_connections(&self, count: usize) {
        wait_until(|| self.connection_count() >= count, "connections").await;
    }

    pub async fn wait_for_binary_frames(&self, count: usize) {
        wait_until(|| self.binary_frame_count() >= count, "binary frames").await;
    }

    pub async fn wait_for_keep_alives(&self, count: usize) {
        wait_until(|| self.keep_alive_count() >= count, "keep-alives").await;
    }
}

impl Drop for MockDeepgramServer {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn serve_client(stream: tokio::net::TcpStream, state: Arc<ServerState>) {
    let auth_state = state.clone();
    let callback = move |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let token_auth = request
            .headers()
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("Token "))
            .unwrap_or(false);
        auth_state.saw_token_auth.store(token_auth, Ordering::SeqCst);
        Ok(response)
    };

    let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
        return;
    };
    state.connections.fetch_add(1, Ordering::SeqCst);

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();
    state.clients.lock().unwrap().push(outbound_tx);

    let (mut ws_sink, mut ws_stream) = ws_stream.split();
    loop {
        tokio::select! {
            Some(frame) = outbound_rx.recv() => {
                if ws_sink.send(frame).await.is_err() {
                    break;
                }
            }
            incoming = ws_stream.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        state.text_frames.lock().unwrap().push(text.to_string());
                    }
                    Some(Ok(Message::Binary(_))) => {
                        state.binary_frames.fetch_add(1, Ordering::SeqCst);
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool, what: &str) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {what}");
}
