//! Shared test utilities

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};

use voice_shell::{
    CaptureSettings, ChatBackend, ChatDispatcher, ChatHistory, ChatRequest, ChatResponse,
    EngineEvent, Error, ReconnectPolicy, Result, Segment, SpeechEngine, WakeConnection,
    WakeTransport, WakeWordBackend, WakeWordChannel,
};

/// Error text used for failed chat calls in tests
pub const CHAT_ERROR: &str = "Error: Unable to process request. Is the API server running?";

/// Wake notification payload
pub const WAKE: &str = r#"{"event":"wake_word","keyword":"jarvis"}"#;

/// In-memory backend recording every call
#[derive(Default)]
pub struct MockBackend {
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub fail_start: AtomicBool,
    pub fail_stop: AtomicBool,
    pub fail_chat: AtomicBool,
    /// Delay applied to every start detection call
    pub start_delay_ms: AtomicU64,
    /// Delay applied to every chat call
    pub chat_delay_ms: AtomicU64,
    requests: Mutex<Vec<ChatRequest>>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatBackend for MockBackend {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        self.requests.lock().unwrap().push(request.clone());
        let delay = self.chat_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_chat.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 500,
                body: "internal error".to_string(),
            });
        }
        Ok(ChatResponse {
            response: format!("echo: {}", request.message),
        })
    }
}

#[async_trait]
impl WakeWordBackend for MockBackend {
    async fn start_detection(&self) -> Result<()> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        let delay = self.start_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(Error::Api {
                status: 503,
                body: "detector unavailable".to_string(),
            });
        }
        Ok(())
    }

    async fn stop_detection(&self) -> Result<()> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection reset".to_string()));
        }
        Ok(())
    }
}

/// Transport whose connections are fed by the test
pub struct MockTransport {
    pub fail_connect: AtomicBool,
    connects: watch::Sender<usize>,
    closes: Arc<AtomicUsize>,
    live: Mutex<Option<mpsc::UnboundedSender<String>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            fail_connect: AtomicBool::new(false),
            connects: watch::channel(0).0,
            closes: Arc::new(AtomicUsize::new(0)),
            live: Mutex::new(None),
        })
    }

    /// Connection attempts so far, failed ones included
    pub fn connects(&self) -> usize {
        *self.connects.borrow()
    }

    /// Connections closed by the client
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Wait until at least `n` connection attempts were made
    pub async fn wait_for_connects(&self, n: usize) {
        let mut rx = self.connects.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }

    /// Push a payload into the live connection
    pub fn send(&self, payload: &str) -> bool {
        self.live
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|tx| tx.send(payload.to_string()).is_ok())
    }

    /// Simulate the server dropping the live connection
    pub fn drop_connection(&self) {
        self.live.lock().unwrap().take();
    }
}

#[async_trait]
impl WakeTransport for MockTransport {
    async fn connect(&self) -> Result<Box<dyn WakeConnection>> {
        self.connects.send_modify(|count| *count += 1);
        if self.fail_connect.load(Ordering::SeqCst) {
            return Err(Error::Transport("connection refused".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *self.live.lock().unwrap() = Some(tx);
        Ok(Box::new(MockConnection {
            rx,
            closes: Arc::clone(&self.closes),
        }))
    }
}

struct MockConnection {
    rx: mpsc::UnboundedReceiver<String>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl WakeConnection for MockConnection {
    async fn next_message(&mut self) -> Option<Result<String>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.rx.close();
    }
}

/// Speech engine driven by the test
pub struct ScriptedEngine {
    starts: watch::Sender<usize>,
    pending: Mutex<Option<mpsc::UnboundedSender<EngineEvent>>>,
}

impl ScriptedEngine {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            starts: watch::channel(0).0,
            pending: Mutex::new(None),
        })
    }

    pub fn starts(&self) -> usize {
        *self.starts.borrow()
    }

    pub async fn wait_for_starts(&self, n: usize) {
        let mut rx = self.starts.subscribe();
        rx.wait_for(|count| *count >= n).await.unwrap();
    }

    /// Finish the running capture with one final segment
    pub fn say(&self, text: &str) {
        let tx = self.pending.lock().unwrap().take().expect("no capture running");
        tx.send(EngineEvent::Results(vec![Segment::interim("...")]))
            .unwrap();
        tx.send(EngineEvent::Results(vec![Segment::final_text(text)]))
            .unwrap();
        tx.send(EngineEvent::End).unwrap();
    }

    /// End the running capture after only interim speech
    pub fn mumble(&self, text: &str) {
        let tx = self.pending.lock().unwrap().take().expect("no capture running");
        tx.send(EngineEvent::Results(vec![Segment::interim(text)]))
            .unwrap();
        tx.send(EngineEvent::End).unwrap();
    }

    /// Fail the running capture with an engine error code
    pub fn fail(&self, code: &str) {
        let tx = self.pending.lock().unwrap().take().expect("no capture running");
        tx.send(EngineEvent::Error(code.to_string())).unwrap();
        tx.send(EngineEvent::End).unwrap();
    }
}

impl SpeechEngine for ScriptedEngine {
    fn start(&self, _: &CaptureSettings) -> Result<mpsc::UnboundedReceiver<EngineEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.pending.lock().unwrap() = Some(tx);
        self.starts.send_modify(|count| *count += 1);
        Ok(rx)
    }
}

/// Wake channel over the mock backend and transport with the default policy
pub fn channel(backend: &Arc<MockBackend>, transport: &Arc<MockTransport>) -> WakeWordChannel {
    WakeWordChannel::new(
        Arc::clone(backend) as Arc<dyn WakeWordBackend>,
        Arc::clone(transport) as Arc<dyn WakeTransport>,
        ReconnectPolicy::default(),
    )
}

/// Dispatcher over the mock backend with a fresh history
pub fn dispatcher(backend: &Arc<MockBackend>) -> ChatDispatcher {
    ChatDispatcher::new(
        Arc::clone(backend) as Arc<dyn ChatBackend>,
        ChatHistory::new(),
        CHAT_ERROR,
    )
}

/// Wait until the history holds at least `n` entries
pub async fn wait_for_history(history: &ChatHistory, n: usize) {
    let mut events = history.subscribe();
    while history.len() < n {
        events.recv().await.unwrap();
    }
}

/// A canned HTTP reply
pub struct Reply {
    pub status: u16,
    pub body: String,
}

impl Reply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// Request seen by [`serve_http`]
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Serve the given replies in order, one per connection, on a local port
///
/// Returns the base URL and a receiver of the requests received.
pub async fn serve_http(replies: Vec<Reply>) -> (String, mpsc::UnboundedReceiver<SeenRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (seen_tx, seen_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };

            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            let (head_end, content_length) = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    return;
                }
                buf.extend_from_slice(&chunk[..n]);
                if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                    let head = String::from_utf8_lossy(&buf[..pos]).to_lowercase();
                    let length = head
                        .lines()
                        .find_map(|l| l.strip_prefix("content-length:"))
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .unwrap_or(0);
                    break (pos + 4, length);
                }
            };
            while buf.len() < head_end + content_length {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }

            let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
            let mut request_line = head.lines().next().unwrap_or_default().split(' ');
            let _ = seen_tx.send(SeenRequest {
                method: request_line.next().unwrap_or_default().to_string(),
                path: request_line.next().unwrap_or_default().to_string(),
                body: String::from_utf8_lossy(&buf[head_end..]).to_string(),
            });

            let response = format!(
                "HTTP/1.1 {} X\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                reply.status,
                reply.body.len(),
                reply.body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
    });

    (format!("http://{addr}"), seen_rx)
}
