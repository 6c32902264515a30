//! Test fakes and helpers for the EVOK bridge
//!
//! - In-memory collaborators ([`RecordingPublisher`], [`RecordingTransport`],
//!   [`StaticSnapshot`]) for driving the coordinator without a network
//! - [`MockGateway`], a loopback WebSocket server standing in for EVOK
//! - Condition-based waiting (no hardcoded sleeps)
//! - [`LogCapture`] for asserting on emitted diagnostics

use async_trait::async_trait;
use bytes::Bytes;
use evok_bridge::{BridgeError, BrokerPublisher, GatewayTransport, Result, SnapshotSource};
use evok_core::Publication;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message as WsMessage};

/// Default test timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default condition check interval
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// Condition-Based Waiting
// ============================================================================

/// Wait for a condition with timeout
pub async fn wait_for<F, Fut>(check: F, interval: Duration, max_wait: Duration) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = Instant::now();
    while start.elapsed() < max_wait {
        if check().await {
            return true;
        }
        tokio::time::sleep(interval).await;
    }
    false
}

/// Wait until a synchronous predicate holds
pub async fn wait_until<F>(check: F, max_wait: Duration) -> bool
where
    F: Fn() -> bool,
{
    wait_for(|| std::future::ready(check()), DEFAULT_CHECK_INTERVAL, max_wait).await
}

/// Find an available TCP port for testing
pub async fn find_available_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

// ============================================================================
// Broker fake
// ============================================================================

/// Records every publication; can be told to reject or stall on topics
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<Publication>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    stalled: Mutex<HashSet<String>>,
}

impl RecordingPublisher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Publishes to `topic` fail with a publish error
    pub fn fail_on(&self, topic: &str) {
        self.failing.lock().insert(topic.to_string());
    }

    /// Publishes to `topic` never complete
    pub fn stall_on(&self, topic: &str) {
        self.stalled.lock().insert(topic.to_string());
    }

    /// Every publish takes this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn published(&self) -> Vec<Publication> {
        self.published.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.published.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.lock().is_empty()
    }

    /// `(topic, payload)` pairs in publish order
    pub fn pairs(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .iter()
            .map(|p| (p.topic.clone(), p.payload.clone()))
            .collect()
    }
}

#[async_trait]
impl BrokerPublisher for RecordingPublisher {
    async fn publish(&self, publication: Publication) -> Result<()> {
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let stalled = self.stalled.lock().contains(&publication.topic);
        if stalled {
            futures::future::pending::<()>().await;
        }
        let failing = self.failing.lock().contains(&publication.topic);
        if failing {
            return Err(BridgeError::Publish(format!(
                "rejected {}",
                publication.topic
            )));
        }
        self.published.lock().push(publication);
        Ok(())
    }
}

// ============================================================================
// Gateway fakes
// ============================================================================

/// Records every frame written to the gateway
#[derive(Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<String>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }
}

#[async_trait]
impl GatewayTransport for RecordingTransport {
    async fn send_text(&self, frame: String) -> Result<()> {
        self.frames.lock().push(frame);
        Ok(())
    }
}

/// Serves queued snapshot responses, repeating the last one
pub struct StaticSnapshot {
    responses: Mutex<VecDeque<std::result::Result<String, String>>>,
    last: Mutex<std::result::Result<String, String>>,
    fetches: AtomicU32,
}

impl StaticSnapshot {
    /// Always return `body`
    pub fn new(body: &str) -> Arc<Self> {
        Self::sequence(vec![Ok(body.to_string())])
    }

    /// Return each response once, in order; `Err` entries fail the fetch
    pub fn sequence(responses: Vec<std::result::Result<String, String>>) -> Arc<Self> {
        let last = responses
            .last()
            .cloned()
            .unwrap_or_else(|| Ok("[]".to_string()));
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(last),
            fetches: AtomicU32::new(0),
        })
    }

    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SnapshotSource for StaticSnapshot {
    async fn fetch(&self) -> Result<Bytes> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let next = self.responses.lock().pop_front();
        let response = next.unwrap_or_else(|| self.last.lock().clone());
        response
            .map(Bytes::from)
            .map_err(BridgeError::Fetch)
    }
}

// ============================================================================
// Mock gateway - loopback WebSocket server
// ============================================================================

/// Stand-in for the EVOK WebSocket endpoint. Records text frames it receives
/// and broadcasts pushed frames to every connected client.
pub struct MockGateway {
    port: u16,
    received: Arc<Mutex<Vec<String>>>,
    connections: Arc<AtomicU32>,
    push_tx: broadcast::Sender<String>,
    kick_tx: broadcast::Sender<()>,
    handle: JoinHandle<()>,
}

impl MockGateway {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let received = Arc::new(Mutex::new(Vec::new()));
        let connections = Arc::new(AtomicU32::new(0));
        let (push_tx, _) = broadcast::channel(64);
        let (kick_tx, _) = broadcast::channel(4);

        let handle = tokio::spawn({
            let received = received.clone();
            let connections = connections.clone();
            let push_tx = push_tx.clone();
            let kick_tx = kick_tx.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let received = received.clone();
                    let connections = connections.clone();
                    let mut push_rx = push_tx.subscribe();
                    let mut kick_rx = kick_tx.subscribe();

                    tokio::spawn(async move {
                        let Ok(ws) = accept_async(stream).await else {
                            return;
                        };
                        connections.fetch_add(1, Ordering::SeqCst);
                        let (mut write, mut read) = ws.split();

                        loop {
                            tokio::select! {
                                msg = read.next() => match msg {
                                    Some(Ok(WsMessage::Text(text))) => received.lock().push(text),
                                    Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                                    Some(Ok(_)) => {}
                                },
                                frame = push_rx.recv() => match frame {
                                    Ok(frame) => {
                                        if write.send(WsMessage::Text(frame)).await.is_err() {
                                            break;
                                        }
                                    }
                                    Err(_) => break,
                                },
                                _ = kick_rx.recv() => {
                                    let _ = write.close().await;
                                    break;
                                }
                            }
                        }

                        connections.fetch_sub(1, Ordering::SeqCst);
                    });
                }
            }
        });

        Self {
            port,
            received,
            connections,
            push_tx,
            kick_tx,
            handle,
        }
    }

    /// WebSocket URL of the mock
    pub fn url(&self) -> String {
        format!("ws://127.0.0.1:{}{}", self.port, evok_core::WS_PATH)
    }

    /// Push a frame to every connected client
    pub fn push(&self, frame: &str) {
        let _ = self.push_tx.send(frame.to_string());
    }

    /// Close every open connection from the server side
    pub fn kick(&self) {
        let _ = self.kick_tx.send(());
    }

    /// Frames received from clients, in arrival order
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    pub fn connections(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Drop for MockGateway {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

// ============================================================================
// Log capture
// ============================================================================

/// Collects formatted log lines emitted on the current thread
///
/// The subscriber is installed with `set_default`, so only code running on
/// the test's thread is captured. `#[tokio::test]` uses a current-thread
/// runtime, which keeps spawned tasks in view.
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    /// Start capturing; logs stop being collected when the guard drops
    pub fn start() -> (Self, tracing::subscriber::DefaultGuard) {
        let capture = Self::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(capture.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .without_time()
            .finish();
        let guard = tracing::subscriber::set_default(subscriber);
        (capture, guard)
    }

    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock())
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Number of lines at `level` (e.g. `"WARN"`) containing `needle`
    pub fn count(&self, level: &str, needle: &str) -> usize {
        self.lines()
            .iter()
            .filter(|line| line.contains(level) && line.contains(needle))
            .count()
    }
}

pub struct CaptureWriter {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl std::io::Write for CaptureWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogCapture {
    type Writer = CaptureWriter;

    fn make_writer(&'a self) -> Self::Writer {
        CaptureWriter {
            buffer: self.buffer.clone(),
        }
    }
}
