//! Gateway WebSocket client
//!
//! Keeps the `ws://{gateway}/ws` connection open, hands every text frame
//! pushed by the gateway to the coordinator and writes command frames queued
//! through [`GatewaySender`].

use crate::{BridgeError, GatewayTransport, Result};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{
    connect_async, tungstenite::protocol::Message as WsMessage, MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, error, info, warn};

/// Gateway WebSocket configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayClientConfig {
    /// Full WebSocket URL, e.g. `ws://127.0.0.1:8080/ws`
    pub url: String,
    /// How long the initial connection may take
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Auto-reconnect after the connection drops
    #[serde(default = "default_true")]
    pub auto_reconnect: bool,
    /// Pause between reconnection attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Capacity of the inbound frame and outbound command queues
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_capacity() -> usize {
    100
}

impl Default for GatewayClientConfig {
    fn default() -> Self {
        Self {
            url: format!("ws://127.0.0.1:8080{}", evok_core::WS_PATH),
            connect_timeout_secs: default_connect_timeout(),
            auto_reconnect: true,
            reconnect_delay_secs: default_reconnect_delay(),
            channel_capacity: default_capacity(),
        }
    }
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A frame waiting to be written, with the channel its outcome is reported on
struct Outbound {
    frame: String,
    done: oneshot::Sender<Result<()>>,
}

enum Control {
    Send(Outbound),
    Close,
}

/// Writing half of the gateway connection
#[derive(Clone)]
pub struct GatewaySender {
    tx: mpsc::Sender<Control>,
    connected: Arc<Mutex<bool>>,
}

impl GatewaySender {
    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    /// Send a close frame and stop reconnecting
    pub async fn close(&self) {
        let _ = self.tx.send(Control::Close).await;
    }
}

#[async_trait]
impl GatewayTransport for GatewaySender {
    async fn send_text(&self, frame: String) -> Result<()> {
        let (done, outcome) = oneshot::channel();
        self.tx
            .send(Control::Send(Outbound { frame, done }))
            .await
            .map_err(|_| BridgeError::Closed("gateway connection"))?;
        outcome
            .await
            .map_err(|_| BridgeError::Closed("gateway connection"))?
    }
}

/// A live gateway connection
pub struct GatewayConnection {
    pub sender: GatewaySender,
    pub frames: mpsc::Receiver<String>,
    pub task: JoinHandle<()>,
}

/// Open the gateway WebSocket. Failing to connect here is an error; drops
/// after this point are retried in the background when `auto_reconnect` is
/// set.
pub async fn connect(config: GatewayClientConfig) -> Result<GatewayConnection> {
    let stream = open(&config.url, Duration::from_secs(config.connect_timeout_secs)).await?;
    info!("Connected to EVOK on {}", config.url);

    let capacity = config.channel_capacity.max(1);
    let (frame_tx, frame_rx) = mpsc::channel(capacity);
    let (control_tx, control_rx) = mpsc::channel(capacity);
    let connected = Arc::new(Mutex::new(true));

    let task = tokio::spawn(run_client(
        config,
        stream,
        frame_tx,
        control_rx,
        connected.clone(),
    ));

    Ok(GatewayConnection {
        sender: GatewaySender {
            tx: control_tx,
            connected,
        },
        frames: frame_rx,
        task,
    })
}

async fn open(url: &str, timeout: Duration) -> Result<WsStream> {
    match tokio::time::timeout(timeout, connect_async(url)).await {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => Err(BridgeError::ConnectionFailed(format!("{}: {}", url, e))),
        Err(_) => Err(BridgeError::ConnectionFailed(format!(
            "{}: no handshake within {:?}",
            url, timeout
        ))),
    }
}

enum SessionEnd {
    Closed,
    Dropped,
}

async fn run_client(
    config: GatewayClientConfig,
    stream: WsStream,
    frame_tx: mpsc::Sender<String>,
    mut control_rx: mpsc::Receiver<Control>,
    connected: Arc<Mutex<bool>>,
) {
    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);
    let mut stream = Some(stream);

    loop {
        if let Some(ws) = stream.take() {
            *connected.lock() = true;
            let end = run_session(ws, &frame_tx, &mut control_rx).await;
            *connected.lock() = false;
            match end {
                SessionEnd::Closed => return,
                SessionEnd::Dropped => warn!("Disconnected from EVOK server"),
            }
        }

        if !config.auto_reconnect {
            reject_until_closed(&mut control_rx).await;
            return;
        }

        info!("Reconnecting to EVOK in {:?}...", reconnect_delay);
        let wait = tokio::time::sleep(reconnect_delay);
        tokio::pin!(wait);
        loop {
            tokio::select! {
                _ = &mut wait => break,
                control = control_rx.recv() => match control {
                    Some(Control::Send(out)) => reject(out),
                    Some(Control::Close) | None => return,
                },
            }
        }

        match open(&config.url, connect_timeout).await {
            Ok(ws) => {
                info!("Reconnected to EVOK on {}", config.url);
                stream = Some(ws);
            }
            Err(e) => error!("Received connect error {}", e),
        }
    }
}

async fn run_session(
    ws: WsStream,
    frame_tx: &mpsc::Sender<String>,
    control_rx: &mut mpsc::Receiver<Control>,
) -> SessionEnd {
    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            msg = read.next() => match msg {
                Some(Ok(WsMessage::Text(text))) => {
                    debug!("EVOK frame: {}", text);
                    forward(frame_tx, text);
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    debug!("EVOK closed the connection: {:?}", frame);
                    return SessionEnd::Dropped;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    error!("WebSocket error: {}", e);
                    return SessionEnd::Dropped;
                }
                None => return SessionEnd::Dropped,
            },
            control = control_rx.recv() => match control {
                Some(Control::Send(Outbound { frame, done })) => {
                    let result = write
                        .send(WsMessage::Text(frame))
                        .await
                        .map_err(|e| BridgeError::Send(format!("WebSocket send failed: {}", e)));
                    let failed = result.is_err();
                    let _ = done.send(result);
                    if failed {
                        return SessionEnd::Dropped;
                    }
                }
                Some(Control::Close) | None => {
                    info!("Closing EVOK connection");
                    let _ = write.close().await;
                    return SessionEnd::Closed;
                }
            },
        }
    }
}

/// Hand a frame to the router without waiting; a full queue drops it and the
/// next poll republishes the current state.
fn forward(frame_tx: &mpsc::Sender<String>, text: String) {
    match frame_tx.try_send(text) {
        Ok(()) => {}
        Err(TrySendError::Full(text)) => {
            warn!("Frame queue full, dropping EVOK frame: {}", text)
        }
        Err(TrySendError::Closed(_)) => debug!("Frame router gone, dropping EVOK frame"),
    }
}

fn reject(out: Outbound) {
    let _ = out
        .done
        .send(Err(BridgeError::NotConnected("gateway".to_string())));
}

async fn reject_until_closed(control_rx: &mut mpsc::Receiver<Control>) {
    while let Some(control) = control_rx.recv().await {
        match control {
            Control::Send(out) => reject(out),
            Control::Close => return,
        }
    }
}
