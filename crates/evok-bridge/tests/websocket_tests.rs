//! Gateway WebSocket Client Tests
//!
//! Runs the client against a loopback stand-in for the EVOK `/ws` endpoint:
//! - Pushed frames arrive on the frame queue
//! - Command frames reach the gateway
//! - Reconnection after the server drops the connection
//! - Sends while disconnected fail instead of blocking
//! - A backed-up frame queue never holds up command frames

use evok_bridge::websocket::{connect, GatewayClientConfig};
use evok_bridge::{
    BridgeError, Coordinator, CoordinatorConfig, GatewayTransport, Inbound, SinkConfig, Sinks,
};
use evok_core::{BrokerCommand, MappingEntry, MappingTable};
use evok_test_utils::{
    find_available_port, wait_until, MockGateway, RecordingPublisher, StaticSnapshot,
    DEFAULT_TIMEOUT,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

fn config_for(gateway: &MockGateway) -> GatewayClientConfig {
    GatewayClientConfig {
        url: gateway.url(),
        connect_timeout_secs: 2,
        reconnect_delay_secs: 1,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_pushed_frame_is_received() {
    let gateway = MockGateway::start().await;
    let mut conn = connect(config_for(&gateway)).await.unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    let frame = r#"[{"dev":"relay","circuit":"1","value":1}]"#;
    gateway.push(frame);

    let received = timeout(DEFAULT_TIMEOUT, conn.frames.recv())
        .await
        .expect("no frame within timeout");
    assert_eq!(received.as_deref(), Some(frame));

    conn.sender.close().await;
}

#[tokio::test]
async fn test_send_text_reaches_gateway() {
    let gateway = MockGateway::start().await;
    let conn = connect(config_for(&gateway)).await.unwrap();
    assert!(conn.sender.is_connected());

    let frame = r#"{"command":"set","dev":"relay","circuit":"1","value":"1"}"#;
    conn.sender.send_text(frame.to_string()).await.unwrap();
    conn.sender
        .send_text(frame.replace("\"1\"}", "\"0\"}"))
        .await
        .unwrap();

    assert!(wait_until(|| gateway.received().len() == 2, DEFAULT_TIMEOUT).await);
    let received = gateway.received();
    assert_eq!(received[0], frame);
    assert!(received[1].ends_with(r#""value":"0"}"#));

    conn.sender.close().await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let gateway = MockGateway::start().await;
    let mut conn = connect(config_for(&gateway)).await.unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    gateway.kick();
    let sender = conn.sender.clone();
    assert!(wait_until(|| !sender.is_connected(), DEFAULT_TIMEOUT).await);

    // reconnect delay is one second
    assert!(wait_until(|| sender.is_connected(), DEFAULT_TIMEOUT).await);
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    gateway.push("[]");
    let received = timeout(DEFAULT_TIMEOUT, conn.frames.recv())
        .await
        .expect("no frame after reconnect");
    assert_eq!(received.as_deref(), Some("[]"));

    conn.sender.close().await;
}

#[tokio::test]
async fn test_send_while_disconnected_fails() {
    let gateway = MockGateway::start().await;
    let conn = connect(GatewayClientConfig {
        reconnect_delay_secs: 30,
        ..config_for(&gateway)
    })
    .await
    .unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    gateway.kick();
    let sender = conn.sender.clone();
    assert!(wait_until(|| !sender.is_connected(), DEFAULT_TIMEOUT).await);

    let result = timeout(DEFAULT_TIMEOUT, sender.send_text("{}".to_string()))
        .await
        .expect("send blocked while disconnected");
    assert!(matches!(result, Err(BridgeError::NotConnected(_))));

    sender.close().await;
    timeout(DEFAULT_TIMEOUT, conn.task)
        .await
        .expect("client task did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_close_stops_client_task() {
    let gateway = MockGateway::start().await;
    let conn = connect(config_for(&gateway)).await.unwrap();

    conn.sender.close().await;
    timeout(DEFAULT_TIMEOUT, conn.task)
        .await
        .expect("client task did not stop")
        .unwrap();

    assert!(!conn.sender.is_connected());
    assert!(matches!(
        conn.sender.send_text("{}".to_string()).await,
        Err(BridgeError::Closed(_))
    ));
    assert!(wait_until(|| gateway.connections() == 0, DEFAULT_TIMEOUT).await);
}

#[tokio::test]
async fn test_connect_refused_is_fatal() {
    let port = find_available_port().await;
    let result = connect(GatewayClientConfig {
        url: format!("ws://127.0.0.1:{}/ws", port),
        connect_timeout_secs: 2,
        ..Default::default()
    })
    .await;
    assert!(matches!(result, Err(BridgeError::ConnectionFailed(_))));
}

#[tokio::test]
async fn test_no_reconnect_when_disabled() {
    let gateway = MockGateway::start().await;
    let conn = connect(GatewayClientConfig {
        auto_reconnect: false,
        ..config_for(&gateway)
    })
    .await
    .unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    gateway.kick();
    assert!(wait_until(|| !conn.sender.is_connected(), DEFAULT_TIMEOUT).await);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(gateway.connections(), 0);
    assert!(!conn.sender.is_connected());

    conn.sender.close().await;
}

#[tokio::test]
async fn test_unread_frames_do_not_block_commands() {
    let gateway = MockGateway::start().await;
    let conn = connect(GatewayClientConfig {
        channel_capacity: 2,
        ..config_for(&gateway)
    })
    .await
    .unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    // nothing reads conn.frames
    for i in 0..10 {
        gateway.push(&format!(r#"[{{"dev":"ai","circuit":"{}","value":1}}]"#, i));
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    timeout(Duration::from_secs(3), conn.sender.send_text("{}".to_string()))
        .await
        .expect("command blocked behind unread frames")
        .unwrap();
    assert!(wait_until(|| gateway.received() == vec!["{}".to_string()], DEFAULT_TIMEOUT).await);

    conn.sender.close().await;
}

#[tokio::test]
async fn test_stalled_broker_does_not_block_gateway_commands() {
    let gateway = MockGateway::start().await;
    let conn = connect(GatewayClientConfig {
        channel_capacity: 2,
        ..config_for(&gateway)
    })
    .await
    .unwrap();
    assert!(wait_until(|| gateway.connections() == 1, DEFAULT_TIMEOUT).await);

    let publisher = RecordingPublisher::new();
    publisher.stall_on("stuck");
    let (commands, broker_commands) = mpsc::channel(4);
    let (shutdown, shutdown_rx) = broadcast::channel(1);
    let coordinator = Coordinator::new(
        MappingTable::new(vec![MappingEntry::new("ai", "1", "stuck")]).unwrap(),
        CoordinatorConfig {
            poll_interval: Duration::from_secs(3600),
            sink: SinkConfig {
                capacity: 1,
                deadline: Duration::from_secs(60),
            },
        },
    );
    let run = tokio::spawn(coordinator.run(
        Sinks {
            publisher: publisher.clone(),
            transport: Arc::new(conn.sender.clone()),
            snapshot: StaticSnapshot::new("[]"),
        },
        Inbound {
            broker_commands,
            gateway_frames: conn.frames,
        },
        shutdown_rx,
    ));

    for _ in 0..10 {
        gateway.push(r#"[{"dev":"ai","circuit":"1","value":5}]"#);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    commands
        .send(BrokerCommand::new("evok/relay/1/set", "1"))
        .await
        .unwrap();
    assert!(
        wait_until(|| gateway.received().len() == 1, Duration::from_secs(3)).await,
        "command did not reach the gateway while the broker was stalled"
    );
    assert!(gateway.received()[0].contains(r#""dev":"relay""#));
    assert!(publisher.is_empty());

    // the stalled publish would hold the drain for its full deadline
    let _ = shutdown.send(());
    run.abort();
    conn.sender.close().await;
}
