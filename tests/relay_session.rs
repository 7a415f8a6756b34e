//! End-to-end relay sessions driven by a standard WebSocket client.
//!
//! tokio-tungstenite performs a real RFC 6455 handshake and masks its
//! frames, so these tests exercise the hand-rolled handshake negotiator,
//! the frame codec's masked-decode path, the registry broadcasts, and
//! the heartbeat addressing — over actual sockets.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result, bail, ensure};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use pulse_relay::config::RelayConfig;
use pulse_relay::server::RelayServer;

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Boots a relay on an ephemeral port with a fast sweep cadence.
async fn start_relay() -> Result<SocketAddr> {
    let config = RelayConfig {
        listen_addr: "127.0.0.1:0".parse()?,
        sweep_interval: Duration::from_millis(50),
        ..RelayConfig::default()
    };
    let server = RelayServer::bind(config).await?;
    let addr = server.local_addr()?;
    tokio::spawn(server.serve());
    Ok(addr)
}

/// Opens a client, sends the connect message, and waits for the roster
/// broadcast that confirms registration.
async fn connect(addr: SocketAddr, client_id: &str) -> Result<WsClient> {
    let (mut ws, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/")).await?;
    ws.send(Message::text(format!(
        r#"{{"type":1,"clientId":"{client_id}"}}"#
    )))
    .await?;
    let roster = next_json(&mut ws).await?;
    ensure!(
        roster.get("messageType").and_then(Value::as_u64) == Some(2),
        "expected a roster envelope, got {roster}"
    );
    Ok(ws)
}

/// Next text message, bounded by a generous timeout.
async fn next_text(ws: &mut WsClient) -> Result<String> {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .context("timed out waiting for a message")?
            .context("connection ended unexpectedly")??;
        if let Message::Text(text) = message {
            return Ok(text.as_str().to_string());
        }
    }
}

/// Next text message parsed as JSON.
async fn next_json(ws: &mut WsClient) -> Result<Value> {
    let text = next_text(ws).await?;
    serde_json::from_str(&text).with_context(|| format!("not JSON: {text}"))
}

/// Asserts that no message arrives within a short grace period.
async fn expect_silence(ws: &mut WsClient) -> Result<()> {
    let outcome = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    ensure!(outcome.is_err(), "expected silence, got {outcome:?}");
    Ok(())
}

#[tokio::test]
async fn connect_message_registers_and_returns_the_roster() -> Result<()> {
    let addr = start_relay().await?;
    let (mut ws, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}/")).await?;

    ws.send(Message::text(r#"{"type":1,"clientId":"alice"}"#))
        .await?;

    let roster = next_json(&mut ws).await?;
    assert_eq!(roster.get("clientId"), Some(&Value::from("alice")));
    assert_eq!(roster.get("messageType"), Some(&Value::from(2)));
    assert_eq!(roster.get("message"), Some(&serde_json::json!(["alice"])));
    Ok(())
}

#[tokio::test]
async fn joining_peer_is_announced_to_the_others() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;
    let _bob = connect(addr, "bob").await?;

    assert_eq!(next_text(&mut alice).await?, "bob has connected.");
    let roster = next_json(&mut alice).await?;
    // Roster copies are addressed per recipient.
    assert_eq!(roster.get("clientId"), Some(&Value::from("alice")));
    assert_eq!(
        roster.get("message"),
        Some(&serde_json::json!(["alice", "bob"]))
    );
    Ok(())
}

#[tokio::test]
async fn data_envelopes_reach_everyone_but_the_sender() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;
    let mut bob = connect(addr, "bob").await?;
    next_text(&mut alice).await?; // "bob has connected."
    next_json(&mut alice).await?; // roster

    bob.send(Message::text(
        r#"{"clientId":"bob","messageType":7,"message":"hi room","timeStamp":1}"#,
    ))
    .await?;

    let relayed = next_json(&mut alice).await?;
    assert_eq!(relayed.get("clientId"), Some(&Value::from("bob")));
    assert_eq!(relayed.get("messageType"), Some(&Value::from(7)));
    assert_eq!(relayed.get("message"), Some(&Value::from("hi room")));

    expect_silence(&mut bob).await?;
    Ok(())
}

#[tokio::test]
async fn ping_is_answered_to_the_pinger_only() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;
    let mut bob = connect(addr, "bob").await?;
    next_text(&mut alice).await?; // "bob has connected."
    next_json(&mut alice).await?; // roster

    alice
        .send(Message::text(
            r#"{"opcode":9,"clientId":"alice","timeStamp":1}"#,
        ))
        .await?;

    let pong = next_json(&mut alice).await?;
    assert_eq!(pong.get("opcode"), Some(&Value::from(10)));
    assert_eq!(pong.get("clientId"), Some(&Value::from("alice")));

    expect_silence(&mut bob).await?;
    Ok(())
}

#[tokio::test]
async fn close_frame_departs_immediately() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;
    let mut bob = connect(addr, "bob").await?;
    next_text(&mut alice).await?; // "bob has connected."
    next_json(&mut alice).await?; // roster

    bob.close(None).await?;

    assert_eq!(next_text(&mut alice).await?, "bob has disconnected.");
    let roster = next_json(&mut alice).await?;
    assert_eq!(roster.get("message"), Some(&serde_json::json!(["alice"])));
    Ok(())
}

#[tokio::test]
async fn dead_socket_is_swept_and_announced() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;
    let bob = connect(addr, "bob").await?;
    next_text(&mut alice).await?; // "bob has connected."
    next_json(&mut alice).await?; // roster

    // No close frame — the transport just dies.
    drop(bob);

    assert_eq!(next_text(&mut alice).await?, "bob has disconnected.");
    let roster = next_json(&mut alice).await?;
    assert_eq!(roster.get("message"), Some(&serde_json::json!(["alice"])));
    Ok(())
}

#[tokio::test]
async fn duplicate_client_id_is_rejected() -> Result<()> {
    let addr = start_relay().await?;
    let mut alice = connect(addr, "alice").await?;

    let (mut intruder, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/")).await?;
    intruder
        .send(Message::text(r#"{"type":1,"clientId":"alice"}"#))
        .await?;

    // The intruder gets no roster; its connection is torn down.
    let outcome = tokio::time::timeout(Duration::from_secs(5), intruder.next())
        .await
        .context("server kept the duplicate connection open")?;
    match outcome {
        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => {}
        Some(Ok(other)) => bail!("duplicate connection received {other:?}"),
    }

    // The original registration still answers.
    alice
        .send(Message::text(
            r#"{"opcode":9,"clientId":"alice","timeStamp":1}"#,
        ))
        .await?;
    let pong = next_json(&mut alice).await?;
    assert_eq!(pong.get("opcode"), Some(&Value::from(10)));
    Ok(())
}
