//! Per-connection I/O: upgrade read, socket-backed transport, and the
//! reader loop that decodes and dispatches inbound frames.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::protocol::{Frame, handshake};
use crate::relay::events::RelayEvent;
use crate::relay::heartbeat;
use crate::relay::messages::{self, DataEnvelope, Inbound};
use crate::relay::registry::{ConnectionRegistry, Transport};

/// Upper bound on the size of an upgrade request.
const MAX_UPGRADE_REQUEST_BYTES: usize = 8 * 1024;

/// Socket-backed [`Transport`].
///
/// `send` enqueues onto a bounded channel drained by a dedicated writer
/// task; it never blocks the broadcaster. A full queue, a closed channel,
/// a write error, or an expired write deadline all mark the transport
/// destroyed — that peer only.
#[derive(Debug)]
pub(crate) struct SocketTransport {
    outbound: mpsc::Sender<Vec<u8>>,
    destroyed: Arc<AtomicBool>,
}

impl Transport for SocketTransport {
    fn send(&self, frame: &[u8]) -> bool {
        if self.destroyed.load(Ordering::SeqCst) {
            return false;
        }
        match self.outbound.try_send(frame.to_vec()) {
            Ok(()) => true,
            Err(err) => {
                tracing::debug!(error = %err, "outbound queue rejected write; marking peer destroyed");
                self.destroyed.store(true, Ordering::SeqCst);
                false
            }
        }
    }

    fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.destroyed.store(true, Ordering::SeqCst);
    }
}

/// Drains the outbound queue onto the socket, one write deadline each.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut outbound: mpsc::Receiver<Vec<u8>>,
    destroyed: Arc<AtomicBool>,
    write_timeout: Duration,
) {
    while let Some(bytes) = outbound.recv().await {
        if destroyed.load(Ordering::SeqCst) {
            break;
        }
        match tokio::time::timeout(write_timeout, write_half.write_all(&bytes)).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::debug!(error = %err, "peer write failed");
                destroyed.store(true, Ordering::SeqCst);
                break;
            }
            Err(_) => {
                tracing::debug!("peer write deadline expired");
                destroyed.store(true, Ordering::SeqCst);
                break;
            }
        }
    }
}

/// Reads the raw upgrade request up to and including its blank line.
///
/// # Errors
///
/// Returns [`RelayError::MalformedHandshake`] when the peer closes before
/// the blank line or the request exceeds [`MAX_UPGRADE_REQUEST_BYTES`].
async fn read_upgrade_request<R>(reader: &mut R) -> Result<String, RelayError>
where
    R: AsyncRead + Unpin,
{
    let mut request = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Err(RelayError::MalformedHandshake(
                "connection closed before the upgrade request completed".to_string(),
            ));
        }
        if let Some(part) = chunk.get(..n) {
            request.extend_from_slice(part);
        }
        if request.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if request.len() > MAX_UPGRADE_REQUEST_BYTES {
            return Err(RelayError::MalformedHandshake(
                "upgrade request exceeds size limit".to_string(),
            ));
        }
    }

    Ok(String::from_utf8_lossy(&request).into_owned())
}

/// Runs one accepted socket to completion, logging how it ended.
pub(crate) async fn handle_socket(
    stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    config: Arc<RelayConfig>,
) {
    if let Err(err) = run_session(stream, peer, registry, config).await {
        tracing::warn!(%peer, error = %err, "connection terminated");
    }
}

/// Handshake, transport setup, and the per-connection reader loop.
async fn run_session(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    config: Arc<RelayConfig>,
) -> Result<(), RelayError> {
    let raw_request = read_upgrade_request(&mut stream).await?;
    let request = handshake::UpgradeRequest::parse(&raw_request)?;
    let response = handshake::negotiate(&request);
    stream.write_all(&response.to_bytes()).await?;
    tracing::debug!(%peer, subprotocol = ?response.subprotocol, "handshake complete");

    let (mut read_half, write_half) = stream.into_split();
    let (outbound_tx, outbound_rx) = mpsc::channel(config.outbound_queue_depth);
    let destroyed = Arc::new(AtomicBool::new(false));
    tokio::spawn(write_loop(
        write_half,
        outbound_rx,
        Arc::clone(&destroyed),
        config.write_timeout,
    ));
    let transport = Arc::new(SocketTransport {
        outbound: outbound_tx,
        destroyed,
    });

    let mut registered_id: Option<String> = None;
    let mut buf = vec![0u8; config.read_buffer_size];

    loop {
        let n = match read_half.read(&mut buf).await {
            Ok(0) => {
                // EOF without a close frame: reconciled by the next sweep.
                transport.close();
                break;
            }
            Ok(n) => n,
            Err(err) => {
                tracing::debug!(%peer, error = %err, "socket read failed");
                transport.close();
                break;
            }
        };
        let Some(chunk) = buf.get(..n) else {
            break;
        };

        let frame = match Frame::decode(chunk, config.max_frame_payload) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(%peer, error = %err, "protocol violation; closing connection");
                transport.close();
                break;
            }
        };

        if frame.is_close() {
            tracing::debug!(%peer, "close frame received");
            transport.close();
            // Immediate, synchronous removal plus departure announcements.
            registry.sweep().await;
            break;
        }

        let Some(text) = frame.text.clone() else {
            // Binary and reserved-opcode frames reach the application but
            // carry nothing the relay itself can route.
            if let Some(id) = registered_id.as_deref() {
                registry.events().publish(RelayEvent::Message {
                    client_id: id.to_string(),
                    frame: frame.clone(),
                });
            } else {
                tracing::debug!(%peer, opcode = frame.raw_opcode, "non-text frame ignored");
            }
            continue;
        };

        match messages::classify(&text) {
            Inbound::Connect { client_id } => {
                if registered_id.is_some() {
                    tracing::debug!(%peer, "connect message on registered connection ignored");
                    continue;
                }
                if registry
                    .register(&client_id, Arc::clone(&transport) as Arc<dyn Transport>)
                    .await
                {
                    registered_id = Some(client_id.clone());
                    let announcement = format!("{client_id} has connected.");
                    registry
                        .broadcast(&client_id, &Frame::encode_text(&announcement), true)
                        .await;
                    registry.broadcast_client_list().await;
                } else if config.close_on_duplicate_id {
                    transport.close();
                    return Err(RelayError::DuplicateClientId(client_id));
                } else {
                    tracing::warn!(%peer, client_id = %client_id, "duplicate client id; connection stays unregistered");
                }
            }
            Inbound::Heartbeat(beat) => {
                if let Some(id) = registered_id.as_deref() {
                    heartbeat::handle(id, &beat, transport.as_ref());
                } else {
                    tracing::debug!(%peer, "heartbeat from unregistered connection dropped");
                }
            }
            Inbound::Data(envelope) => {
                registry.events().publish(RelayEvent::Message {
                    client_id: envelope.client_id.clone(),
                    frame: frame.clone(),
                });
                // Re-stamp rather than echo, as with any relayed envelope.
                let outbound =
                    DataEnvelope::new(&envelope.client_id, envelope.message_type, envelope.message);
                registry
                    .broadcast(
                        &envelope.client_id,
                        &Frame::encode_text(&outbound.to_json()),
                        true,
                    )
                    .await;
            }
            Inbound::Plain(plain) => {
                let Some(id) = registered_id.as_deref() else {
                    tracing::debug!(%peer, "unattributable plain text dropped");
                    continue;
                };
                registry.events().publish(RelayEvent::Message {
                    client_id: id.to_string(),
                    frame: frame.clone(),
                });
                registry
                    .broadcast(id, &Frame::encode_text(&plain), true)
                    .await;
            }
        }
    }

    Ok(())
}
