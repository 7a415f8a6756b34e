//! Application-level keepalive protocol.
//!
//! Heartbeats ride inside ordinary Text frames as JSON bodies of the form
//! `{"opcode": 9|10, "clientId": "<id>", "timeStamp": <epoch ms>}` — the
//! frame-level Ping/Pong opcode values reused as JSON fields, because
//! browser peers cannot emit real control frames. The protocol is
//! symmetric on the wire but asymmetric in use: clients ping on a timer,
//! the server only ever reacts. A Pong is addressed to the pinging peer's
//! own transport and is never broadcast.

use serde::{Deserialize, Serialize};

use crate::protocol::{Frame, Opcode};
use crate::relay::registry::Transport;

/// Direction discriminator carried in the heartbeat body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatKind {
    /// Liveness probe (0x9).
    Ping,
    /// Probe acknowledgement (0xA).
    Pong,
}

impl HeartbeatKind {
    /// Returns the numeric value carried in the `opcode` field.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::Ping => Opcode::Ping.bits(),
            Self::Pong => Opcode::Pong.bits(),
        }
    }

    /// Parses the `opcode` field. Exact match only — values that merely
    /// share bits with ping or pong are not heartbeats.
    #[must_use]
    pub const fn from_wire(value: u8) -> Option<Self> {
        match value {
            0x9 => Some(Self::Ping),
            0xA => Some(Self::Pong),
            _ => None,
        }
    }
}

/// Wire body of a heartbeat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatMessage {
    /// Ping or pong wire value; see [`HeartbeatKind`].
    pub opcode: u8,
    /// Id of the peer the heartbeat concerns.
    pub client_id: String,
    /// Epoch milliseconds at construction time.
    pub time_stamp: i64,
}

impl HeartbeatMessage {
    /// Builds a ping for `client_id`, stamped now.
    #[must_use]
    pub fn ping(client_id: &str) -> Self {
        Self::stamped(HeartbeatKind::Ping, client_id)
    }

    /// Builds a pong for `client_id`, stamped now.
    #[must_use]
    pub fn pong(client_id: &str) -> Self {
        Self::stamped(HeartbeatKind::Pong, client_id)
    }

    fn stamped(kind: HeartbeatKind, client_id: &str) -> Self {
        Self {
            opcode: kind.wire_value(),
            client_id: client_id.to_string(),
            time_stamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Returns the heartbeat direction, or `None` for an out-of-set
    /// `opcode` value.
    #[must_use]
    pub fn kind(&self) -> Option<HeartbeatKind> {
        HeartbeatKind::from_wire(self.opcode)
    }

    /// Serializes the heartbeat to its wire JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Reacts to one inbound heartbeat on a registered connection.
///
/// A Ping whose `clientId` matches the sending connection's registered id
/// gets a Pong queued on that same transport — and nowhere else. A Ping
/// with a mismatched id is consumed without a reply. An unsolicited Pong
/// is consumed and ignored; the server never initiates pings, so none is
/// ever expected. Returns `true` when the message was a heartbeat and has
/// been fully handled.
pub fn handle(connection_id: &str, heartbeat: &HeartbeatMessage, transport: &dyn Transport) -> bool {
    match heartbeat.kind() {
        Some(HeartbeatKind::Ping) => {
            if heartbeat.client_id == connection_id {
                let pong = HeartbeatMessage::pong(connection_id);
                transport.send(&Frame::encode_text(&pong.to_json()));
            } else {
                tracing::debug!(
                    connection = connection_id,
                    claimed = heartbeat.client_id,
                    "ping with mismatched client id dropped"
                );
            }
            true
        }
        Some(HeartbeatKind::Pong) => {
            tracing::debug!(connection = connection_id, "unsolicited pong ignored");
            true
        }
        None => false,
    }
}
