//! Application message envelopes and inbound classification.
//!
//! Everything above the frame codec speaks JSON text frames. Three wire
//! shapes exist, all camelCase:
//!
//! - connect message: `{"type": 1, "clientId": "<id>"}`
//! - data envelope: `{"clientId", "messageType", "message", "timeStamp"}`
//! - heartbeat envelope: `{"opcode", "clientId", "timeStamp"}`
//!
//! [`classify`] maps a decoded text payload onto a closed [`Inbound`]
//! variant; anything that is not valid JSON (or matches no shape) is
//! passed through as plain text.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::relay::heartbeat::HeartbeatMessage;

/// `type` value marking a connection-establishment message.
pub const MESSAGE_TYPE_CONNECT: u32 = 1;

/// `messageType` value for ordinary relayed messages and the client list.
pub const MESSAGE_TYPE_MESSAGE: u32 = 2;

/// Envelope for ordinary data messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataEnvelope {
    /// Sender id (or recipient id for server-constructed lists).
    pub client_id: String,
    /// Application message type discriminator.
    pub message_type: u32,
    /// Variant-specific payload.
    pub message: Value,
    /// Epoch milliseconds at construction time.
    pub time_stamp: i64,
}

impl DataEnvelope {
    /// Creates an envelope stamped with the current time.
    #[must_use]
    pub fn new(client_id: &str, message_type: u32, message: Value) -> Self {
        Self {
            client_id: client_id.to_string(),
            message_type,
            message,
            time_stamp: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Builds the client-list envelope for one recipient: the recipient's
    /// own id in `clientId` and the full id roster as the payload.
    #[must_use]
    pub fn client_list(recipient_id: &str, ids: &[String]) -> Self {
        Self::new(recipient_id, MESSAGE_TYPE_MESSAGE, Value::from(ids.to_vec()))
    }

    /// Serializes the envelope to its wire JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Classification of one decoded inbound text payload.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Connection-establishment message.
    Connect {
        /// Id the peer asserts for itself.
        client_id: String,
    },
    /// Application-level keepalive message.
    Heartbeat(HeartbeatMessage),
    /// Ordinary data envelope.
    Data(DataEnvelope),
    /// Valid text that matches none of the JSON shapes.
    Plain(String),
}

/// Classifies a decoded text payload.
///
/// Precedence mirrors the dispatch order on the wire: connect first, then
/// heartbeat (any JSON object carrying both `opcode` and `timeStamp`),
/// then the data envelope, then plain text.
#[must_use]
pub fn classify(text: &str) -> Inbound {
    let Ok(value) = serde_json::from_str::<Value>(text) else {
        return Inbound::Plain(text.to_string());
    };

    if value.get("type").and_then(Value::as_u64) == Some(u64::from(MESSAGE_TYPE_CONNECT))
        && let Some(client_id) = value.get("clientId").and_then(Value::as_str)
    {
        return Inbound::Connect {
            client_id: client_id.to_string(),
        };
    }

    if value.get("opcode").is_some()
        && value.get("timeStamp").is_some()
        && let Ok(heartbeat) = serde_json::from_value::<HeartbeatMessage>(value.clone())
    {
        return Inbound::Heartbeat(heartbeat);
    }

    if let Ok(envelope) = serde_json::from_value::<DataEnvelope>(value) {
        return Inbound::Data(envelope);
    }

    Inbound::Plain(text.to_string())
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;
    use crate::relay::heartbeat::HeartbeatKind;

    #[test]
    fn classifies_connect_message() {
        let Inbound::Connect { client_id } = classify(r#"{"type":1,"clientId":"alice"}"#) else {
            panic!("expected a connect message");
        };
        assert_eq!(client_id, "alice");
    }

    #[test]
    fn classifies_heartbeat_message() {
        let text = r#"{"opcode":9,"clientId":"alice","timeStamp":1712000000000}"#;
        let Inbound::Heartbeat(heartbeat) = classify(text) else {
            panic!("expected a heartbeat message");
        };
        assert_eq!(heartbeat.kind(), Some(HeartbeatKind::Ping));
        assert_eq!(heartbeat.client_id, "alice");
    }

    #[test]
    fn classifies_data_envelope() {
        let text = r#"{"clientId":"bob","messageType":2,"message":"hi","timeStamp":1712000000000}"#;
        let Inbound::Data(envelope) = classify(text) else {
            panic!("expected a data envelope");
        };
        assert_eq!(envelope.client_id, "bob");
        assert_eq!(envelope.message_type, MESSAGE_TYPE_MESSAGE);
        assert_eq!(envelope.message, Value::from("hi"));
    }

    #[test]
    fn non_json_is_plain_text() {
        let Inbound::Plain(text) = classify("bob has connected.") else {
            panic!("expected plain text");
        };
        assert_eq!(text, "bob has connected.");
    }

    #[test]
    fn json_matching_no_shape_is_plain_text() {
        let Inbound::Plain(_) = classify(r#"{"foo":"bar"}"#) else {
            panic!("expected plain text");
        };
    }

    #[test]
    fn connect_with_wrong_type_is_not_connect() {
        let text = r#"{"type":2,"clientId":"alice"}"#;
        if let Inbound::Connect { .. } = classify(text) {
            panic!("type 2 must not classify as connect");
        }
    }

    #[test]
    fn envelope_serializes_camel_case() {
        let envelope = DataEnvelope::new("carol", MESSAGE_TYPE_MESSAGE, Value::from("hey"));
        let json = envelope.to_json();
        assert!(json.contains("\"clientId\":\"carol\""));
        assert!(json.contains("\"messageType\":2"));
        assert!(json.contains("\"timeStamp\":"));
    }

    #[test]
    fn client_list_addresses_the_recipient() {
        let ids = vec!["alice".to_string(), "bob".to_string()];
        let envelope = DataEnvelope::client_list("bob", &ids);
        assert_eq!(envelope.client_id, "bob");
        assert_eq!(envelope.message_type, MESSAGE_TYPE_MESSAGE);
        assert_eq!(envelope.message, Value::from(ids));
    }
}
