//! Upgrade handshake negotiation.
//!
//! One-shot transformation of an HTTP upgrade request into the
//! `101 Switching Protocols` response block plus a selected subprotocol.
//! Only two request headers are read: `Sec-WebSocket-Key` and the
//! optional comma-separated `Sec-WebSocket-Protocol` offer list.

use base64::Engine as _;
use base64::prelude::BASE64_STANDARD;
use sha1::{Digest, Sha1};

use crate::error::RelayError;

/// Fixed protocol GUID appended to the client key before hashing
/// (RFC 6455 §4.2.2).
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Subprotocols this server selects from. Clients may offer any label;
/// only an intersection with this set produces a
/// `Sec-WebSocket-Protocol` response header.
pub const SUPPORTED_SUBPROTOCOLS: &[Subprotocol] = &[Subprotocol::Json];

/// The fixed set of subprotocol labels known to this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subprotocol {
    /// JSON-envelope messaging (the only subprotocol the server accepts).
    Json,
    /// Raw binary messaging.
    Binary,
    /// SOAP messaging.
    Soap,
    /// Application-defined messaging.
    Custom,
}

impl Subprotocol {
    /// Parses a client-offered label; `None` for labels outside the set.
    #[must_use]
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "json" => Some(Self::Json),
            "binary" => Some(Self::Binary),
            "soap" => Some(Self::Soap),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }

    /// Returns the wire label for this subprotocol.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "binary",
            Self::Soap => "soap",
            Self::Custom => "custom",
        }
    }
}

/// The two upgrade-request values this core reads.
#[derive(Debug, Clone)]
pub struct UpgradeRequest {
    /// Client-supplied `Sec-WebSocket-Key` value.
    pub key: String,
    /// Client-offered subprotocol labels, in offer order.
    pub offered_subprotocols: Vec<String>,
}

impl UpgradeRequest {
    /// Extracts the handshake headers from a raw upgrade request.
    ///
    /// Header names are matched case-insensitively; everything except the
    /// two relevant headers is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedHandshake`] if the request carries
    /// no `Sec-WebSocket-Key` header.
    pub fn parse(raw: &str) -> Result<Self, RelayError> {
        let mut key = None;
        let mut offered_subprotocols = Vec::new();

        for line in raw.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            let name = name.trim();
            let value = value.trim();

            if name.eq_ignore_ascii_case("sec-websocket-key") {
                key = Some(value.to_string());
            } else if name.eq_ignore_ascii_case("sec-websocket-protocol") {
                offered_subprotocols.extend(
                    value
                        .split(',')
                        .map(str::trim)
                        .filter(|label| !label.is_empty())
                        .map(str::to_string),
                );
            }
        }

        let key = key.ok_or_else(|| {
            RelayError::MalformedHandshake("missing Sec-WebSocket-Key header".to_string())
        })?;

        Ok(Self {
            key,
            offered_subprotocols,
        })
    }
}

/// A negotiated handshake, ready to be written back to the client.
#[derive(Debug, Clone)]
pub struct HandshakeResponse {
    /// Computed `Sec-WebSocket-Accept` value.
    pub accept: String,
    /// Selected subprotocol, if the client's offer intersected
    /// [`SUPPORTED_SUBPROTOCOLS`].
    pub subprotocol: Option<Subprotocol>,
}

impl HandshakeResponse {
    /// Serializes the `101 Switching Protocols` response block, terminated
    /// by an empty line.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut response = String::with_capacity(160);
        response.push_str("HTTP/1.1 101 Switching Protocols\r\n");
        response.push_str("Upgrade: websocket\r\n");
        response.push_str("Connection: Upgrade\r\n");
        response.push_str("Sec-WebSocket-Accept: ");
        response.push_str(&self.accept);
        response.push_str("\r\n");
        if let Some(subprotocol) = self.subprotocol {
            response.push_str("Sec-WebSocket-Protocol: ");
            response.push_str(subprotocol.label());
            response.push_str("\r\n");
        }
        response.push_str("\r\n");
        response.into_bytes()
    }
}

/// Negotiates the handshake for a parsed upgrade request.
///
/// The accept value is `base64(SHA-1(key + GUID))`. The subprotocol is the
/// first client-offered label that is both known and server-supported;
/// client offer order is the tie-break, server preference is not
/// considered. No intersection means no subprotocol header — negotiation
/// still succeeds.
#[must_use]
pub fn negotiate(request: &UpgradeRequest) -> HandshakeResponse {
    let subprotocol = request
        .offered_subprotocols
        .iter()
        .filter_map(|label| Subprotocol::from_label(label))
        .find(|candidate| SUPPORTED_SUBPROTOCOLS.contains(candidate));

    if subprotocol.is_none() && !request.offered_subprotocols.is_empty() {
        tracing::debug!(
            offered = ?request.offered_subprotocols,
            "no mutually supported subprotocol; proceeding without one"
        );
    }

    HandshakeResponse {
        accept: accept_key(&request.key),
        subprotocol,
    }
}

/// Computes the `Sec-WebSocket-Accept` value for a client key.
#[must_use]
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    BASE64_STANDARD.encode(hasher.finalize())
}
