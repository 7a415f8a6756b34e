//! Relay error types.
//!
//! [`RelayError`] is the central error type for the server. Frame decoding
//! has its own nested [`FrameDecodeError`] so the codec can be used (and
//! tested) without pulling in the rest of the taxonomy.
//!
//! Two conditions from the protocol deliberately have no variant here:
//! an unsupported subprotocol offer is non-fatal (negotiation proceeds
//! without the header), and a write failure to a single peer is per-peer
//! state reconciled by the next registry sweep, never a propagated error.

/// Server-side error enum.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The upgrade request could not be negotiated (e.g. missing
    /// `Sec-WebSocket-Key`). Fatal to that upgrade attempt only; the
    /// caller closes the underlying transport.
    #[error("malformed handshake: {0}")]
    MalformedHandshake(String),

    /// A frame failed to decode. The connection that produced it is
    /// treated as protocol-violating and closed; other connections are
    /// unaffected.
    #[error("frame decode failed: {0}")]
    FrameDecode(#[from] FrameDecodeError),

    /// A connection asserted a client id that is already registered.
    #[error("duplicate client id: {0}")]
    DuplicateClientId(String),

    /// Socket-level I/O failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors produced while decoding a single binary frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameDecodeError {
    /// The buffer ended before the frame it declares was complete.
    #[error("truncated frame: {needed} more byte(s) required")]
    Truncated {
        /// How many additional bytes the declared frame still needs.
        needed: usize,
    },

    /// The declared payload length exceeds the configured maximum.
    #[error("payload length {length} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Length declared by the frame header.
        length: u64,
        /// Configured maximum payload length.
        max: u64,
    },
}
