//! Wire protocol layer: frame codec and upgrade handshake.
//!
//! Pure transformations only — no I/O. The [`frame`] module converts
//! between byte buffers and structured frames; [`handshake`] turns an
//! upgrade request into a `101 Switching Protocols` response block.

pub mod frame;
pub mod handshake;
pub mod opcode;

pub use frame::Frame;
pub use handshake::{HandshakeResponse, Subprotocol, UpgradeRequest};
pub use opcode::Opcode;
