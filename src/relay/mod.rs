//! Relay layer: connection registry, broadcast fan-out, message
//! envelopes, keepalive handling, and the event bus that hands decoded
//! traffic to the application.

pub mod events;
pub mod heartbeat;
pub mod messages;
pub mod registry;

pub use events::{EventBus, RelayEvent};
pub use heartbeat::{HeartbeatKind, HeartbeatMessage};
pub use messages::{DataEnvelope, Inbound};
pub use registry::{ConnectionRegistry, Transport};
