//! Connection registry and broadcast fan-out.
//!
//! [`ConnectionRegistry`] owns the keyed table of live connections behind
//! a single [`tokio::sync::RwLock`], so registration, close handling, and
//! the periodic sweep are serialized against each other. Delivery goes
//! through the [`Transport`] trait, whose `send` is a non-blocking
//! enqueue — a slow peer can never stall fan-out to the others.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::protocol::Frame;
use crate::relay::events::{EventBus, RelayEvent};
use crate::relay::messages::DataEnvelope;

/// Byte-stream transport handle for one registered peer.
///
/// The registry is the writer-of-record for liveness: `is_destroyed` is
/// queried at every delivery and during sweeps, never cached.
pub trait Transport: fmt::Debug + Send + Sync {
    /// Queues already-encoded frame bytes for delivery. Returns `false`
    /// when the peer can no longer accept writes; the failure is the
    /// peer's problem alone and is reconciled by the next sweep.
    fn send(&self, frame: &[u8]) -> bool;

    /// True once the underlying socket is gone or writes have failed.
    fn is_destroyed(&self) -> bool;

    /// Tears the transport down. Idempotent.
    fn close(&self);
}

/// Keyed table of active connections plus broadcast operations.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: RwLock<HashMap<String, Arc<dyn Transport>>>,
    events: EventBus,
}

impl ConnectionRegistry {
    /// Creates an empty registry publishing lifecycle events on `events`.
    #[must_use]
    pub fn new(events: EventBus) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            events,
        }
    }

    /// Returns the event bus this registry publishes on.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Registers `transport` under `id`.
    ///
    /// Returns `true` and publishes [`RelayEvent::Connected`] if the id
    /// was unused; returns `false` without mutating anything otherwise —
    /// the existing registration always wins.
    pub async fn register(&self, id: &str, transport: Arc<dyn Transport>) -> bool {
        {
            let mut map = self.connections.write().await;
            if map.contains_key(id) {
                return false;
            }
            map.insert(id.to_string(), transport);
        }
        tracing::info!(client_id = id, "connection registered");
        self.events.publish(RelayEvent::Connected {
            client_id: id.to_string(),
        });
        true
    }

    /// Removes `id` from the registry. Idempotent; publishes
    /// [`RelayEvent::Disconnected`] only when an entry was removed.
    pub async fn unregister(&self, id: &str) {
        let removed = {
            let mut map = self.connections.write().await;
            map.remove(id)
        };
        if removed.is_some() {
            tracing::info!(client_id = id, "connection unregistered");
            self.events.publish(RelayEvent::Disconnected {
                client_id: id.to_string(),
            });
        }
    }

    /// True if `id` is currently registered.
    pub async fn contains(&self, id: &str) -> bool {
        self.connections.read().await.contains_key(id)
    }

    /// Returns all registered ids, sorted for deterministic rosters.
    pub async fn client_ids(&self) -> Vec<String> {
        let map = self.connections.read().await;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Returns the number of registered connections.
    pub async fn len(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Returns `true` if no connection is registered.
    pub async fn is_empty(&self) -> bool {
        self.connections.read().await.is_empty()
    }

    /// Delivers already-encoded frame bytes to every live registered
    /// connection, skipping `sender_id` iff `exclude_sender`.
    ///
    /// Destroyed transports and failed sends are skipped silently; dead
    /// peers are discovered by the next [`ConnectionRegistry::sweep`],
    /// not here.
    pub async fn broadcast(&self, sender_id: &str, frame: &[u8], exclude_sender: bool) {
        let map = self.connections.read().await;
        for (id, transport) in map.iter() {
            if exclude_sender && id == sender_id {
                continue;
            }
            if transport.is_destroyed() {
                continue;
            }
            if !transport.send(frame) {
                tracing::debug!(client_id = %id, "broadcast write skipped for dead peer");
            }
        }
    }

    /// Sends every live connection the roster of registered ids, each
    /// recipient addressed with its own id in the envelope.
    pub async fn broadcast_client_list(&self) {
        let map = self.connections.read().await;
        let mut ids: Vec<String> = map.keys().cloned().collect();
        ids.sort();

        for (id, transport) in map.iter() {
            if transport.is_destroyed() {
                continue;
            }
            let envelope = DataEnvelope::client_list(id, &ids);
            transport.send(&Frame::encode_text(&envelope.to_json()));
        }
    }

    /// Reconciles dead transports out of the registry.
    ///
    /// Every entry whose transport reports destroyed is removed; each
    /// removal publishes [`RelayEvent::Disconnected`] and triggers one
    /// plain-text departure announcement plus a client-list broadcast to
    /// the remainder. Returns the removed ids. Scheduling is the caller's
    /// job — the registry never sweeps on its own.
    pub async fn sweep(&self) -> Vec<String> {
        let mut removed = Vec::new();
        {
            let mut map = self.connections.write().await;
            map.retain(|id, transport| {
                if transport.is_destroyed() {
                    removed.push(id.clone());
                    false
                } else {
                    true
                }
            });
        }

        for id in &removed {
            tracing::info!(client_id = %id, "dead connection swept");
            self.events.publish(RelayEvent::Disconnected {
                client_id: id.clone(),
            });
            let announcement = format!("{id} has disconnected.");
            self.broadcast(id, &Frame::encode_text(&announcement), true)
                .await;
            self.broadcast_client_list().await;
        }

        removed
    }
}
