//! Accept loop and sweep scheduling.
//!
//! [`RelayServer`] owns the TCP listener, the connection registry, and
//! the event bus. Each accepted socket gets its own task; a periodic
//! task invokes the registry sweep (the registry itself never
//! self-schedules).

mod connection;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::relay::events::EventBus;
use crate::relay::registry::ConnectionRegistry;

/// The relay server: listener, registry, and event bus.
#[derive(Debug)]
pub struct RelayServer {
    listener: TcpListener,
    registry: Arc<ConnectionRegistry>,
    events: EventBus,
    config: Arc<RelayConfig>,
}

impl RelayServer {
    /// Binds the listener and builds the registry and event bus.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the listen address cannot be bound.
    pub async fn bind(config: RelayConfig) -> Result<Self, RelayError> {
        let listener = TcpListener::bind(config.listen_addr).await?;
        let events = EventBus::new(config.event_bus_capacity);
        let registry = Arc::new(ConnectionRegistry::new(events.clone()));
        Ok(Self {
            listener,
            registry,
            events,
            config: Arc::new(config),
        })
    }

    /// Returns the bound address (useful with port 0).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if the local address cannot be read.
    pub fn local_addr(&self) -> Result<SocketAddr, RelayError> {
        Ok(self.listener.local_addr()?)
    }

    /// Returns the event bus applications subscribe to.
    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    /// Runs the accept loop forever, spawning one task per connection
    /// and the periodic sweep task.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Io`] if accepting a connection fails.
    pub async fn serve(self) -> Result<(), RelayError> {
        let sweep_registry = Arc::clone(&self.registry);
        let sweep_interval = self.config.sweep_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let removed = sweep_registry.sweep().await;
                if !removed.is_empty() {
                    tracing::debug!(count = removed.len(), "sweep removed dead connections");
                }
            }
        });

        tracing::info!(addr = %self.local_addr()?, "relay listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            tracing::debug!(%peer, "inbound connection");
            let registry = Arc::clone(&self.registry);
            let config = Arc::clone(&self.config);
            tokio::spawn(connection::handle_socket(stream, peer, registry, config));
        }
    }
}
