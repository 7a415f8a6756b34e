//! pulse-relay server entry point.
//!
//! Binds the TCP listener, subscribes a logging handler to the relay
//! event bus, and runs the accept loop.

use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use pulse_relay::config::RelayConfig;
use pulse_relay::relay::RelayEvent;
use pulse_relay::server::RelayServer;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration
    let config = RelayConfig::from_env()?;
    tracing::info!(addr = %config.listen_addr, "starting pulse-relay");

    // Bind listener, registry, and event bus
    let server = RelayServer::bind(config).await?;

    // Minimal application subscriber: log relayed traffic
    let mut events = server.events().subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(RelayEvent::Connected { client_id }) => {
                    tracing::info!(client_id = %client_id, "client connected");
                }
                Ok(RelayEvent::Disconnected { client_id }) => {
                    tracing::info!(client_id = %client_id, "client disconnected");
                }
                Ok(RelayEvent::Message { client_id, frame }) => {
                    tracing::debug!(
                        client_id = %client_id,
                        payload_bytes = frame.payload.len(),
                        "message relayed"
                    );
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Run the accept loop
    server.serve().await?;

    Ok(())
}
