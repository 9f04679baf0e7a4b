//! The accept loop.

use std::net::SocketAddr;
use std::sync::Arc;

use armada_room::Registry;
use armada_transport::WsListener;
use tracing::{info, warn};

use crate::handler;
use crate::ArmadaError;

/// A bound server: a listener plus the registry shared by every
/// connection it accepts.
pub struct Server {
    listener: WsListener,
    registry: Arc<Registry>,
}

impl Server {
    /// Binds to `addr` with a fresh registry (and lobby).
    pub async fn bind(addr: &str) -> Result<Self, ArmadaError> {
        Ok(Self {
            listener: WsListener::bind(addr).await?,
            registry: Registry::new(),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    /// Accepts connections until interrupted; on ctrl-c every room is
    /// told to disconnect its members before returning.
    pub async fn run(self) -> Result<(), ArmadaError> {
        info!(addr = %self.local_addr(), "server listening");
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(connection) => {
                        tokio::spawn(handler::handle_connection(
                            connection,
                            self.registry.clone(),
                        ));
                    }
                    Err(error) => warn!(%error, "accept failed"),
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    self.registry.shutdown();
                    break;
                }
            }
        }
        Ok(())
    }
}
