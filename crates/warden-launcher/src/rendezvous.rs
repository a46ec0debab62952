//! Single-connection TCP rendezvous.
//!
//! The listener is opened before the server process exists, the resolved
//! port is handed to the process, and exactly one inbound connection is
//! accepted. The listener is closed as soon as that connection arrives (or
//! the wait fails), so later connection attempts are refused.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};
use warden_core::{Result, WardenError};

/// A listener waiting for the server to dial back.
#[derive(Debug)]
pub struct TcpRendezvous {
    listener: TcpListener,
    port: u16,
}

impl TcpRendezvous {
    /// Listen on the loopback interface; port 0 picks an ephemeral port.
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| WardenError::socket(format!("Failed to listen on {}", addr), e))?;
        let port = listener
            .local_addr()
            .map_err(|e| WardenError::socket("Failed to resolve listener address", e))?
            .port();

        debug!("Rendezvous listening on port {}", port);
        Ok(Self { listener, port })
    }

    /// The resolved port to pass to the server.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Accept the first connection within `timeout`, then stop listening.
    pub async fn accept_once(self, timeout: Duration) -> Result<(TcpStream, SocketAddr)> {
        let accepted = tokio::time::timeout(timeout, self.listener.accept()).await;
        // Listener dropped here on every path
        match accepted {
            Ok(Ok((stream, peer))) => {
                info!("Server connected from {}, closing listener", peer);
                Ok((stream, peer))
            }
            Ok(Err(e)) => Err(WardenError::socket("Failed to accept server connection", e)),
            Err(_) => Err(WardenError::RendezvousTimeout(timeout)),
        }
    }
}
