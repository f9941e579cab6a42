//! Gateway: TCP listener that accepts connections and spawns sessions.

use crate::network::session;
use crate::state::Hub;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info};

/// Accepts incoming TCP connections, performs the WebSocket upgrade (inside
/// the session), and tracks session tasks for graceful shutdown.
pub struct Gateway {
    listener: TcpListener,
    hub: Arc<Hub>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Bind the gateway to the specified address.
    pub async fn bind(addr: SocketAddr, hub: Arc<Hub>) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "gateway listening");
        Ok(Self {
            listener,
            hub,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
        })
    }

    /// The bound address (useful when binding port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// A token that stops the accept loop when cancelled.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Accept connections until shut down, then close every session and
    /// wait for their writers to finish.
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => {
                        debug!(%addr, "connection accepted");
                        let hub = Arc::clone(&self.hub);
                        self.tracker.spawn(async move {
                            if let Err(e) = session::run(hub, stream, addr).await {
                                debug!(%addr, error = %e, "session ended with error");
                            }
                        });
                    }
                    Err(e) => error!(error = %e, "failed to accept connection"),
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        info!("gateway shutting down");
        self.tracker.close();
        self.hub.shutdown_all();
        self.tracker.wait().await;
        Ok(())
    }
}
