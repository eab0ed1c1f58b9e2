use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Result;
use tokio::{
    net::{TcpListener, TcpStream},
    select,
    task::JoinHandle,
};
use tracing::{info, warn};

use crate::{connection::handle_connection, registry::Registry};

/// Accepts TCP clients and hands each one to its own connection task.
pub struct Server {
    listener: TcpListener,
    registry: Arc<Registry>,
}

impl Server {
    pub fn new(listener: TcpListener, registry: Arc<Registry>) -> Self {
        Self { listener, registry }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts clients until `shutdown` resolves, then closes every inbox so
    /// the connection tasks wind down.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        tokio::pin!(shutdown);

        loop {
            select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(err) => warn!(error = ?err, "failed to accept connection"),
                },
            }
        }

        let closed = self.registry.close_all();
        info!(clients = closed, "server shutting down");
        Ok(())
    }

    pub async fn run_until_ctrl_c(self) -> Result<()> {
        self.run_until(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = ?err, "failed to install ctrl-c handler");
            }
        })
        .await
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        let registry = Arc::clone(&self.registry);
        let task = tokio::spawn(async move {
            let (reader, writer) = stream.into_split();
            handle_connection(&registry, reader, writer, Some(peer)).await;
        });
        tokio::spawn(watch_connection(peer, task));
    }
}

/// Waits for a connection task and reports it if it panicked. The session is
/// already unregistered by then.
async fn watch_connection(peer: SocketAddr, task: JoinHandle<()>) {
    if let Err(err) = task.await {
        if err.is_panic() {
            warn!(peer = %peer, "client connection task panicked");
        }
    }
}
