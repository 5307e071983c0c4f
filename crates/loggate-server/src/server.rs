//! Listener loop with clean shutdown.
//!
//! One spawned task per accepted connection. Shutdown stops accepting,
//! drops the listener, and waits for in-flight connections to finish
//! naturally; nothing is cancelled.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::error::ServerError;
use crate::pipeline::ClientHandler;

/// Signals the accept loop to stop. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: watch::Sender<bool>,
}

impl ShutdownHandle {
    /// Stop accepting new connections. In-flight connections drain.
    pub fn shutdown(&self) {
        let _ = self.tx.send(true);
    }
}

/// The accept loop.
pub struct Server {
    listener: TcpListener,
    handler: Arc<ClientHandler>,
    shutdown: watch::Receiver<bool>,
}

impl Server {
    /// Bind the listener. A bind failure is fatal: the caller must abort
    /// before serving traffic.
    ///
    /// # Errors
    /// Returns [`ServerError::Bind`] when the address cannot be bound.
    pub async fn bind(
        addr: &str,
        handler: Arc<ClientHandler>,
    ) -> Result<(Self, ShutdownHandle), ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        let (tx, rx) = watch::channel(false);
        Ok((
            Self {
                listener,
                handler,
                shutdown: rx,
            },
            ShutdownHandle { tx },
        ))
    }

    /// The bound address; useful when binding to port 0.
    ///
    /// # Errors
    /// Propagates the underlying socket error.
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept until shutdown, then wait for every in-flight connection.
    ///
    /// # Errors
    /// Currently infallible after bind; the signature leaves room for
    /// accept-loop failures that should stop the server.
    pub async fn run(mut self) -> Result<(), ServerError> {
        tracing::info!(address = %self.listener.local_addr()?, "accepting connections");
        let mut workers = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("shutdown requested; no longer accepting");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let handler = Arc::clone(&self.handler);
                        workers.spawn(async move {
                            handler.handle(stream, peer).await;
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to accept connection");
                    }
                },
            }
        }

        // Unbind before draining so no client can connect mid-shutdown.
        drop(self.listener);
        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "connection task panicked");
            }
        }
        tracing::info!("all in-flight connections finished");
        Ok(())
    }
}
