//! TCP listener and server main loop

use super::registry::Registry;
use super::session::Session;
use super::ServerContext;
use crate::config::Config;
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// TCP chat server listener
pub struct ServerListener {
    ctx: ServerContext,
}

impl ServerListener {
    /// Create a new server listener
    pub fn new(config: Config) -> Self {
        Self {
            ctx: ServerContext::new(config),
        }
    }

    /// Shared registry of active users
    pub fn registry(&self) -> Arc<Registry> {
        Arc::clone(&self.ctx.registry)
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.ctx.config.server.bind_addr();
        TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))
    }

    /// Bind and run the server until `shutdown_rx` fires
    pub async fn run(&self, shutdown_rx: mpsc::Receiver<()>) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener, shutdown_rx).await
    }

    /// Run the accept loop on an already bound listener
    pub async fn serve(
        &self,
        listener: TcpListener,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> Result<()> {
        tracing::info!("Server listening on {}", listener.local_addr()?);

        let shutdown = CancellationToken::new();
        let mut sessions = JoinSet::new();

        // Main server loop
        loop {
            tokio::select! {
                // Handle shutdown signal
                _ = shutdown_rx.recv() => {
                    tracing::info!("Shutdown signal received");
                    break;
                }

                // Accept new connections
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!("Failed to set TCP_NODELAY: {}", e);
                            }
                            let session = Session::new(stream, self.ctx.clone(), &shutdown);
                            let span = tracing::info_span!("session", id = %session.id(), %peer);
                            tracing::info!(parent: &span, "Client connected");
                            sessions.spawn(
                                async move {
                                    let state = session.run().await;
                                    tracing::info!(?state, "Client handler finished");
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            tracing::error!("Failed to accept connection: {}", e);
                        }
                    }
                }

                // Reap finished sessions
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!("Session task failed: {}", e);
                    }
                }
            }
        }

        // Cleanup
        self.cleanup(shutdown, sessions).await;

        Ok(())
    }

    /// Close every session and wait for them to finish
    async fn cleanup(&self, shutdown: CancellationToken, mut sessions: JoinSet<()>) {
        tracing::info!(sessions = sessions.len(), "Cleaning up server resources");

        shutdown.cancel();

        let grace = self.ctx.config.server.linger().saturating_mul(2);
        let drained = tokio::time::timeout(grace, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!("Sessions did not finish in time, aborting");
            sessions.shutdown().await;
        }
    }
}
