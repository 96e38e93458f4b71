//! HTTP-FLV server listener
//!
//! Handles TCP accept loop, spawns connection handlers and runs the
//! liveness monitor over every relaying session.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::{Connection, SessionTable};
use crate::server::handler::SubscriberHandler;
use crate::session::{gen_unique_key, UniqueKeyPrefix};
use crate::stats::SubscriberStat;

/// HTTP-FLV server
pub struct HttpFlvServer<H: SubscriberHandler> {
    unique_key: String,
    config: ServerConfig,
    handler: Arc<H>,
    registry: Arc<StreamRegistry>,
    sessions: SessionTable,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl<H: SubscriberHandler> HttpFlvServer<H> {
    /// Create a new server with the given configuration and handler
    pub fn new(config: ServerConfig, handler: H) -> Self {
        Self::with_registry_config(config, handler, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(
        config: ServerConfig,
        handler: H,
        registry_config: RegistryConfig,
    ) -> Self {
        Self::with_registry(
            config,
            handler,
            Arc::new(StreamRegistry::with_config(registry_config)),
        )
    }

    /// Create a new server on top of an existing registry
    pub fn with_registry(config: ServerConfig, handler: H, registry: Arc<StreamRegistry>) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        Self {
            unique_key: gen_unique_key(UniqueKeyPrefix::FlvServer),
            config,
            handler: Arc::new(handler),
            registry,
            sessions: Arc::new(RwLock::new(HashMap::new())),
            connection_semaphore,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Run the server
    ///
    /// This method blocks until the listener fails to bind.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve_until(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    pub async fn serve_until<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            server = %self.unique_key,
            addr = %listener.local_addr()?,
            "HTTP-FLV server listening"
        );

        // Background tasks for the registry and session liveness
        let cleanup_handle = self.registry.spawn_cleanup_task();
        let monitor_handle = self.spawn_monitor_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!(server = %self.unique_key, "Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        cleanup_handle.abort();
        monitor_handle.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        tracing::debug!(peer = %peer_addr, "New connection");

        if let Err(e) = self.configure_socket(&socket) {
            tracing::error!(peer = %peer_addr, error = %e, "Failed to configure socket");
            return;
        }

        let connection = Connection::new(
            self.config.clone(),
            Arc::clone(&self.handler),
            Arc::clone(&self.registry),
            Arc::clone(&self.sessions),
        );

        tokio::spawn(async move {
            // Held until the connection is done
            let _permit = permit;
            connection.run(socket).await;
            tracing::debug!(peer = %peer_addr, "Connection closed");
        });
    }

    fn configure_socket(&self, socket: &TcpStream) -> std::io::Result<()> {
        if self.config.tcp_nodelay {
            socket.set_nodelay(true)?;
        }
        Ok(())
    }

    /// Spawn the bitrate and liveness monitor
    ///
    /// Every `monitor_interval` each relaying session gets its bitrate
    /// recomputed; a session that wrote nothing since the previous tick is
    /// disposed, which ends its relay.
    fn spawn_monitor_task(&self) -> JoinHandle<()> {
        let sessions = Arc::clone(&self.sessions);
        let interval_secs = self.config.monitor_interval_secs();

        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(u64::from(interval_secs)));
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let current: Vec<_> = sessions.read().await.values().cloned().collect();
                for session in current {
                    session.update_stat(interval_secs);
                    if !session.is_alive(interval_secs) {
                        tracing::warn!(
                            session = %session.unique_key(),
                            peer = %session.remote_addr(),
                            "No write progress, disposing session"
                        );
                        session.dispose().await;
                    }
                }
            }
        })
    }

    /// Statistics of every session currently relaying
    pub async fn session_stats(&self) -> Vec<SubscriberStat> {
        self.sessions
            .read()
            .await
            .values()
            .map(|s| s.get_stat())
            .collect()
    }

    /// Number of sessions currently relaying
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Server identifier used in logs
    pub fn unique_key(&self) -> &str {
        &self.unique_key
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
