//! `TesseraServer` builder and accept loop.
//!
//! This is the entry point for running the proxy. It ties the layers
//! together: transport → protocol → handler.

use std::future::{Future, pending};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tessera_protocol::PacketRegistry;
use tessera_transport::{TcpTransport, Transport, TransportError};

use crate::handler::{EchoHandler, PacketHandler, handle_connection};
use crate::{ProxyConfig, TesseraError};

/// Shared server state passed to each connection task.
pub(crate) struct ServerState<H> {
    pub(crate) handler: H,
    pub(crate) registry: Arc<PacketRegistry>,
    pub(crate) idle_timeout: Duration,
    pub(crate) max_frame_size: usize,
}

/// Builder for configuring and starting a Tessera server.
///
/// # Example
///
/// ```rust,no_run
/// use tessera::prelude::*;
///
/// # async fn start() -> Result<(), TesseraError> {
/// let server = TesseraServer::builder()
///     .config(ProxyConfig::default())
///     .handler(EchoHandler)
///     .build()
///     .await?;
/// server.run().await
/// # }
/// ```
pub struct TesseraServerBuilder<H = EchoHandler> {
    config: ProxyConfig,
    registry: Option<PacketRegistry>,
    handler: H,
}

impl TesseraServerBuilder {
    /// Creates a builder with default config, the built-in packets and
    /// the [`EchoHandler`].
    pub fn new() -> Self {
        Self {
            config: ProxyConfig::default(),
            registry: None,
            handler: EchoHandler,
        }
    }
}

impl Default for TesseraServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: PacketHandler> TesseraServerBuilder<H> {
    pub fn config(mut self, config: ProxyConfig) -> Self {
        self.config = config;
        self
    }

    /// Overrides the address from the config.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Replaces the built-in packet set.
    pub fn registry(mut self, registry: PacketRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn handler<G: PacketHandler>(self, handler: G) -> TesseraServerBuilder<G> {
        TesseraServerBuilder {
            config: self.config,
            registry: self.registry,
            handler,
        }
    }

    /// Checks the config and binds the listener.
    pub async fn build(self) -> Result<TesseraServer<H>, TesseraError> {
        self.config.validate()?;
        let transport = TcpTransport::bind(self.config.bind_addr.as_str())
            .await?
            .with_max_frame_size(self.config.max_frame_size);

        let state = Arc::new(ServerState {
            handler: self.handler,
            registry: Arc::new(self.registry.unwrap_or_else(PacketRegistry::builtin)),
            idle_timeout: self.config.idle_timeout(),
            max_frame_size: self.config.max_frame_size,
        });

        Ok(TesseraServer { transport, state })
    }
}

/// A bound Tessera server.
///
/// Call [`run()`](Self::run) to start accepting connections.
pub struct TesseraServer<H = EchoHandler> {
    transport: TcpTransport,
    state: Arc<ServerState<H>>,
}

impl TesseraServer {
    /// Creates a new builder.
    pub fn builder() -> TesseraServerBuilder {
        TesseraServerBuilder::new()
    }
}

impl<H: PacketHandler> TesseraServer<H> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> Result<SocketAddr, TesseraError> {
        Ok(self.transport.local_addr()?)
    }

    /// Runs the accept loop until the process is terminated.
    pub async fn run(self) -> Result<(), TesseraError> {
        self.run_until(pending()).await
    }

    /// Runs the accept loop until `shutdown` completes.
    ///
    /// Connections already accepted keep running in their own tasks.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), TesseraError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "Tessera proxy running");
        tokio::pin!(shutdown);

        loop {
            let accepted = tokio::select! {
                () = &mut shutdown => break,
                accepted = self.transport.accept() => accepted,
            };
            match accepted {
                Ok(conn) => {
                    let state = Arc::clone(&self.state);
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(conn, state).await {
                            tracing::debug!(error = %e, "connection ended with error");
                        }
                    });
                }
                Err(TransportError::Shutdown) => break,
                Err(e) => {
                    tracing::error!(error = %e, "accept failed");
                }
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("Tessera proxy stopped");
        Ok(())
    }
}
