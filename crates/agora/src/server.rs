//! `AgoraServer` builder and accept loop.
//!
//! This is the entry point for running an Agora server. It ties the
//! layers together: axum router → subscription lifecycle → registry, with
//! [`RoomService`] as the producer side feeding the same registry.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agora_broadcast::{BroadcastConfig, EventPublisher, RoomRegistry};
use agora_store::RoomStore;
use agora_transport::TransportError;
use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;

use crate::subscribe::{SUBSCRIBE_ROUTE, subscribe};
use crate::{AgoraError, RoomService, ServerConfig};

/// Shared state handed to every request handler.
pub(crate) struct ServerState<S: RoomStore> {
    pub(crate) store: Arc<S>,
    pub(crate) registry: Arc<RoomRegistry>,
    pub(crate) config: ServerConfig,
    pub(crate) shutdown: CancellationToken,
    /// Tracks upgraded subscriptions so shutdown can wait for them.
    pub(crate) tracker: TaskTracker,
}

/// Builder for configuring and starting an Agora server.
///
/// # Example
///
/// ```rust,ignore
/// use agora::prelude::*;
///
/// let server = AgoraServerBuilder::new()
///     .bind("0.0.0.0:8080")
///     .build(MemoryStore::new())
///     .await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// ```
pub struct AgoraServerBuilder {
    config: ServerConfig,
}

impl AgoraServerBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: ServerConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the address to bind the server to.
    pub fn bind(mut self, addr: &str) -> Self {
        self.config.bind_addr = addr.to_string();
        self
    }

    /// Sets the per-subscriber delivery limits.
    pub fn broadcast_config(mut self, config: BroadcastConfig) -> Self {
        self.config.broadcast = config;
        self
    }

    /// Sets how long a connection may take to reach the upgrade.
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.config.handshake_timeout = timeout;
        self
    }

    /// Binds the listener and wires the store, registry, and publisher.
    pub async fn build<S: RoomStore>(self, store: S) -> Result<AgoraServer<S>, AgoraError> {
        let mut config = self.config;
        config.broadcast = config.broadcast.validated();

        let listener = TcpListener::bind(&config.bind_addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr = %config.bind_addr, "listener bound");
        let store = Arc::new(store);
        let registry = Arc::new(RoomRegistry::new());
        let publisher = Arc::new(EventPublisher::new(Arc::clone(&registry)));

        let state = Arc::new(ServerState {
            store: Arc::clone(&store),
            registry,
            config,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        });

        Ok(AgoraServer {
            listener,
            service: RoomService::new(store, publisher),
            state,
        })
    }
}

impl Default for AgoraServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A bound Agora server.
///
/// Call [`run()`](Self::run) or [`run_until()`](Self::run_until) to start
/// accepting subscriptions. Producers go through [`service()`](Self::service).
pub struct AgoraServer<S: RoomStore> {
    listener: TcpListener,
    service: RoomService<S>,
    state: Arc<ServerState<S>>,
}

impl<S: RoomStore> AgoraServer<S> {
    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    /// The producer API, publishing into this server's registry.
    pub fn service(&self) -> RoomService<S> {
        self.service.clone()
    }

    pub fn registry(&self) -> Arc<RoomRegistry> {
        Arc::clone(&self.state.registry)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }

    /// Cancelling this token stops the server and closes every
    /// subscription.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.state.shutdown.clone()
    }

    /// The HTTP routes: only [`SUBSCRIBE_ROUTE`]. Anything else is a 404,
    /// and a method other than `GET` on the route is a 405.
    pub fn router(&self) -> Router {
        Router::new()
            .route(SUBSCRIBE_ROUTE, get(subscribe::<S>))
            .with_state(Arc::clone(&self.state))
            .layer(TraceLayer::new_for_http())
    }

    /// Runs until the shutdown token is cancelled.
    pub async fn run(self) -> Result<(), AgoraError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Serves requests until `signal` resolves or the shutdown token is
    /// cancelled, then closes every subscription and waits for their
    /// tasks to finish.
    pub async fn run_until<F>(self, signal: F) -> Result<(), AgoraError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self
            .listener
            .local_addr()
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(%addr, "agora server listening");

        let router = self.router();
        let shutdown = self.state.shutdown.clone();
        let stop = async move {
            tokio::select! {
                _ = signal => tracing::info!("shutdown signal received"),
                _ = shutdown.cancelled() => {}
            }
            // Wakes handlers still validating and every live subscription.
            shutdown.cancel();
        };

        axum::serve(self.listener, router)
            .with_graceful_shutdown(stop)
            .await
            .map_err(TransportError::AcceptFailed)?;

        let tracker = &self.state.tracker;
        tracker.close();
        tracing::info!(tasks = tracker.len(), "draining subscriptions");
        tracker.wait().await;

        tracing::info!("agora server stopped");
        Ok(())
    }
}
