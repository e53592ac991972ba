//! Server builder and runner

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    routing::{get, patch, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::Authenticator;
use crate::broadcaster::NotificationBroadcaster;
use crate::gateway::NotificationGateway;
use crate::handler;
use crate::store::{NotificationStore, UserDirectory};
use crate::token::{SigningSecret, TokenService};
use crate::ws;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    pub gateway: Arc<NotificationGateway>,
    pub authenticator: Arc<Authenticator>,
    pub tokens: Arc<TokenService>,
    pub directory: Arc<dyn UserDirectory>,
    pub broadcaster: NotificationBroadcaster,
    /// Lifetime of tokens issued at login
    pub token_ttl: chrono::Duration,
}

/// Server configuration and runner
pub struct Server {
    port: u16,
    state: AppState,
    prune_interval: Duration,
}

impl Server {
    /// Create a new server builder
    pub fn builder() -> ServerBuilder {
        ServerBuilder::default()
    }

    /// The wired application state, for embedding the router elsewhere.
    pub fn state(&self) -> AppState {
        self.state.clone()
    }

    /// Run the server
    pub async fn run(self) -> anyhow::Result<()> {
        let cancel = CancellationToken::new();

        tracing::info!(port = self.port, "Starting notification gateway");

        // Sweep subscriptions whose connection died without unsubscribing
        let prune_broadcaster = self.state.broadcaster.clone();
        let prune_cancel = cancel.clone();
        let prune_interval = self.prune_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(prune_interval);
            loop {
                tokio::select! {
                    _ = prune_cancel.cancelled() => break,
                    _ = interval.tick() => {
                        let before = prune_broadcaster.subscriber_count();
                        prune_broadcaster.prune_closed();
                        let after = prune_broadcaster.subscriber_count();
                        tracing::debug!(
                            subscriptions = after,
                            pruned = before.saturating_sub(after),
                            "Subscription sweep"
                        );
                    }
                }
            }
        });

        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        tracing::info!("Listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;

        let cancel_for_shutdown = cancel.clone();
        let shutdown_signal = async move {
            let ctrl_c = async {
                tokio::signal::ctrl_c()
                    .await
                    .expect("Failed to install Ctrl+C handler");
            };

            #[cfg(unix)]
            let terminate = async {
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("Failed to install SIGTERM handler")
                    .recv()
                    .await;
            };

            #[cfg(not(unix))]
            let terminate = std::future::pending::<()>();

            tokio::select! {
                _ = ctrl_c => tracing::info!("Received Ctrl+C"),
                _ = terminate => tracing::info!("Received SIGTERM"),
            }

            cancel_for_shutdown.cancel();
        };

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await?;

        tracing::info!("Server shutdown complete");
        Ok(())
    }
}

/// Build the full API router over `state`
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/ready", get(|| async { "READY" }))
        .route("/api/authentication/login", post(handler::login))
        .route("/api/authentication/verify", get(handler::verify))
        .route(
            "/api/notifications",
            get(handler::index).post(handler::create),
        )
        .route(
            "/api/notifications/{id}",
            get(handler::show)
                .put(handler::update)
                .patch(handler::update)
                .delete(handler::destroy),
        )
        .route(
            "/api/notifications/{id}/mark_read",
            patch(handler::mark_read),
        )
        .route("/cable", get(ws::cable_connect))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builder for Server
pub struct ServerBuilder {
    port: u16,
    store: Option<Arc<dyn NotificationStore>>,
    directory: Option<Arc<dyn UserDirectory>>,
    secret: SigningSecret,
    token_ttl_hours: i64,
    prune_interval: Duration,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self {
            port: 8080,
            store: None,
            directory: None,
            secret: SigningSecret::Fallback,
            token_ttl_hours: 24,
            prune_interval: Duration::from_secs(30),
        }
    }
}

impl ServerBuilder {
    /// Set the server port
    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the notification record store
    pub fn store(mut self, store: Arc<dyn NotificationStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the user directory
    pub fn directory(mut self, directory: Arc<dyn UserDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Set the token signing secret
    pub fn secret(mut self, secret: SigningSecret) -> Self {
        self.secret = secret;
        self
    }

    /// Lifetime of tokens issued at login (default 24 hours)
    pub fn token_ttl_hours(mut self, hours: i64) -> Self {
        self.token_ttl_hours = hours;
        self
    }

    /// Interval of the dead-subscription sweep
    pub fn prune_interval(mut self, interval: Duration) -> Self {
        self.prune_interval = interval;
        self
    }

    /// Build the server
    pub fn build(self) -> anyhow::Result<Server> {
        let store = self
            .store
            .ok_or_else(|| anyhow::anyhow!("Store is required"))?;
        let directory = self
            .directory
            .ok_or_else(|| anyhow::anyhow!("Directory is required"))?;

        if matches!(self.secret, SigningSecret::Configured(_)) {
            tracing::info!("Token signing secret configured");
        }

        let broadcaster = NotificationBroadcaster::new();
        let tokens = Arc::new(TokenService::new(self.secret, directory.clone()));
        let authenticator = Arc::new(Authenticator::new(tokens.clone(), directory.clone()));
        let gateway = Arc::new(NotificationGateway::new(store, broadcaster.clone()));

        Ok(Server {
            port: self.port,
            prune_interval: self.prune_interval,
            state: AppState {
                gateway,
                authenticator,
                tokens,
                directory,
                broadcaster,
                token_ttl: chrono::Duration::hours(self.token_ttl_hours),
            },
        })
    }
}
