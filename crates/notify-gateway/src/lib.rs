//! # Notify Gateway
//!
//! Per-user notification delivery for Rust services.
//!
//! Clients authenticate once, open a persistent WebSocket, and receive push
//! updates whenever a notification belonging to them is created, mutated, or
//! deleted, while the same notifications stay fetchable and mutable over a
//! REST API.
//!
//! ## Features
//!
//! - **Signed identity tokens**: stateless HS256 tokens usable for one-shot
//!   requests and long-lived connections alike
//! - **Strategy-ordered authentication**: bearer/header resolution for API
//!   requests, cookie/query/session resolution for the WebSocket handshake
//! - **Per-user fan-out**: events reach exactly the live subscriptions of
//!   the affected user, and a slow consumer never stalls anyone else
//! - **Pluggable persistence**: implement [`NotificationStore`] and
//!   [`UserDirectory`] over any backend; [`MemoryStore`] ships for
//!   development and tests
//! - **Built-in server**: Axum router, REST endpoints and the `/cable`
//!   WebSocket endpoint behind one builder
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use notify_gateway::{MemoryStore, Server, SigningSecret};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = Arc::new(MemoryStore::new());
//!     store.add_user("Ada", "ada@example.com");
//!
//!     Server::builder()
//!         .port(8080)
//!         .store(store.clone())
//!         .directory(store)
//!         .secret(SigningSecret::from_config(std::env::var("JWT_SECRET").ok()))
//!         .build()?
//!         .run()
//!         .await
//! }
//! ```
//!
//! ## Custom backend
//!
//! ```rust,ignore
//! use notify_gateway::{NotificationStore, UserDirectory};
//! use async_trait::async_trait;
//!
//! struct PgStore { pool: PgPool }
//!
//! #[async_trait]
//! impl NotificationStore for PgStore {
//!     // create / find / update / delete / list_by_owner over your schema
//! }
//! ```

pub mod auth;
mod broadcaster;
mod error;
mod event;
mod gateway;
mod handler;
mod model;
mod server;
pub mod store;
mod token;
mod ws;

// Re-exports
pub use auth::{AuthRequest, Authenticator, HandshakeStrategy, RequestStrategy};
pub use broadcaster::{NotificationBroadcaster, SubscriptionHandle};
pub use error::{Error, Result};
pub use event::{EventPayload, NotificationEvent};
pub use gateway::NotificationGateway;
pub use model::{
    Identity, Notification, NotificationChanges, NotificationId, NotificationPage, PageRequest,
    Pagination, UserId,
};
pub use server::{router, AppState, Server, ServerBuilder};
pub use store::{MemoryStore, NotificationStore, UserDirectory};
pub use token::{Claims, SigningSecret, TokenService, FALLBACK_SECRET};
