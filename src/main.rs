mod config;

use std::sync::Arc;

use notify_gateway::{MemoryStore, Server, SigningSecret};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::AppConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load()?;

    tracing::info!(
        port = config.server.port,
        token_ttl_hours = config.auth.token_ttl_hours,
        secret_configured = config.auth.jwt_secret.is_some(),
        "Gateway starting"
    );

    let store = Arc::new(MemoryStore::new());
    seed_users(&store, &config);

    Server::builder()
        .port(config.server.port)
        .store(store.clone())
        .directory(store)
        .secret(SigningSecret::from_config(config.auth.jwt_secret.clone()))
        .token_ttl_hours(config.auth.token_ttl_hours)
        .build()?
        .run()
        .await
}

/// The memory backend starts empty; without users nobody can log in.
fn seed_users(store: &MemoryStore, config: &AppConfig) {
    if config.seed_users.is_empty() {
        for i in 1..=3 {
            let user = store.add_user(format!("Test User {i}"), format!("user{i}@example.com"));
            tracing::info!(id = user.id, email = %user.email, "Seeded demo user");
        }
        return;
    }

    for seed in &config.seed_users {
        let user = store.add_user(seed.name.clone(), seed.email.clone());
        tracing::info!(id = user.id, email = %user.email, "Seeded user");
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notifyd=info,notify_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}
