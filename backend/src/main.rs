use anyhow::Context;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use identity_backend::{
    build_router,
    config::{mask_secret, Config},
    db::{
        connection::{create_pool, run_migrations},
        redis::create_redis_pool,
    },
    repositories::{MemoryStore, PgStore},
    services::{ClientRegistry, IdentityCache, RedisCacheStore},
    utils::{encryption::CacheCipher, keys::KeyMaterial},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "identity_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::load()?;
    tracing::info!(
        database_url = %config.database_url.as_deref().map(mask_secret).unwrap_or_default(),
        jwt_issuer = %config.jwt_issuer,
        jwt_audience = %config.jwt_audience,
        access_token_ttl_seconds = config.access_token_ttl_seconds,
        refresh_token_ttl_seconds = config.refresh_token_ttl_seconds,
        max_sessions_per_principal = config.max_sessions_per_principal.get(),
        client_header = %config.client_header,
        cache = ?config.cache,
        "Loaded configuration from environment/.env"
    );

    let keys = KeyMaterial::load(&config.jwt_private_key_path, &config.jwt_public_key_path)
        .context("failed to load token signing keys")?;
    let clients = ClientRegistry::load(&config.clients_file, &config.client_header)?;
    tracing::info!(clients = clients.len(), "Client registry loaded");

    let cache = match create_redis_pool(&config.cache).await? {
        Some(pool) => {
            let key = config
                .cache
                .encryption_key
                .as_deref()
                .context("CACHE_ENCRYPTION_KEY is required when caching is enabled")?;
            let cipher = CacheCipher::new(key.as_bytes())?;
            IdentityCache::new(Arc::new(RedisCacheStore::new(pool)), cipher, &config.cache)
        }
        None => IdentityCache::disabled(),
    };

    let keys = Arc::new(keys);
    let state = match config.database_url.clone() {
        Some(url) => {
            let pool = create_pool(&url, config.store_timeout()).await?;
            run_migrations(&pool).await?;
            AppState::new(config, keys, Arc::new(PgStore::new(pool)), clients, cache)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-process store; data will not persist");
            AppState::new(config, keys, Arc::new(MemoryStore::new()), clients, cache)
        }
    };

    let addr = state.config.bind_addr.clone();
    let app = build_router(state);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}
