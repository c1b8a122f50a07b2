pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use store::{PgStore, Store};

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: cache::CacheService,
    pub config: config::Config,
}

impl AppState {
    /// Production-состояние: Postgres с миграциями и, если задан, Redis для каталога.
    pub async fn connect(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database).await?;
        info!("Database connected");

        db.run_migrations().await?;

        let store: Arc<dyn Store> = Arc::new(PgStore::new(db, config.booking.lock_timeout_ms));

        let redis = match config.redis.url.as_deref() {
            Some(url) => Some(redis_client::RedisClient::connect(url).await?),
            None => {
                info!("REDIS_URL not set, catalog cache disabled");
                None
            }
        };

        Ok(Self::with_store(config, store, redis))
    }

    pub fn with_store(
        config: config::Config,
        store: Arc<dyn Store>,
        redis: Option<redis_client::RedisClient>,
    ) -> Arc<Self> {
        let cache = cache::CacheService::new(redis, store.clone(), config.redis.catalog_ttl_secs);
        Arc::new(Self { store, cache, config })
    }
}

/// Полный роутер приложения: служебные маршруты и API под `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Movie Booking API v1.0" }))
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
