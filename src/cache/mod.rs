use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{info, warn};

use crate::{redis_client::RedisClient, store::Store};

pub mod catalog;

/// Откуда пришёл ответ каталога; уходит клиенту в заголовке `X-Cache`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Hit,
    Miss,
    /// Redis не настроен, чтение напрямую из хранилища
    Bypass,
}

impl CacheStatus {
    pub fn as_header(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss => "MISS",
            CacheStatus::Bypass => "BYPASS",
        }
    }
}

/// Кеш только для чтения каталога. Реестр бронирований через него не ходит.
#[derive(Clone)]
pub struct CacheService {
    redis: Option<RedisClient>,
    store: Arc<dyn Store>,
    ttl_secs: u64,
}

impl CacheService {
    pub fn new(redis: Option<RedisClient>, store: Arc<dyn Store>, ttl_secs: u64) -> Self {
        Self { redis, store, ttl_secs }
    }

    // Прогрев кеша при старте
    pub async fn warmup_cache(&self) {
        if self.redis.is_none() {
            return;
        }
        info!("Starting catalog cache warmup...");

        match self.get_movies().await {
            Ok((movies, _)) => {
                for movie in &movies {
                    let _ = self.get_shows(movie.id).await;
                }
                info!("Catalog cache warmup done, {} movies", movies.len());
            }
            Err(e) => warn!("Catalog cache warmup failed: {:?}", e),
        }
    }

    // === Работа с Redis ===

    async fn read<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let redis = self.redis.as_ref()?;
        let mut conn = redis.conn.clone();

        let res: redis::RedisResult<Option<String>> =
            redis::cmd("GET").arg(key).query_async(&mut conn).await;
        let data = match res {
            Ok(data) => data,
            Err(e) => {
                warn!("redis GET {} failed, falling back to store: {:?}", key, e);
                return None;
            }
        };

        data.and_then(|raw| match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("cached value under {} is unreadable: {:?}", key, e);
                None
            }
        })
    }

    async fn write<T: Serialize + ?Sized>(&self, key: &str, value: &T) {
        let Some(redis) = self.redis.as_ref() else {
            return;
        };
        let data = match serde_json::to_string(value) {
            Ok(data) => data,
            Err(e) => {
                warn!("failed to serialize {} for cache: {:?}", key, e);
                return;
            }
        };

        let mut conn = redis.conn.clone();
        let res: redis::RedisResult<()> = redis::cmd("SET")
            .arg(key)
            .arg(data)
            .arg("EX")
            .arg(self.ttl_secs)
            .query_async(&mut conn)
            .await;
        if let Err(e) = res {
            warn!("redis SET {} failed: {:?}", key, e);
        }
    }
}
