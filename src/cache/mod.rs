use crate::redis_client::RedisClient;
use tracing::info;

pub mod auth;
pub mod sessions;

/// Кеш поверх Redis. Любая ошибка Redis трактуется вызывающим кодом как
/// промах: источником истины всегда остаётся хранилище.
#[derive(Clone)]
pub struct CacheService {
    redis: RedisClient,
    ttl_seconds: u64,
}

impl CacheService {
    pub fn new(redis: RedisClient, ttl_seconds: u64) -> Self {
        info!(ttl_seconds, "Redis cache enabled");
        Self { redis, ttl_seconds }
    }

    /// Удаляет все ключи по шаблону, возвращает их количество.
    async fn delete_matching(&self, pattern: &str) -> Result<usize, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let keys: Vec<String> = redis::cmd("KEYS")
            .arg(pattern)
            .query_async(&mut conn)
            .await?;

        if !keys.is_empty() {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.del(key);
            }
            let _: () = pipe.query_async(&mut conn).await?;
        }
        Ok(keys.len())
    }
}
