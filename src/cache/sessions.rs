use crate::cache::CacheService;
use redis::AsyncCommands;
use tracing::{debug, warn};

// Поколение списков сеансов. Живёт вне префикса `sessions:`, чтобы
// сброс кеша его не удалял.
const GENERATION_KEY: &str = "session_listings:generation";

/// Ключ списка в конкретном поколении кеша.
pub fn versioned_key(filter_key: &str, generation: u64) -> String {
    format!("{}&gen={}", filter_key, generation)
}

impl CacheService {
    /// Ключ для фильтра в текущем поколении. Запись, посчитанная до сброса,
    /// попадёт под старое поколение, и читать её уже никто не будет.
    pub async fn sessions_key(&self, filter_key: &str) -> Result<String, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        let generation: Option<u64> = conn.get(GENERATION_KEY).await?;
        Ok(versioned_key(filter_key, generation.unwrap_or(0)))
    }

    /// Закешированный JSON списка сеансов по ключу фильтра.
    pub async fn get_cached_sessions(&self, key: &str) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(key).await
    }

    pub async fn cache_sessions(&self, key: &str, value: &str) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(key, value, self.ttl_seconds).await
    }

    /// Сбрасывает все списки сеансов: после новой брони или нового сеанса
    /// количество свободных мест в них устарело.
    pub async fn invalidate_sessions(&self) {
        let mut conn = self.redis.conn.clone();
        let bumped: Result<u64, _> = conn.incr(GENERATION_KEY, 1).await;
        if let Err(e) = bumped {
            warn!("Failed to bump session listings generation: {:?}", e);
        }

        match self.delete_matching("sessions:*").await {
            Ok(count) => debug!(count, "Invalidated session listings cache"),
            Err(e) => warn!("Failed to invalidate session listings cache: {:?}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_generation_never_reuses_a_key() {
        let filter_key = "sessions:date=2024-03-30&show=";
        let before = versioned_key(filter_key, 4);
        let after = versioned_key(filter_key, 5);

        assert_ne!(before, after);
        assert!(before.starts_with("sessions:"));
        assert!(!GENERATION_KEY.starts_with("sessions:"));
    }
}
