use crate::cache::CacheService;
use redis::AsyncCommands;
use sha2::{Digest, Sha256};

// Успешная проверка bcrypt дорогая, поэтому результат живёт 5 минут
const AUTH_TTL_SECONDS: u64 = 300;

fn auth_key(email: &str, password: &str) -> String {
    format!("auth:{}:{:x}", email, Sha256::digest(password.as_bytes()))
}

impl CacheService {
    /// Сохранить данные авторизованного пользователя в кеш
    pub async fn cache_auth_user(
        &self,
        email: &str,
        password: &str,
        user_data: &str, // JSON сериализованный AuthUser
    ) -> Result<(), redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.set_ex(auth_key(email, password), user_data, AUTH_TTL_SECONDS).await
    }

    /// Получить данные пользователя из кеша авторизации
    pub async fn get_cached_auth_user(
        &self,
        email: &str,
        password: &str,
    ) -> Result<Option<String>, redis::RedisError> {
        let mut conn = self.redis.conn.clone();
        conn.get(auth_key(email, password)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_never_contains_plain_password() {
        let key = auth_key("astro@example.com", "hunter2");
        assert!(key.starts_with("auth:astro@example.com:"));
        assert!(!key.contains("hunter2"));
        assert_eq!(key.len(), "auth:astro@example.com:".len() + 64);
    }
}
