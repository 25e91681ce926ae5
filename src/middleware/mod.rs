use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::AppState;

/// Пользователь, прошедший Basic Auth.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthUser {
    pub user_id: i64,
    pub email: String,
    pub is_staff: bool,
}

/// Пользователь с правами персонала: управляет каталогом и расписанием.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// Достаёт `email:password` из заголовка `Authorization: Basic ...`.
pub fn basic_credentials(parts: &Parts) -> Option<(String, String)> {
    let auth_header = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())?;

    let encoded = auth_header.strip_prefix("Basic ")?;
    let decoded = general_purpose::STANDARD.decode(encoded.trim()).ok()?;
    let credentials = String::from_utf8(decoded).ok()?;

    // Разделяем email:password
    let (email, password) = credentials.split_once(':')?;
    if email.is_empty() {
        return None;
    }
    Some((email.to_string(), password.to_string()))
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let (email, password) = basic_credentials(parts).ok_or(AppError::Unauthorized)?;

        // Сначала пробуем кеш
        if let Some(cache) = &state.cache {
            if let Ok(Some(cached)) = cache.get_cached_auth_user(&email, &password).await {
                if let Ok(user) = serde_json::from_str::<AuthUser>(&cached) {
                    debug!(user_id = user.user_id, "Auth cache hit");
                    return Ok(user);
                }
            }
        }

        let user = state
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AppError::Unauthorized)?;

        // bcrypt нагружает CPU, уводим с async-потоков
        let candidate = user.clone();
        let attempt = password.clone();
        let verified = tokio::task::spawn_blocking(move || candidate.verify_password(&attempt))
            .await
            .unwrap_or(false);
        if !verified {
            warn!("Rejected credentials for {}", email);
            return Err(AppError::Unauthorized);
        }

        let auth_user = AuthUser {
            user_id: user.id,
            email: user.email,
            is_staff: user.is_staff,
        };

        if let Some(cache) = &state.cache {
            if let Ok(json) = serde_json::to_string(&auth_user) {
                if let Err(e) = cache.cache_auth_user(&email, &password, &json).await {
                    warn!("Failed to cache auth user: {:?}", e);
                }
            }
        }

        Ok(auth_user)
    }
}

impl FromRequestParts<Arc<AppState>> for AdminUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let user = AuthUser::from_request_parts(parts, state).await?;
        if !user.is_staff {
            return Err(AppError::Forbidden);
        }
        Ok(AdminUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with(header_value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/api/reservations");
        if let Some(value) = header_value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[test]
    fn decodes_basic_credentials() {
        let encoded = general_purpose::STANDARD.encode("astro@example.com:pa:ss");
        let parts = parts_with(Some(&format!("Basic {}", encoded)));
        assert_eq!(
            basic_credentials(&parts),
            Some(("astro@example.com".to_string(), "pa:ss".to_string()))
        );
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        assert!(basic_credentials(&parts_with(None)).is_none());
        assert!(basic_credentials(&parts_with(Some("Bearer token"))).is_none());
        assert!(basic_credentials(&parts_with(Some("Basic !!!"))).is_none());

        let no_colon = general_purpose::STANDARD.encode("astro@example.com");
        assert!(basic_credentials(&parts_with(Some(&format!("Basic {}", no_colon)))).is_none());
    }
}
