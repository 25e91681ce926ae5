use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tracing::warn;

use crate::controllers::extract::{AppJson, AppPath, AppQuery};
use crate::error::AppError;
use crate::filters::SessionFilter;
use crate::middleware::AdminUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/show_sessions", get(list_sessions).post(create_session))
        .route("/show_sessions/{id}", get(get_session))
        .route("/show_sessions/{id}/available_seats", get(available_seats))
}

#[derive(Debug, Deserialize)]
struct SessionsQuery {
    date: Option<String>,
    astronomy_show: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    astronomy_show: i64,
    planetarium_dome: i64,
    show_time: Option<DateTime<Utc>>,
}

fn with_cache_header(mut response: Response, status: &'static str) -> Response {
    response
        .headers_mut()
        .insert("x-cache", HeaderValue::from_static(status));
    response
}

// GET /api/show_sessions
async fn list_sessions(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<SessionsQuery>,
) -> Result<Response, AppError> {
    let filter = SessionFilter::from_params(params.date.as_deref(), params.astronomy_show.as_deref())?;
    // Без поколения (Redis недоступен) кеш для этого запроса не используем
    let cached = match &state.cache {
        Some(cache) => cache
            .sessions_key(&filter.cache_key())
            .await
            .ok()
            .map(|key| (cache, key)),
        None => None,
    };

    // 1. Пытаемся отдать готовый JSON из кеша
    if let Some((cache, key)) = &cached {
        if let Ok(Some(cached_json)) = cache.get_cached_sessions(key).await {
            let response = ([(header::CONTENT_TYPE, "application/json")], cached_json).into_response();
            return Ok(with_cache_header(response, "HIT"));
        }
    }

    // 2. Промах: считаем из хранилища и кладём в кеш под тем поколением,
    // которое было до чтения
    let listings = state.sessions.list_sessions(&filter).await?;
    if let Some((cache, key)) = &cached {
        if let Ok(json) = serde_json::to_string(&listings) {
            if let Err(e) = cache.cache_sessions(key, &json).await {
                warn!("Failed to cache session listings: {:?}", e);
            }
        }
    }

    Ok(with_cache_header(Json(listings).into_response(), "MISS"))
}

// POST /api/show_sessions
async fn create_session(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppJson(req): AppJson<CreateSessionRequest>,
) -> Result<impl IntoResponse, AppError> {
    let session = state
        .sessions
        .create_session(req.astronomy_show, req.planetarium_dome, req.show_time)
        .await?;

    if let Some(cache) = &state.cache {
        cache.invalidate_sessions().await;
    }
    Ok((StatusCode::CREATED, Json(session)))
}

// GET /api/show_sessions/{id}
async fn get_session(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.sessions.get_session(id).await?))
}

// GET /api/show_sessions/{id}/available_seats
async fn available_seats(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.sessions.available_seats(id).await?))
}
