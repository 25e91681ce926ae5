pub mod cache;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod filters;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::error;

use crate::cache::CacheService;
use crate::config::Config;
use crate::services::{CatalogService, LedgerService, SessionService};
use crate::store::Store;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub cache: Option<CacheService>,
    pub config: Config,
    pub catalog: CatalogService,
    pub sessions: SessionService,
    pub ledger: LedgerService,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, cache: Option<CacheService>, config: Config) -> Arc<Self> {
        Arc::new(Self {
            catalog: CatalogService::new(store.clone()),
            sessions: SessionService::new(store.clone()),
            ledger: LedgerService::new(store.clone()),
            store,
            cache,
            config,
        })
    }
}

/// Полный роутер приложения: служебные маршруты и API под `/api`.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(|| async { "Planetarium API v1.0" }))
        .route("/health", get(health))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({ "status": "ok", "environment": state.config.app.environment })),
        ),
        Err(e) => {
            error!("Health check failed: {:?}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable", "environment": state.config.app.environment })),
            )
        }
    }
}
