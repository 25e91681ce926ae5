use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::extract::AppJson;
use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/show_themes", get(list_themes).post(create_theme))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateThemeRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
}

async fn list_themes(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.list_themes().await?))
}

async fn create_theme(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppJson(req): AppJson<CreateThemeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let theme = state.catalog.create_theme(req.name.trim()).await?;
    Ok((StatusCode::CREATED, Json(theme)))
}
