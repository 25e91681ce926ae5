use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use crate::controllers::extract::{AppJson, AppPath, AppQuery};
use crate::error::AppError;
use crate::filters::ShowFilter;
use crate::middleware::AdminUser;
use crate::models::NewAstronomyShow;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/astronomy_shows", get(list_shows).post(create_show))
        .route("/astronomy_shows/{id}", get(get_show).delete(delete_show))
        .route("/astronomy_shows/{id}/upload_image", post(upload_image))
}

#[derive(Debug, Deserialize)]
struct ShowsQuery {
    title: Option<String>,
    // Список id через запятую: ?show_themes=1,2
    show_themes: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
struct CreateShowRequest {
    #[validate(length(min = 1, max = 255))]
    title: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    show_themes: Vec<i64>,
}

#[derive(Debug, Deserialize)]
struct UploadImageRequest {
    image: String,
}

// GET /api/astronomy_shows
async fn list_shows(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<ShowsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let filter = ShowFilter::from_params(params.title.as_deref(), params.show_themes.as_deref())?;
    Ok(Json(state.catalog.list_shows(&filter).await?))
}

// POST /api/astronomy_shows
async fn create_show(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppJson(req): AppJson<CreateShowRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let show = state
        .catalog
        .create_show(NewAstronomyShow {
            title: req.title,
            description: req.description,
            show_themes: req.show_themes,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(show)))
}

// GET /api/astronomy_shows/{id}
async fn get_show(
    State(state): State<Arc<AppState>>,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.get_show(id).await?))
}

// DELETE /api/astronomy_shows/{id}
async fn delete_show(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    AppPath(id): AppPath<i64>,
) -> Result<impl IntoResponse, AppError> {
    state.catalog.delete_show(id).await?;
    tracing::info!(astronomy_show_id = id, user_id = admin.user_id, "Show removed by staff");
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/astronomy_shows/{id}/upload_image
async fn upload_image(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppPath(id): AppPath<i64>,
    AppJson(req): AppJson<UploadImageRequest>,
) -> Result<impl IntoResponse, AppError> {
    Ok(Json(state.catalog.upload_image(id, &req.image).await?))
}
