use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

use crate::controllers::extract::AppJson;
use crate::error::AppError;
use crate::middleware::AdminUser;
use crate::models::Dome;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/planetarium_domes", get(list_domes).post(create_dome))
}

#[derive(Debug, Deserialize, Validate)]
struct CreateDomeRequest {
    #[validate(length(min = 1, max = 255))]
    name: String,
    rows: i32,
    seats_in_row: i32,
}

#[derive(Debug, Serialize)]
struct DomeResponse {
    id: i64,
    name: String,
    rows: i32,
    seats_in_row: i32,
    capacity: i64,
}

impl From<Dome> for DomeResponse {
    fn from(dome: Dome) -> Self {
        Self {
            capacity: dome.capacity(),
            id: dome.id,
            name: dome.name,
            rows: dome.rows,
            seats_in_row: dome.seats_in_row,
        }
    }
}

// GET /api/planetarium_domes
async fn list_domes(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, AppError> {
    let domes = state.catalog.list_domes().await?;
    Ok(Json(domes.into_iter().map(DomeResponse::from).collect::<Vec<_>>()))
}

// POST /api/planetarium_domes
async fn create_dome(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    AppJson(req): AppJson<CreateDomeRequest>,
) -> Result<impl IntoResponse, AppError> {
    req.validate()?;
    let dome = state
        .catalog
        .create_dome(&req.name, req.rows, req.seats_in_row)
        .await?;
    Ok((StatusCode::CREATED, Json(DomeResponse::from(dome))))
}
