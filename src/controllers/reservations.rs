use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::controllers::extract::{AppJson, AppQuery};
use crate::error::AppError;
use crate::filters::PageRequest;
use crate::middleware::AuthUser;
use crate::models::TicketRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/reservations", get(list_reservations).post(create_reservation))
}

#[derive(Debug, Deserialize)]
struct ReservationsQuery {
    page: Option<u32>,
    page_size: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct CreateReservationRequest {
    #[serde(default)]
    tickets: Vec<TicketRequest>,
}

// GET /api/reservations
async fn list_reservations(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppQuery(params): AppQuery<ReservationsQuery>,
) -> Result<impl IntoResponse, AppError> {
    let page = PageRequest::new(params.page, params.page_size);
    Ok(Json(state.ledger.list_reservations(user.user_id, page).await?))
}

// POST /api/reservations
async fn create_reservation(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    AppJson(req): AppJson<CreateReservationRequest>,
) -> Result<impl IntoResponse, AppError> {
    let reservation = state
        .ledger
        .create_reservation(user.user_id, req.tickets)
        .await?;

    // Остаток мест в закешированных списках сеансов больше не верен
    if let Some(cache) = &state.cache {
        cache.invalidate_sessions().await;
    }
    Ok((StatusCode::CREATED, Json(reservation)))
}
