pub mod domes;
pub mod extract;
pub mod reservations;
pub mod sessions;
pub mod shows;
pub mod themes;

use axum::Router;
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(domes::routes())
        .merge(themes::routes())
        .merge(shows::routes())
        .merge(sessions::routes())
        .merge(reservations::routes())
}
