use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::models::SessionListing;

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct Ticket {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub show_session_id: i64,
    pub reservation_id: i64,
}

/// Бронирование вместе с билетами в порядке запроса.
#[derive(Debug, Clone, Serialize)]
pub struct Reservation {
    pub id: i64,
    pub user_id: i64,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<Ticket>,
}

/// Одно место из пакета бронирования, как его прислал клиент.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TicketRequest {
    pub row: i32,
    pub seat: i32,
    pub show_session: i64,
}

/// Билет, прошедший проверку и готовый к записи.
#[derive(Debug, Clone, Copy)]
pub struct NewTicket {
    pub row: i32,
    pub seat: i32,
    pub show_session_id: i64,
    pub reservation_id: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct TicketListing {
    pub id: i64,
    pub row: i32,
    pub seat: i32,
    pub show_session: SessionListing,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReservationListing {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub tickets: Vec<TicketListing>,
}
