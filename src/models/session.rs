use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::{AstronomyShow, Dome};

/// Сеанс показа: шоу в конкретном куполе в конкретное время.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
pub struct ShowSession {
    pub id: i64,
    pub astronomy_show_id: i64,
    pub planetarium_dome_id: i64,
    pub show_time: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewShowSession {
    pub astronomy_show_id: i64,
    pub planetarium_dome_id: i64,
    pub show_time: DateTime<Utc>,
}

impl NewShowSession {
    pub fn new(
        astronomy_show_id: i64,
        planetarium_dome_id: i64,
        show_time: Option<DateTime<Utc>>,
    ) -> Result<Self, AppError> {
        let show_time = show_time
            .ok_or_else(|| AppError::Validation("show_time is required".to_string()))?;
        Ok(Self {
            astronomy_show_id,
            planetarium_dome_id,
            show_time,
        })
    }
}

/// Проекция сеанса для списков: денормализованные поля шоу и купола
/// плюс вычисленное количество свободных мест.
///
/// `tickets_available` не ограничивается снизу нулём: отрицательное
/// значение означает рассогласованный реестр и должно быть видно.
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct SessionListing {
    pub id: i64,
    pub show_time: DateTime<Utc>,
    pub astronomy_show_id: i64,
    pub astronomy_show: String,
    pub astronomy_show_image: Option<String>,
    pub planetarium_dome_name: String,
    pub planetarium_dome_capacity: i64,
    pub tickets_available: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromRow, Serialize, Deserialize)]
pub struct SeatPosition {
    pub row: i32,
    pub seat: i32,
}

/// Детальная карточка сеанса с занятыми местами.
#[derive(Debug, Clone, Serialize)]
pub struct SessionDetail {
    pub id: i64,
    pub show_time: DateTime<Utc>,
    pub astronomy_show: AstronomyShow,
    pub planetarium_dome: Dome,
    pub taken_places: Vec<SeatPosition>,
}
