//! error.rs
//!
//! Ошибки доменного уровня и их отображение в HTTP-ответы.
//!
//! `StoreError` описывает сбои хранилища, `AppError` описывает таксономию ошибок
//! каталога, сеансов и бронирования, которые видит клиент.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Ошибки слоя хранения.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Нарушено уникальное ограничение `(show_session, row, seat)`.
    #[error("row {row}, seat {seat} of show session {show_session} violates seat uniqueness")]
    WriteConflict {
        show_session: i64,
        row: i32,
        seat: i32,
    },

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Ошибка конкретного билета внутри пакета бронирования.
#[derive(Debug)]
pub struct TicketFault {
    /// Позиция билета в запросе (с нуля).
    pub index: usize,
    pub error: AppError,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("rows and seats_in_row must be positive, got rows={rows}, seats_in_row={seats_in_row}")]
    InvalidGeometry { rows: i32, seats_in_row: i32 },

    #[error("{0}")]
    Validation(String),

    #[error("reservation must contain at least one ticket")]
    EmptyRequest,

    #[error("{entity} with id {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("{field} must be between 1 and {max}")]
    OutOfRange { field: &'static str, max: i32 },

    #[error("row {row}, seat {seat} is already taken for show session {show_session}")]
    SeatTaken {
        show_session: i64,
        row: i32,
        seat: i32,
    },

    /// Гонка, пойманная уникальным индексом. Для клиента это занятое место,
    /// запрос можно повторить.
    #[error("row {row}, seat {seat} of show session {show_session} was taken concurrently, please retry")]
    WriteConflict {
        show_session: i64,
        row: i32,
        seat: i32,
    },

    #[error("invalid tickets: {}", describe_faults(.0))]
    InvalidTickets(Vec<TicketFault>),

    #[error("{entity} with id {id} is still referenced by {dependents} show session(s)")]
    InUse {
        entity: &'static str,
        id: i64,
        dependents: i64,
    },

    #[error("authentication credentials were not provided or are invalid")]
    Unauthorized,

    #[error("staff permissions are required for this action")]
    Forbidden,

    #[error(transparent)]
    Storage(StoreError),
}

fn describe_faults(faults: &[TicketFault]) -> String {
    faults
        .iter()
        .map(|f| format!("ticket {}: {}", f.index, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl AppError {
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        AppError::NotFound { entity, id }
    }

    /// Машиночитаемый код ошибки для клиента.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::InvalidGeometry { .. } => "INVALID_GEOMETRY",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::EmptyRequest => "EMPTY_REQUEST",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::OutOfRange { .. } => "OUT_OF_RANGE",
            AppError::SeatTaken { .. } | AppError::WriteConflict { .. } => "SEAT_TAKEN",
            AppError::InvalidTickets(_) => "INVALID_TICKETS",
            AppError::InUse { .. } => "IN_USE",
            AppError::Unauthorized => "UNAUTHORIZED",
            AppError::Forbidden => "FORBIDDEN",
            AppError::Storage(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidGeometry { .. }
            | AppError::Validation(_)
            | AppError::EmptyRequest
            | AppError::OutOfRange { .. }
            | AppError::SeatTaken { .. }
            | AppError::InvalidTickets(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::WriteConflict { .. } | AppError::InUse { .. } => StatusCode::CONFLICT,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Истина, если запрос отклонён из-за уже занятого места
    /// (в том числе внутри пакета билетов).
    pub fn is_seat_taken(&self) -> bool {
        match self {
            AppError::SeatTaken { .. } | AppError::WriteConflict { .. } => true,
            AppError::InvalidTickets(faults) => faults.iter().any(|f| f.error.is_seat_taken()),
            _ => false,
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::WriteConflict {
                show_session,
                row,
                seat,
            } => AppError::WriteConflict {
                show_session,
                row,
                seat,
            },
            other => AppError::Storage(other),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

// Отказы экстракторов axum отдаём тем же JSON-телом, что и остальные ошибки
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(rejection: QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for AppError {
    fn from(rejection: PathRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let body = match &self {
            AppError::Storage(source) => {
                // Детали хранилища клиенту не отдаём
                tracing::error!("storage failure: {:?}", source);
                json!({
                    "error": "internal storage error",
                    "code": self.code(),
                })
            }
            AppError::InvalidTickets(faults) => {
                let tickets: Vec<_> = faults
                    .iter()
                    .map(|f| {
                        json!({
                            "index": f.index,
                            "code": f.error.code(),
                            "error": f.error.to_string(),
                        })
                    })
                    .collect();
                json!({
                    "error": self.to_string(),
                    "code": self.code(),
                    "tickets": tickets,
                })
            }
            AppError::WriteConflict { .. } => json!({
                "error": self.to_string(),
                "code": self.code(),
                "retryable": true,
            }),
            _ => json!({
                "error": self.to_string(),
                "code": self.code(),
            }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_names_field_and_bound() {
        let err = AppError::OutOfRange { field: "seat", max: 15 };
        assert_eq!(err.to_string(), "seat must be between 1 and 15");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn write_conflict_from_store_is_retryable_seat_taken() {
        let err: AppError = StoreError::WriteConflict {
            show_session: 3,
            row: 5,
            seat: 10,
        }
        .into();

        assert!(err.is_seat_taken());
        assert_eq!(err.code(), "SEAT_TAKEN");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn invalid_tickets_lists_every_fault() {
        let err = AppError::InvalidTickets(vec![
            TicketFault {
                index: 0,
                error: AppError::OutOfRange { field: "row", max: 10 },
            },
            TicketFault {
                index: 2,
                error: AppError::SeatTaken {
                    show_session: 1,
                    row: 5,
                    seat: 10,
                },
            },
        ]);

        let message = err.to_string();
        assert!(message.contains("ticket 0: row must be between 1 and 10"));
        assert!(message.contains("ticket 2: row 5, seat 10 is already taken"));
        assert!(err.is_seat_taken());
    }
}
