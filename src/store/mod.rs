//! Хранилище данных планетария.
//!
//! `Store` описывает весь доступ к данным, не навязывая реализацию:
//! `PgStore` работает поверх sqlx/Postgres, `MemoryStore` держит таблицы в
//! памяти и используется в тестах и для локального запуска.
//!
//! Запись билетов идёт только через `LedgerTx`, транзакцию реестра мест.
//! Незафиксированная транзакция при удалении откатывается.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;

use crate::error::{AppError, StoreError};
use crate::filters::{PageRequest, SessionFilter, ShowFilter};
use crate::models::{
    AstronomyShow, Dome, NewAstronomyShow, NewDome, NewShowSession, NewTicket, ReservationListing,
    SeatPosition, SessionListing, ShowSession, ShowTheme, Ticket, User,
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    /// Проверка доступности хранилища для `/health`.
    async fn ping(&self) -> StoreResult<()>;

    // === Пользователи ===
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    // === Купола ===
    async fn insert_dome(&self, dome: &NewDome) -> StoreResult<Dome>;
    async fn get_dome(&self, id: i64) -> StoreResult<Option<Dome>>;
    async fn list_domes(&self) -> StoreResult<Vec<Dome>>;

    // === Темы ===
    async fn insert_theme(&self, name: &str) -> StoreResult<ShowTheme>;
    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>>;
    /// Какие из переданных id тем существуют.
    async fn existing_theme_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>>;

    // === Шоу ===
    async fn insert_show(&self, show: &NewAstronomyShow) -> StoreResult<AstronomyShow>;
    async fn get_show(&self, id: i64) -> StoreResult<Option<AstronomyShow>>;
    /// Шоу по фильтру, без дублей, по алфавиту.
    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShow>>;
    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<Option<AstronomyShow>>;
    async fn delete_show(&self, id: i64) -> StoreResult<bool>;
    async fn count_sessions_for_show(&self, show_id: i64) -> StoreResult<i64>;

    // === Сеансы ===
    async fn insert_session(&self, session: &NewShowSession) -> StoreResult<ShowSession>;
    async fn get_session(&self, id: i64) -> StoreResult<Option<ShowSession>>;
    /// Проекции сеансов по фильтру, от поздних к ранним.
    async fn list_session_listings(&self, filter: &SessionFilter) -> StoreResult<Vec<SessionListing>>;
    async fn session_listing(&self, id: i64) -> StoreResult<Option<SessionListing>>;
    async fn taken_places(&self, session_id: i64) -> StoreResult<Vec<SeatPosition>>;

    // === Бронирования ===
    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>>;
    async fn count_reservations(&self, user_id: i64) -> StoreResult<i64>;
    /// Бронирования пользователя от новых к старым.
    async fn list_reservations(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> StoreResult<Vec<ReservationListing>>;
}

/// Сеанс вместе с геометрией его купола, заблокированный до конца транзакции.
#[derive(Debug, Clone, Copy)]
pub struct LockedSession {
    pub id: i64,
    pub rows: i32,
    pub seats_in_row: i32,
}

/// Транзакция реестра мест.
///
/// Всё, что прочитано после `lock_session`, не меняется параллельными
/// бронированиями этого сеанса до `commit` или отката.
#[async_trait]
pub trait LedgerTx: Send {
    async fn lock_session(&mut self, session_id: i64) -> StoreResult<Option<LockedSession>>;
    async fn taken_seats(&mut self, session_id: i64) -> StoreResult<Vec<SeatPosition>>;
    async fn insert_reservation(
        &mut self,
        user_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<i64>;
    /// Возвращает `StoreError::WriteConflict`, если место уже записано.
    async fn insert_ticket(&mut self, ticket: &NewTicket) -> StoreResult<Ticket>;
    async fn commit(self: Box<Self>) -> StoreResult<()>;
}

/// Выполняет `f` в одной транзакции: фиксирует при `Ok`, откатывает при
/// любой ошибке.
pub async fn with_transaction<T, F>(store: &dyn Store, f: F) -> Result<T, AppError>
where
    T: Send,
    F: for<'t> FnOnce(&'t mut dyn LedgerTx) -> BoxFuture<'t, Result<T, AppError>> + Send,
{
    let mut tx = store.begin().await?;
    let value = f(tx.as_mut()).await?;
    tx.commit().await?;
    Ok(value)
}
