//! Хранилище поверх Postgres.
//!
//! Уникальность мест держит индекс `tickets_session_seat_unique`, а
//! транзакция бронирования блокирует строки сеансов через `FOR UPDATE`,
//! так что параллельные брони одного сеанса выполняются по очереди.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, Postgres, Transaction};

use crate::database::Database;
use crate::error::StoreError;
use crate::filters::{PageRequest, SessionFilter, ShowFilter};
use crate::models::{
    AstronomyShow, Dome, NewAstronomyShow, NewDome, NewShowSession, NewTicket, ReservationListing,
    SeatPosition, SessionListing, ShowSession, ShowTheme, Ticket, TicketListing, User,
};
use crate::store::{LedgerTx, LockedSession, Store, StoreResult};

// Общая часть запросов проекции сеанса
const SESSION_LISTING_SELECT: &str = r#"
    SELECT
        ss.id,
        ss.show_time,
        a.id AS astronomy_show_id,
        a.title AS astronomy_show,
        a.image AS astronomy_show_image,
        d.name AS planetarium_dome_name,
        d.rows::bigint * d.seats_in_row AS planetarium_dome_capacity,
        d.rows::bigint * d.seats_in_row
            - (SELECT COUNT(*) FROM tickets t WHERE t.show_session_id = ss.id) AS tickets_available
    FROM show_sessions ss
    JOIN astronomy_shows a ON a.id = ss.astronomy_show_id
    JOIN planetarium_domes d ON d.id = ss.planetarium_dome_id
"#;

#[derive(FromRow)]
struct ShowRow {
    id: i64,
    title: String,
    description: String,
    image: Option<String>,
}

#[derive(FromRow)]
struct ShowThemeRow {
    astronomy_show_id: i64,
    id: i64,
    name: String,
}

#[derive(FromRow)]
struct ReservationRow {
    id: i64,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct TicketListingRow {
    ticket_id: i64,
    row: i32,
    seat: i32,
    reservation_id: i64,
    #[sqlx(flatten)]
    show_session: SessionListing,
}

#[derive(Clone)]
pub struct PgStore {
    db: Database,
}

impl PgStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Подтягивает темы для набора шоу одним запросом.
    async fn attach_themes(&self, rows: Vec<ShowRow>) -> StoreResult<Vec<AstronomyShow>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let theme_rows = sqlx::query_as::<_, ShowThemeRow>(
            r#"
            SELECT st.astronomy_show_id, t.id, t.name
            FROM astronomy_show_themes st
            JOIN show_themes t ON t.id = st.show_theme_id
            WHERE st.astronomy_show_id = ANY($1)
            ORDER BY t.id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.db.pool)
        .await?;

        let mut themes: HashMap<i64, Vec<ShowTheme>> = HashMap::new();
        for row in theme_rows {
            themes
                .entry(row.astronomy_show_id)
                .or_default()
                .push(ShowTheme { id: row.id, name: row.name });
        }

        Ok(rows
            .into_iter()
            .map(|r| AstronomyShow {
                show_themes: themes.remove(&r.id).unwrap_or_default(),
                id: r.id,
                title: r.title,
                description: r.description,
                image: r.image,
            })
            .collect())
    }

    async fn show_by_id(&self, id: i64) -> StoreResult<Option<AstronomyShow>> {
        let row = sqlx::query_as::<_, ShowRow>(
            "SELECT id, title, description, image FROM astronomy_shows WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?;

        match row {
            Some(row) => Ok(self.attach_themes(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(self.db.ping().await?)
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        Ok(sqlx::query_as::<_, User>(
            "SELECT id, email, password_hash, is_staff, is_active
             FROM users
             WHERE email = $1 AND is_active = true",
        )
        .bind(email)
        .fetch_optional(&self.db.pool)
        .await?)
    }

    async fn insert_dome(&self, dome: &NewDome) -> StoreResult<Dome> {
        Ok(sqlx::query_as::<_, Dome>(
            "INSERT INTO planetarium_domes (name, rows, seats_in_row)
             VALUES ($1, $2, $3)
             RETURNING id, name, rows, seats_in_row",
        )
        .bind(&dome.name)
        .bind(dome.geometry.rows())
        .bind(dome.geometry.seats_in_row())
        .fetch_one(&self.db.pool)
        .await?)
    }

    async fn get_dome(&self, id: i64) -> StoreResult<Option<Dome>> {
        Ok(sqlx::query_as::<_, Dome>(
            "SELECT id, name, rows, seats_in_row FROM planetarium_domes WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?)
    }

    async fn list_domes(&self) -> StoreResult<Vec<Dome>> {
        Ok(sqlx::query_as::<_, Dome>(
            "SELECT id, name, rows, seats_in_row FROM planetarium_domes ORDER BY id",
        )
        .fetch_all(&self.db.pool)
        .await?)
    }

    async fn insert_theme(&self, name: &str) -> StoreResult<ShowTheme> {
        Ok(sqlx::query_as::<_, ShowTheme>(
            "INSERT INTO show_themes (name) VALUES ($1) RETURNING id, name",
        )
        .bind(name)
        .fetch_one(&self.db.pool)
        .await?)
    }

    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>> {
        Ok(sqlx::query_as::<_, ShowTheme>("SELECT id, name FROM show_themes ORDER BY id")
            .fetch_all(&self.db.pool)
            .await?)
    }

    async fn existing_theme_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT id FROM show_themes WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&self.db.pool)
            .await?)
    }

    async fn insert_show(&self, show: &NewAstronomyShow) -> StoreResult<AstronomyShow> {
        let mut tx = self.db.pool.begin().await?;

        let id = sqlx::query_scalar::<_, i64>(
            "INSERT INTO astronomy_shows (title, description) VALUES ($1, $2) RETURNING id",
        )
        .bind(&show.title)
        .bind(&show.description)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO astronomy_show_themes (astronomy_show_id, show_theme_id)
             SELECT $1, UNNEST($2::bigint[])
             ON CONFLICT DO NOTHING",
        )
        .bind(id)
        .bind(&show.show_themes)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.show_by_id(id)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))
    }

    async fn get_show(&self, id: i64) -> StoreResult<Option<AstronomyShow>> {
        self.show_by_id(id).await
    }

    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShow>> {
        // EXISTS вместо JOIN: шоу с несколькими подходящими темами не дублируется
        let rows = sqlx::query_as::<_, ShowRow>(
            r#"
            SELECT s.id, s.title, s.description, s.image
            FROM astronomy_shows s
            WHERE ($1::text IS NULL OR s.title ILIKE $1 ESCAPE '\')
              AND (
                cardinality($2::bigint[]) = 0
                OR EXISTS (
                    SELECT 1 FROM astronomy_show_themes st
                    WHERE st.astronomy_show_id = s.id AND st.show_theme_id = ANY($2)
                )
              )
            ORDER BY s.title, s.id
            "#,
        )
        .bind(filter.title_pattern())
        .bind(&filter.show_themes)
        .fetch_all(&self.db.pool)
        .await?;

        self.attach_themes(rows).await
    }

    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<Option<AstronomyShow>> {
        let updated = sqlx::query("UPDATE astronomy_shows SET image = $2 WHERE id = $1")
            .bind(id)
            .bind(image)
            .execute(&self.db.pool)
            .await?
            .rows_affected();

        if updated == 0 {
            return Ok(None);
        }
        self.show_by_id(id).await
    }

    async fn delete_show(&self, id: i64) -> StoreResult<bool> {
        let deleted = sqlx::query("DELETE FROM astronomy_shows WHERE id = $1")
            .bind(id)
            .execute(&self.db.pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    async fn count_sessions_for_show(&self, show_id: i64) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM show_sessions WHERE astronomy_show_id = $1",
        )
        .bind(show_id)
        .fetch_one(&self.db.pool)
        .await?)
    }

    async fn insert_session(&self, session: &NewShowSession) -> StoreResult<ShowSession> {
        Ok(sqlx::query_as::<_, ShowSession>(
            "INSERT INTO show_sessions (astronomy_show_id, planetarium_dome_id, show_time)
             VALUES ($1, $2, $3)
             RETURNING id, astronomy_show_id, planetarium_dome_id, show_time",
        )
        .bind(session.astronomy_show_id)
        .bind(session.planetarium_dome_id)
        .bind(session.show_time)
        .fetch_one(&self.db.pool)
        .await?)
    }

    async fn get_session(&self, id: i64) -> StoreResult<Option<ShowSession>> {
        Ok(sqlx::query_as::<_, ShowSession>(
            "SELECT id, astronomy_show_id, planetarium_dome_id, show_time
             FROM show_sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.db.pool)
        .await?)
    }

    async fn list_session_listings(&self, filter: &SessionFilter) -> StoreResult<Vec<SessionListing>> {
        let sql = format!(
            "{} WHERE ($1::date IS NULL OR (ss.show_time AT TIME ZONE 'UTC')::date = $1)
                AND ($2::bigint IS NULL OR ss.astronomy_show_id = $2)
              ORDER BY ss.show_time DESC, ss.id DESC",
            SESSION_LISTING_SELECT
        );

        Ok(sqlx::query_as::<_, SessionListing>(&sql)
            .bind(filter.date)
            .bind(filter.astronomy_show)
            .fetch_all(&self.db.pool)
            .await?)
    }

    async fn session_listing(&self, id: i64) -> StoreResult<Option<SessionListing>> {
        let sql = format!("{} WHERE ss.id = $1", SESSION_LISTING_SELECT);
        Ok(sqlx::query_as::<_, SessionListing>(&sql)
            .bind(id)
            .fetch_optional(&self.db.pool)
            .await?)
    }

    async fn taken_places(&self, session_id: i64) -> StoreResult<Vec<SeatPosition>> {
        Ok(sqlx::query_as::<_, SeatPosition>(
            "SELECT row, seat FROM tickets WHERE show_session_id = $1 ORDER BY row, seat",
        )
        .bind(session_id)
        .fetch_all(&self.db.pool)
        .await?)
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let tx = self.db.pool.begin().await?;
        Ok(Box::new(PgLedgerTx { tx }))
    }

    async fn count_reservations(&self, user_id: i64) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM reservations WHERE user_id = $1")
            .bind(user_id)
            .fetch_one(&self.db.pool)
            .await?)
    }

    async fn list_reservations(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> StoreResult<Vec<ReservationListing>> {
        let reservations = sqlx::query_as::<_, ReservationRow>(
            r#"
            SELECT id, created_at
            FROM reservations
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.db.pool)
        .await?;

        if reservations.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i64> = reservations.iter().map(|r| r.id).collect();
        let sql = format!(
            r#"
            SELECT
                t.id AS ticket_id,
                t.row,
                t.seat,
                t.reservation_id,
                listing.*
            FROM tickets t
            JOIN ({}) listing ON listing.id = t.show_session_id
            WHERE t.reservation_id = ANY($1)
            ORDER BY t.id
            "#,
            SESSION_LISTING_SELECT
        );
        let ticket_rows = sqlx::query_as::<_, TicketListingRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.db.pool)
            .await?;

        let mut tickets: HashMap<i64, Vec<TicketListing>> = HashMap::new();
        for row in ticket_rows {
            tickets.entry(row.reservation_id).or_default().push(TicketListing {
                id: row.ticket_id,
                row: row.row,
                seat: row.seat,
                show_session: row.show_session,
            });
        }

        Ok(reservations
            .into_iter()
            .map(|r| ReservationListing {
                tickets: tickets.remove(&r.id).unwrap_or_default(),
                id: r.id,
                created_at: r.created_at,
            })
            .collect())
    }
}

struct PgLedgerTx {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerTx for PgLedgerTx {
    async fn lock_session(&mut self, session_id: i64) -> StoreResult<Option<LockedSession>> {
        let row = sqlx::query_as::<_, (i64, i32, i32)>(
            r#"
            SELECT ss.id, d.rows, d.seats_in_row
            FROM show_sessions ss
            JOIN planetarium_domes d ON d.id = ss.planetarium_dome_id
            WHERE ss.id = $1
            FOR UPDATE OF ss
            "#,
        )
        .bind(session_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        Ok(row.map(|(id, rows, seats_in_row)| LockedSession {
            id,
            rows,
            seats_in_row,
        }))
    }

    async fn taken_seats(&mut self, session_id: i64) -> StoreResult<Vec<SeatPosition>> {
        Ok(sqlx::query_as::<_, SeatPosition>(
            "SELECT row, seat FROM tickets WHERE show_session_id = $1",
        )
        .bind(session_id)
        .fetch_all(&mut *self.tx)
        .await?)
    }

    async fn insert_reservation(
        &mut self,
        user_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        Ok(sqlx::query_scalar::<_, i64>(
            "INSERT INTO reservations (user_id, created_at) VALUES ($1, $2) RETURNING id",
        )
        .bind(user_id)
        .bind(created_at)
        .fetch_one(&mut *self.tx)
        .await?)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> StoreResult<Ticket> {
        let result = sqlx::query_as::<_, Ticket>(
            "INSERT INTO tickets (row, seat, show_session_id, reservation_id)
             VALUES ($1, $2, $3, $4)
             RETURNING id, row, seat, show_session_id, reservation_id",
        )
        .bind(ticket.row)
        .bind(ticket.seat)
        .bind(ticket.show_session_id)
        .bind(ticket.reservation_id)
        .fetch_one(&mut *self.tx)
        .await;

        match result {
            Ok(ticket) => Ok(ticket),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(StoreError::WriteConflict {
                    show_session: ticket.show_session_id,
                    row: ticket.row,
                    seat: ticket.seat,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
