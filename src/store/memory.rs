//! Хранилище в памяти.
//!
//! Повторяет семантику Postgres-схемы: последовательности id, уникальность
//! `(show_session, row, seat)`, порядок выдачи. Транзакция держит
//! `OwnedMutexGuard` на все таблицы, поэтому бронирования выполняются строго
//! по очереди, а изменения видны другим только после `commit`.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::StoreError;
use crate::filters::{PageRequest, SessionFilter, ShowFilter};
use crate::models::{
    AstronomyShow, Dome, NewAstronomyShow, NewDome, NewShowSession, NewTicket, ReservationListing,
    SeatPosition, SessionListing, ShowSession, ShowTheme, Ticket, TicketListing, User,
};
use crate::store::{LedgerTx, LockedSession, Store, StoreResult};

#[derive(Debug, Clone)]
struct ShowRecord {
    id: i64,
    title: String,
    description: String,
    image: Option<String>,
    theme_ids: Vec<i64>,
}

#[derive(Debug, Clone)]
struct ReservationRecord {
    id: i64,
    user_id: i64,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Sequences {
    users: i64,
    domes: i64,
    themes: i64,
    shows: i64,
    sessions: i64,
    reservations: i64,
    tickets: i64,
}

fn next_id(seq: &mut i64) -> i64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default)]
struct Tables {
    seq: Sequences,
    users: BTreeMap<i64, User>,
    domes: BTreeMap<i64, Dome>,
    themes: BTreeMap<i64, ShowTheme>,
    shows: BTreeMap<i64, ShowRecord>,
    sessions: BTreeMap<i64, ShowSession>,
    reservations: BTreeMap<i64, ReservationRecord>,
    tickets: BTreeMap<i64, Ticket>,
    // Уникальный индекс (show_session_id, row, seat)
    seat_index: HashSet<(i64, i32, i32)>,
}

impl Tables {
    fn show_view(&self, record: &ShowRecord) -> AstronomyShow {
        AstronomyShow {
            id: record.id,
            title: record.title.clone(),
            description: record.description.clone(),
            show_themes: record
                .theme_ids
                .iter()
                .filter_map(|id| self.themes.get(id).cloned())
                .collect(),
            image: record.image.clone(),
        }
    }

    fn listing(&self, session: &ShowSession) -> Option<SessionListing> {
        let show = self.shows.get(&session.astronomy_show_id)?;
        let dome = self.domes.get(&session.planetarium_dome_id)?;
        let sold = self
            .tickets
            .values()
            .filter(|t| t.show_session_id == session.id)
            .count() as i64;

        Some(SessionListing {
            id: session.id,
            show_time: session.show_time,
            astronomy_show_id: show.id,
            astronomy_show: show.title.clone(),
            astronomy_show_image: show.image.clone(),
            planetarium_dome_name: dome.name.clone(),
            planetarium_dome_capacity: dome.capacity(),
            tickets_available: dome.capacity() - sold,
        })
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Заводит пользователя; пароль передаётся уже в виде bcrypt-хеша.
    pub async fn insert_user(&self, email: &str, password_hash: &str, is_staff: bool) -> User {
        let mut tables = self.tables.lock().await;
        let user = User {
            id: next_id(&mut tables.seq.users),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            is_staff,
            is_active: true,
        };
        tables.users.insert(user.id, user.clone());
        user
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.email == email && u.is_active)
            .cloned())
    }

    async fn insert_dome(&self, dome: &NewDome) -> StoreResult<Dome> {
        let mut tables = self.tables.lock().await;
        let dome = Dome {
            id: next_id(&mut tables.seq.domes),
            name: dome.name.clone(),
            rows: dome.geometry.rows(),
            seats_in_row: dome.geometry.seats_in_row(),
        };
        tables.domes.insert(dome.id, dome.clone());
        Ok(dome)
    }

    async fn get_dome(&self, id: i64) -> StoreResult<Option<Dome>> {
        Ok(self.tables.lock().await.domes.get(&id).cloned())
    }

    async fn list_domes(&self) -> StoreResult<Vec<Dome>> {
        Ok(self.tables.lock().await.domes.values().cloned().collect())
    }

    async fn insert_theme(&self, name: &str) -> StoreResult<ShowTheme> {
        let mut tables = self.tables.lock().await;
        let theme = ShowTheme {
            id: next_id(&mut tables.seq.themes),
            name: name.to_string(),
        };
        tables.themes.insert(theme.id, theme.clone());
        Ok(theme)
    }

    async fn list_themes(&self) -> StoreResult<Vec<ShowTheme>> {
        Ok(self.tables.lock().await.themes.values().cloned().collect())
    }

    async fn existing_theme_ids(&self, ids: &[i64]) -> StoreResult<Vec<i64>> {
        let tables = self.tables.lock().await;
        Ok(ids
            .iter()
            .copied()
            .filter(|id| tables.themes.contains_key(id))
            .collect())
    }

    async fn insert_show(&self, show: &NewAstronomyShow) -> StoreResult<AstronomyShow> {
        let mut tables = self.tables.lock().await;
        let mut theme_ids = show.show_themes.clone();
        theme_ids.sort_unstable();
        theme_ids.dedup();

        let record = ShowRecord {
            id: next_id(&mut tables.seq.shows),
            title: show.title.clone(),
            description: show.description.clone(),
            image: None,
            theme_ids,
        };
        let view = tables.show_view(&record);
        tables.shows.insert(record.id, record);
        Ok(view)
    }

    async fn get_show(&self, id: i64) -> StoreResult<Option<AstronomyShow>> {
        let tables = self.tables.lock().await;
        Ok(tables.shows.get(&id).map(|r| tables.show_view(r)))
    }

    async fn list_shows(&self, filter: &ShowFilter) -> StoreResult<Vec<AstronomyShow>> {
        let tables = self.tables.lock().await;
        let mut shows: Vec<AstronomyShow> = tables
            .shows
            .values()
            .map(|r| tables.show_view(r))
            .filter(|s| filter.matches(s))
            .collect();
        shows.sort_by(|a, b| a.title.cmp(&b.title).then(a.id.cmp(&b.id)));
        Ok(shows)
    }

    async fn set_show_image(&self, id: i64, image: &str) -> StoreResult<Option<AstronomyShow>> {
        let mut tables = self.tables.lock().await;
        let Some(record) = tables.shows.get_mut(&id) else {
            return Ok(None);
        };
        record.image = Some(image.to_string());
        let record = record.clone();
        Ok(Some(tables.show_view(&record)))
    }

    async fn delete_show(&self, id: i64) -> StoreResult<bool> {
        Ok(self.tables.lock().await.shows.remove(&id).is_some())
    }

    async fn count_sessions_for_show(&self, show_id: i64) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .sessions
            .values()
            .filter(|s| s.astronomy_show_id == show_id)
            .count() as i64)
    }

    async fn insert_session(&self, session: &NewShowSession) -> StoreResult<ShowSession> {
        let mut tables = self.tables.lock().await;
        let session = ShowSession {
            id: next_id(&mut tables.seq.sessions),
            astronomy_show_id: session.astronomy_show_id,
            planetarium_dome_id: session.planetarium_dome_id,
            show_time: session.show_time,
        };
        tables.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn get_session(&self, id: i64) -> StoreResult<Option<ShowSession>> {
        Ok(self.tables.lock().await.sessions.get(&id).cloned())
    }

    async fn list_session_listings(&self, filter: &SessionFilter) -> StoreResult<Vec<SessionListing>> {
        let tables = self.tables.lock().await;
        let mut sessions: Vec<&ShowSession> = tables
            .sessions
            .values()
            .filter(|s| filter.matches(s))
            .collect();
        sessions.sort_by(|a, b| b.show_time.cmp(&a.show_time).then(b.id.cmp(&a.id)));
        Ok(sessions.into_iter().filter_map(|s| tables.listing(s)).collect())
    }

    async fn session_listing(&self, id: i64) -> StoreResult<Option<SessionListing>> {
        let tables = self.tables.lock().await;
        Ok(tables.sessions.get(&id).and_then(|s| tables.listing(s)))
    }

    async fn taken_places(&self, session_id: i64) -> StoreResult<Vec<SeatPosition>> {
        let tables = self.tables.lock().await;
        let mut places: Vec<SeatPosition> = tables
            .tickets
            .values()
            .filter(|t| t.show_session_id == session_id)
            .map(|t| SeatPosition { row: t.row, seat: t.seat })
            .collect();
        places.sort_by_key(|p| (p.row, p.seat));
        Ok(places)
    }

    async fn begin(&self) -> StoreResult<Box<dyn LedgerTx>> {
        let guard = self.tables.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            tables: guard,
            reservations: Vec::new(),
            tickets: Vec::new(),
            seats: HashSet::new(),
        }))
    }

    async fn count_reservations(&self, user_id: i64) -> StoreResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .count() as i64)
    }

    async fn list_reservations(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> StoreResult<Vec<ReservationListing>> {
        let tables = self.tables.lock().await;
        let mut owned: Vec<&ReservationRecord> = tables
            .reservations
            .values()
            .filter(|r| r.user_id == user_id)
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let listings = owned
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit() as usize)
            .map(|r| ReservationListing {
                id: r.id,
                created_at: r.created_at,
                tickets: tables
                    .tickets
                    .values()
                    .filter(|t| t.reservation_id == r.id)
                    .filter_map(|t| {
                        let session = tables.sessions.get(&t.show_session_id)?;
                        Some(TicketListing {
                            id: t.id,
                            row: t.row,
                            seat: t.seat,
                            show_session: tables.listing(session)?,
                        })
                    })
                    .collect(),
            })
            .collect();
        Ok(listings)
    }
}

/// Транзакция поверх памяти: записи копятся отдельно и переносятся в
/// таблицы только при `commit`.
struct MemoryTx {
    tables: OwnedMutexGuard<Tables>,
    reservations: Vec<ReservationRecord>,
    tickets: Vec<Ticket>,
    seats: HashSet<(i64, i32, i32)>,
}

#[async_trait]
impl LedgerTx for MemoryTx {
    async fn lock_session(&mut self, session_id: i64) -> StoreResult<Option<LockedSession>> {
        let Some(session) = self.tables.sessions.get(&session_id) else {
            return Ok(None);
        };
        Ok(self
            .tables
            .domes
            .get(&session.planetarium_dome_id)
            .map(|dome| LockedSession {
                id: session_id,
                rows: dome.rows,
                seats_in_row: dome.seats_in_row,
            }))
    }

    async fn taken_seats(&mut self, session_id: i64) -> StoreResult<Vec<SeatPosition>> {
        Ok(self
            .tables
            .tickets
            .values()
            .chain(self.tickets.iter())
            .filter(|t| t.show_session_id == session_id)
            .map(|t| SeatPosition { row: t.row, seat: t.seat })
            .collect())
    }

    async fn insert_reservation(
        &mut self,
        user_id: i64,
        created_at: DateTime<Utc>,
    ) -> StoreResult<i64> {
        let id = next_id(&mut self.tables.seq.reservations);
        self.reservations.push(ReservationRecord {
            id,
            user_id,
            created_at,
        });
        Ok(id)
    }

    async fn insert_ticket(&mut self, ticket: &NewTicket) -> StoreResult<Ticket> {
        let key = (ticket.show_session_id, ticket.row, ticket.seat);
        if self.tables.seat_index.contains(&key) || !self.seats.insert(key) {
            return Err(StoreError::WriteConflict {
                show_session: ticket.show_session_id,
                row: ticket.row,
                seat: ticket.seat,
            });
        }

        let ticket = Ticket {
            id: next_id(&mut self.tables.seq.tickets),
            row: ticket.row,
            seat: ticket.seat,
            show_session_id: ticket.show_session_id,
            reservation_id: ticket.reservation_id,
        };
        self.tickets.push(ticket.clone());
        Ok(ticket)
    }

    async fn commit(self: Box<Self>) -> StoreResult<()> {
        let MemoryTx {
            mut tables,
            reservations,
            tickets,
            seats,
        } = *self;

        for reservation in reservations {
            tables.reservations.insert(reservation.id, reservation);
        }
        for ticket in tickets {
            tables.tickets.insert(ticket.id, ticket);
        }
        tables.seat_index.extend(seats);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    async fn seeded_session(store: &MemoryStore, rows: i32, seats: i32) -> ShowSession {
        let dome = store
            .insert_dome(&NewDome::new("Small", rows, seats).unwrap())
            .await
            .unwrap();
        let show = store
            .insert_show(&NewAstronomyShow {
                title: "Orion".to_string(),
                description: "Winter sky".to_string(),
                show_themes: vec![],
            })
            .await
            .unwrap();
        store
            .insert_session(&NewShowSession {
                astronomy_show_id: show.id,
                planetarium_dome_id: dome.id,
                show_time: Utc.with_ymd_and_hms(2024, 3, 30, 10, 0, 0).unwrap(),
            })
            .await
            .unwrap()
    }

    fn ticket(session: i64, reservation: i64, row: i32, seat: i32) -> NewTicket {
        NewTicket {
            row,
            seat,
            show_session_id: session,
            reservation_id: reservation,
        }
    }

    #[tokio::test]
    async fn unique_index_reports_write_conflict() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 2, 2).await;

        let mut tx = store.begin().await.unwrap();
        let reservation = tx.insert_reservation(1, Utc::now()).await.unwrap();
        tx.insert_ticket(&ticket(session.id, reservation, 1, 1)).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let reservation = tx.insert_reservation(1, Utc::now()).await.unwrap();
        let err = tx
            .insert_ticket(&ticket(session.id, reservation, 1, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::WriteConflict { row: 1, seat: 1, .. }
        ));
    }

    #[tokio::test]
    async fn dropped_transaction_leaves_no_trace() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 2, 2).await;

        {
            let mut tx = store.begin().await.unwrap();
            let reservation = tx.insert_reservation(1, Utc::now()).await.unwrap();
            tx.insert_ticket(&ticket(session.id, reservation, 2, 2)).await.unwrap();
        }

        assert_eq!(store.count_reservations(1).await.unwrap(), 0);
        assert!(store.taken_places(session.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn availability_is_not_clamped() {
        let store = MemoryStore::new();
        let session = seeded_session(&store, 1, 1).await;

        // Запись в обход проверок реестра: координаты вне купола
        let mut tx = store.begin().await.unwrap();
        let reservation = tx.insert_reservation(1, Utc::now()).await.unwrap();
        tx.insert_ticket(&ticket(session.id, reservation, 1, 1)).await.unwrap();
        tx.insert_ticket(&ticket(session.id, reservation, 1, 2)).await.unwrap();
        tx.commit().await.unwrap();

        let listing = store.session_listing(session.id).await.unwrap().unwrap();
        assert_eq!(listing.planetarium_dome_capacity, 1);
        assert_eq!(listing.tickets_available, -1);
    }
}
