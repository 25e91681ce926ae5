//! sessions.rs
//!
//! Расписание сеансов и подсчёт свободных мест.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::error::AppError;
use crate::filters::SessionFilter;
use crate::models::{NewShowSession, SessionDetail, SessionListing, ShowSession};
use crate::store::Store;

/// Вместимость сеанса и остаток мест, пересчитанные при чтении.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeatAvailability {
    pub show_session: i64,
    pub capacity: i64,
    pub tickets_available: i64,
}

impl From<SessionListing> for SeatAvailability {
    fn from(listing: SessionListing) -> Self {
        Self {
            show_session: listing.id,
            capacity: listing.planetarium_dome_capacity,
            tickets_available: listing.tickets_available,
        }
    }
}

#[derive(Clone)]
pub struct SessionService {
    store: Arc<dyn Store>,
}

impl SessionService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create_session(
        &self,
        astronomy_show_id: i64,
        planetarium_dome_id: i64,
        show_time: Option<DateTime<Utc>>,
    ) -> Result<ShowSession, AppError> {
        let session = NewShowSession::new(astronomy_show_id, planetarium_dome_id, show_time)?;

        if self.store.get_show(astronomy_show_id).await?.is_none() {
            return Err(AppError::not_found("astronomy show", astronomy_show_id));
        }
        if self.store.get_dome(planetarium_dome_id).await?.is_none() {
            return Err(AppError::not_found("planetarium dome", planetarium_dome_id));
        }

        let session = self.store.insert_session(&session).await?;
        info!(
            show_session_id = session.id,
            astronomy_show_id,
            planetarium_dome_id,
            "Show session scheduled"
        );
        Ok(session)
    }

    pub async fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<SessionListing>, AppError> {
        Ok(self.store.list_session_listings(filter).await?)
    }

    pub async fn get_session(&self, id: i64) -> Result<SessionDetail, AppError> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or_else(|| AppError::not_found("show session", id))?;

        let astronomy_show = self
            .store
            .get_show(session.astronomy_show_id)
            .await?
            .ok_or_else(|| AppError::not_found("astronomy show", session.astronomy_show_id))?;
        let planetarium_dome = self
            .store
            .get_dome(session.planetarium_dome_id)
            .await?
            .ok_or_else(|| AppError::not_found("planetarium dome", session.planetarium_dome_id))?;
        let taken_places = self.store.taken_places(id).await?;

        Ok(SessionDetail {
            id: session.id,
            show_time: session.show_time,
            astronomy_show,
            planetarium_dome,
            taken_places,
        })
    }

    pub async fn available_seats(&self, id: i64) -> Result<SeatAvailability, AppError> {
        self.store
            .session_listing(id)
            .await?
            .map(SeatAvailability::from)
            .ok_or_else(|| AppError::not_found("show session", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewAstronomyShow, NewDome, TicketRequest};
    use crate::services::LedgerService;
    use crate::store::MemoryStore;
    use chrono::TimeZone;

    struct Fixture {
        sessions: SessionService,
        ledger: LedgerService,
        show_id: i64,
        dome_id: i64,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let dome = store
            .insert_dome(&NewDome::new("Main Dome", 10, 15).unwrap())
            .await
            .unwrap();
        let show = store
            .insert_show(&NewAstronomyShow {
                title: "Orion Rising".to_string(),
                description: String::new(),
                show_themes: vec![],
            })
            .await
            .unwrap();

        Fixture {
            sessions: SessionService::new(store.clone()),
            ledger: LedgerService::new(store),
            show_id: show.id,
            dome_id: dome.id,
        }
    }

    fn at(day: u32, hour: u32) -> Option<DateTime<Utc>> {
        Some(Utc.with_ymd_and_hms(2024, 3, day, hour, 0, 0).unwrap())
    }

    #[tokio::test]
    async fn missing_show_time_is_a_validation_error() {
        let f = fixture().await;
        let err = f
            .sessions
            .create_session(f.show_id, f.dome_id, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn unknown_references_are_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.sessions.create_session(77, f.dome_id, at(30, 10)).await,
            Err(AppError::NotFound { entity: "astronomy show", id: 77 })
        ));
        assert!(matches!(
            f.sessions.create_session(f.show_id, 88, at(30, 10)).await,
            Err(AppError::NotFound { entity: "planetarium dome", id: 88 })
        ));
    }

    #[tokio::test]
    async fn filters_by_date_and_orders_latest_first() {
        let f = fixture().await;
        let morning = f.sessions.create_session(f.show_id, f.dome_id, at(30, 10)).await.unwrap();
        let evening = f.sessions.create_session(f.show_id, f.dome_id, at(30, 20)).await.unwrap();
        f.sessions.create_session(f.show_id, f.dome_id, at(31, 10)).await.unwrap();

        let filter = SessionFilter::from_params(Some("2024-03-30"), None).unwrap();
        let ids: Vec<i64> = f
            .sessions
            .list_sessions(&filter)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();

        assert_eq!(ids, vec![evening.id, morning.id]);
    }

    #[tokio::test]
    async fn filters_by_show() {
        let f = fixture().await;
        f.sessions.create_session(f.show_id, f.dome_id, at(30, 10)).await.unwrap();

        let filter = SessionFilter::from_params(None, Some(&(f.show_id + 100).to_string())).unwrap();
        assert!(f.sessions.list_sessions(&filter).await.unwrap().is_empty());

        let filter = SessionFilter::from_params(None, Some(&f.show_id.to_string())).unwrap();
        let listings = f.sessions.list_sessions(&filter).await.unwrap();
        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].astronomy_show, "Orion Rising");
        assert_eq!(listings[0].tickets_available, 150);
    }

    #[tokio::test]
    async fn detail_lists_taken_places_and_availability_follows_tickets() {
        let f = fixture().await;
        let session = f.sessions.create_session(f.show_id, f.dome_id, at(30, 10)).await.unwrap();

        f.ledger
            .create_reservation(
                1,
                vec![
                    TicketRequest { row: 5, seat: 10, show_session: session.id },
                    TicketRequest { row: 1, seat: 1, show_session: session.id },
                ],
            )
            .await
            .unwrap();

        let detail = f.sessions.get_session(session.id).await.unwrap();
        assert_eq!(detail.planetarium_dome.capacity(), 150);
        let places: Vec<(i32, i32)> = detail.taken_places.iter().map(|p| (p.row, p.seat)).collect();
        assert_eq!(places, vec![(1, 1), (5, 10)]);

        let availability = f.sessions.available_seats(session.id).await.unwrap();
        assert_eq!(
            availability,
            SeatAvailability {
                show_session: session.id,
                capacity: 150,
                tickets_available: 148,
            }
        );
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let f = fixture().await;
        assert!(matches!(
            f.sessions.available_seats(5).await,
            Err(AppError::NotFound { entity: "show session", id: 5 })
        ));
        assert!(f.sessions.get_session(5).await.is_err());
    }
}
