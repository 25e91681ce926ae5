//! ledger.rs
//!
//! Реестр мест: превращает пакет запрошенных мест в бронирование с билетами.
//!
//! Порядок работы внутри одной транзакции:
//! 1. Блокируем все затронутые сеансы в порядке возрастания id.
//! 2. Проверяем каждый билет: сеанс существует, координата внутри купола,
//!    место не занято ни ранее, ни соседним билетом пакета.
//! 3. Если хоть один билет плохой, откат, клиент получает ошибки по
//!    каждому такому билету.
//! 4. Пишем бронирование и билеты. Уникальный индекс хранилища остаётся
//!    последней линией защиты и превращается в `WriteConflict`.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::error::{AppError, TicketFault};
use crate::filters::{Page, PageRequest};
use crate::models::{
    DomeGeometry, NewTicket, Reservation, ReservationListing, SeatPosition, TicketRequest,
};
use crate::store::{with_transaction, LedgerTx, Store};

#[derive(Clone)]
pub struct LedgerService {
    store: Arc<dyn Store>,
}

struct SessionSeats {
    geometry: DomeGeometry,
    taken: HashSet<SeatPosition>,
}

impl LedgerService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Создаёт бронирование целиком или не создаёт ничего.
    pub async fn create_reservation(
        &self,
        user_id: i64,
        requests: Vec<TicketRequest>,
    ) -> Result<Reservation, AppError> {
        if requests.is_empty() {
            return Err(AppError::EmptyRequest);
        }

        let result = with_transaction(self.store.as_ref(), move |tx| {
            Box::pin(async move { allocate(tx, user_id, &requests).await })
        })
        .await;

        match &result {
            Ok(reservation) => info!(
                reservation_id = reservation.id,
                user_id,
                tickets = reservation.tickets.len(),
                "Reservation created"
            ),
            Err(e) => warn!(user_id, code = e.code(), "Reservation rejected: {}", e),
        }
        result
    }

    pub async fn list_reservations(
        &self,
        user_id: i64,
        page: PageRequest,
    ) -> Result<Page<ReservationListing>, AppError> {
        let count = self.store.count_reservations(user_id).await?;
        let results = self.store.list_reservations(user_id, page).await?;
        Ok(Page::new(page, count, results))
    }
}

async fn allocate(
    tx: &mut dyn LedgerTx,
    user_id: i64,
    requests: &[TicketRequest],
) -> Result<Reservation, AppError> {
    // Блокировки в одном порядке, чтобы встречные брони не ловили дедлок
    let mut session_ids: Vec<i64> = requests.iter().map(|r| r.show_session).collect();
    session_ids.sort_unstable();
    session_ids.dedup();

    let mut sessions: HashMap<i64, SessionSeats> = HashMap::new();
    for id in session_ids {
        if let Some(locked) = tx.lock_session(id).await? {
            let geometry = DomeGeometry::new(locked.rows, locked.seats_in_row)?;
            let taken = tx.taken_seats(locked.id).await?.into_iter().collect();
            sessions.insert(id, SessionSeats { geometry, taken });
        }
    }

    let mut faults = Vec::new();
    let mut claimed: HashSet<(i64, SeatPosition)> = HashSet::new();

    for (index, request) in requests.iter().enumerate() {
        let Some(seats) = sessions.get(&request.show_session) else {
            faults.push(TicketFault {
                index,
                error: AppError::not_found("show session", request.show_session),
            });
            continue;
        };

        if let Err(error) = seats.geometry.check_coordinate(request.row, request.seat) {
            faults.push(TicketFault { index, error });
            continue;
        }

        let position = SeatPosition {
            row: request.row,
            seat: request.seat,
        };
        if seats.taken.contains(&position) || !claimed.insert((request.show_session, position)) {
            faults.push(TicketFault {
                index,
                error: AppError::SeatTaken {
                    show_session: request.show_session,
                    row: request.row,
                    seat: request.seat,
                },
            });
        }
    }

    if !faults.is_empty() {
        return Err(AppError::InvalidTickets(faults));
    }

    let created_at = Utc::now();
    let reservation_id = tx.insert_reservation(user_id, created_at).await?;

    let mut tickets = Vec::with_capacity(requests.len());
    for request in requests {
        let ticket = tx
            .insert_ticket(&NewTicket {
                row: request.row,
                seat: request.seat,
                show_session_id: request.show_session,
                reservation_id,
            })
            .await?;
        tickets.push(ticket);
    }

    Ok(Reservation {
        id: reservation_id,
        user_id,
        created_at,
        tickets,
    })
}
