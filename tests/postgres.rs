//! Реестр мест поверх настоящего Postgres.
//!
//! Нужна пустая или тестовая база:
//! `DATABASE_URL=postgres://... cargo test --test postgres -- --ignored`

use chrono::{TimeZone, Utc};
use std::sync::Arc;

use planetarium::{
    config::DatabaseConfig,
    database::Database,
    error::StoreError,
    models::{NewAstronomyShow, NewDome, NewShowSession, NewTicket, TicketRequest},
    services::{LedgerService, SessionService},
    store::{LedgerTx, PgStore, Store},
};

struct Seeded {
    store: Arc<PgStore>,
    user_id: i64,
    session_id: i64,
}

async fn seed() -> Seeded {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point to a test database");
    let db = Database::connect(&DatabaseConfig {
        url,
        pool_size: 10,
        acquire_timeout_seconds: 5,
    })
    .await
    .unwrap();
    db.run_migrations().await.unwrap();

    // Отдельный пользователь на каждый прогон: email уникален
    let email = format!("ledger-{}@planetarium.test", Utc::now().timestamp_nanos_opt().unwrap());
    let user_id: i64 = sqlx::query_scalar(
        "INSERT INTO users (email, password_hash) VALUES ($1, 'x') RETURNING id",
    )
    .bind(&email)
    .fetch_one(&db.pool)
    .await
    .unwrap();

    let store = Arc::new(PgStore::new(db));
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
    let session = store
        .insert_session(&NewShowSession {
            astronomy_show_id: show.id,
            planetarium_dome_id: dome.id,
            show_time: Utc.with_ymd_and_hms(2024, 3, 30, 18, 0, 0).unwrap(),
        })
        .await
        .unwrap();

    Seeded {
        store,
        user_id,
        session_id: session.id,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "requires DATABASE_URL"]
async fn concurrent_reservations_of_one_seat_sell_it_once() {
    let s = seed().await;
    let ledger = LedgerService::new(s.store.clone());

    let mut handles = Vec::new();
    for _ in 0..8 {
        let ledger = ledger.clone();
        let (user_id, session_id) = (s.user_id, s.session_id);
        handles.push(tokio::spawn(async move {
            ledger
                .create_reservation(
                    user_id,
                    vec![TicketRequest { row: 5, seat: 10, show_session: session_id }],
                )
                .await
        }));
    }

    let mut succeeded = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(err) => assert!(err.is_seat_taken(), "unexpected error: {}", err),
        }
    }
    assert_eq!(succeeded, 1);

    let availability = SessionService::new(s.store.clone())
        .available_seats(s.session_id)
        .await
        .unwrap();
    assert_eq!(availability.tickets_available, 149);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn unique_index_reports_write_conflict() {
    let s = seed().await;
    let ticket = |reservation_id| NewTicket {
        row: 1,
        seat: 1,
        show_session_id: s.session_id,
        reservation_id,
    };

    let mut first = s.store.begin().await.unwrap();
    let reservation = first.insert_reservation(s.user_id, Utc::now()).await.unwrap();
    first.insert_ticket(&ticket(reservation)).await.unwrap();
    first.commit().await.unwrap();

    // Без блокировки сеанса дубль ловит только уникальный индекс
    let mut second = s.store.begin().await.unwrap();
    let reservation = second.insert_reservation(s.user_id, Utc::now()).await.unwrap();
    let err = second.insert_ticket(&ticket(reservation)).await.unwrap_err();
    assert!(matches!(
        err,
        StoreError::WriteConflict { row: 1, seat: 1, .. }
    ));
}
