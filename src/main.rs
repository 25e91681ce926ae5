use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use planetarium::{
    app,
    cache::CacheService,
    config::{Config, LogFormat, RedisConfig},
    database::Database,
    redis_client::RedisClient,
    store::PgStore,
    AppState,
};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env().context("Invalid configuration")?;

    let registry = tracing_subscriber::registry().with(EnvFilter::new(&config.app.rust_log));
    match config.app.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }

    info!(environment = %config.app.environment, "Starting Planetarium API");

    // Connect to the database
    let db = Database::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    info!("Database connected");

    db.run_migrations()
        .await
        .context("Failed to run migrations")?;

    // Redis необязателен: без него просто нет кеша
    let cache = match &config.redis {
        Some(redis) => connect_cache(redis).await,
        None => {
            info!("REDIS_URL not set, running without cache");
            None
        }
    };

    let state = AppState::new(Arc::new(PgStore::new(db)), cache, config.clone());
    let app = app(state);

    let addr: SocketAddr = format!("{}:{}", config.app.host, config.app.port)
        .parse()
        .context("Invalid HOST/PORT")?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app.into_make_service())
        .await
        .context("Server error")?;
    Ok(())
}

async fn connect_cache(redis: &RedisConfig) -> Option<CacheService> {
    let client = match RedisClient::new(&redis.url).await {
        Ok(client) => client,
        Err(e) => {
            warn!("Redis unavailable, running without cache: {:?}", e);
            return None;
        }
    };
    if let Err(e) = client.ping().await {
        warn!("Redis ping failed, running without cache: {:?}", e);
        return None;
    }
    info!("Redis connected");
    Some(CacheService::new(client, redis.cache_ttl_seconds))
}
