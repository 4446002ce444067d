/// Identity Service Main Entry Point
///
/// Starts the HTTP server with:
/// - PostgreSQL connection pool (migrated on startup, closed on shutdown)
/// - Session gate in front of every route
use actix_middleware::Logging;
use actix_web::{web, App, HttpServer};
use anyhow::{Context, Result};
use identity_service::{
    config::Settings,
    db::{PgIdentityStore, QueryLog},
    http::{self, AppState},
    session_gate,
};
use sqlx::migrate::Migrator;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

#[actix_web::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new("identity_service=info,actix_middleware=info,info")
            }),
        )
        .json()
        .init();

    info!("Starting Identity Service");

    // Load configuration
    let settings = Settings::load().context("Failed to load configuration")?;
    settings.database.log_config();
    info!(session = ?settings.session, "Configuration loaded successfully");

    let codec = Arc::new(settings.session.codec()?);

    // Initialize database connection pool
    let pool = db_pool::create_pool(settings.database.clone())
        .await
        .context("Failed to connect to PostgreSQL")?;

    db_pool::migrate(&pool, &MIGRATOR)
        .await
        .context("Failed to run database migrations")?;

    let store = Arc::new(PgIdentityStore::new(pool.clone(), QueryLog::from_env()));
    let state = AppState::new(store.clone(), codec.clone(), settings.session.cookie());

    let bind_address = settings.server.bind_address();
    info!("Starting HTTP server on {}", bind_address);

    let session = settings.session.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(session_gate(&session, codec.clone(), store.clone()))
            .wrap(Logging)
            .configure(http::configure)
    })
    .bind(&bind_address)
    .with_context(|| format!("Failed to bind {}", bind_address))?
    .shutdown_timeout(30)
    .run();

    let result = server.await.context("HTTP server error");

    info!("HTTP server stopped");
    db_pool::close_pool(&pool).await;

    result
}
