use std::{net::SocketAddr, sync::Arc};

use sqlx::postgres::PgPoolOptions;
use supra_api::{
    AppState,
    config::{AppConfig, Env},
    create_router,
    repository::{PostgresRepository, RepositoryState},
};
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Bootstraps configuration, logging, the database and the HTTP server, in that order.
#[tokio::main]
async fn main() {
    // 1. Configuration (fail-fast on missing production secrets).
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise a sensible development default.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "supra_api=debug,tower_http=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            // JSON lines for log aggregators.
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);
    tracing::info!(
        access_ttl = config.access_token_ttl,
        refresh_ttl = config.refresh_token_ttl,
        iss = %config.jwt_iss,
        max_sessions = config.max_sessions,
        "Token settings"
    );

    // 3. Database.
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.db_url)
        .await
        .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("FATAL: Failed to run database migrations.");
    tracing::info!("Database initialized...");

    let repo = Arc::new(PostgresRepository::new(pool)) as RepositoryState;

    // 4. Shared state and router.
    let addr = format!("{}:{}", config.host, config.port);
    let state = AppState::new(repo, config).expect("FATAL: Invalid TOKEN_ENCRYPT_KEY.");
    let app = create_router(state);

    // 5. Server. Connect info feeds the client ip into every request context.
    let listener = TcpListener::bind(&addr)
        .await
        .expect("FATAL: Failed to bind HTTP listener.");
    tracing::info!("Listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("FATAL: HTTP server error.");
}
