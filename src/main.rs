use nexo_cms::{
    AppState,
    auth::seed_admin,
    config::{AppConfig, Env},
    create_router,
    repository::{RepositoryState, SqliteRepository},
    uploads::{LocalUploadStore, UploadState},
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Loads configuration, initializes logging, opens the database (applying
/// migrations), seeds the admin account and serves the router. Any failure before
/// the listener is up terminates the process.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging: RUST_LOG wins, otherwise sensible local defaults.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "nexo_cms=debug,tower_http=info,axum=info".into());

    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 3. Database Initialization (SQLite + embedded migrations)
    let repo = SqliteRepository::connect(&config.database_url)
        .await
        .expect("FATAL: Failed to open the database. Check DATABASE_URL.");
    let repo = Arc::new(repo) as RepositoryState;

    seed_admin(repo.as_ref(), &config.admin_username, &config.admin_password)
        .await
        .expect("FATAL: Failed to seed the administrative account.");

    // 4. Upload Storage
    let uploads = Arc::new(LocalUploadStore::new(&config.upload_dir)) as UploadState;

    // 5. Unified State Assembly
    let bind_addr = config.bind_addr.clone();
    let app = create_router(AppState {
        repo,
        uploads,
        config,
    });

    // 6. Server Startup
    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind the HTTP listener.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    axum::serve(listener, app)
        .await
        .expect("FATAL: HTTP server terminated unexpectedly.");
}
