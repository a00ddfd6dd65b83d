use accounts_api::{config::Config, create_router, db, AppState};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    // RUST_LOG controls verbosity, info by default
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .with_level(true)
        .init();

    tracing::info!("Accounts API - Starting...");

    let config = Config::from_env().expect("Invalid configuration");

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .expect("Failed to create database pool");

    // Run SQLx migrations on startup
    db::run_migrations(&db_pool)
        .await
        .expect("Failed to run database migrations");

    let state = AppState::postgres(db_pool, &config);

    if let Some(admin) = &config.admin {
        match state
            .auth
            .ensure_superuser(&admin.email, &admin.username, &admin.password)
            .await
        {
            Ok(Some(user)) => tracing::info!("Provisioned superuser {}", user.username),
            Ok(None) => tracing::debug!("Superuser already exists"),
            Err(e) => tracing::error!("Failed to provision superuser: {}", e),
        }
    }

    // Create the application router
    let app = create_router(state);

    // Start the Axum server
    let addr = config.bind_addr();
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Accounts API is running on http://{}", addr);
    tracing::info!("Swagger UI available at http://{}/swagger-ui", addr);

    axum::serve(listener, app)
        .await
        .expect("Server error");
}
