pub mod auth;
pub mod config;
pub mod db;
pub mod validation;

use axum::{
    routing::{get, post, put},
    Router,
};
use sqlx::PgPool;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use auth::{
    handlers,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
        UpdateProfileRequest, UserResponse, VerifyTokenResponse,
    },
    AuthService, PasswordService, PgTokenRepository, PgUserRepository,
};
use config::Config;

/// OpenAPI documentation structure
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::login,
        handlers::register,
        handlers::logout,
        handlers::get_profile,
        handlers::update_profile,
        handlers::partial_update_profile,
        handlers::change_password,
        handlers::verify_token,
    ),
    components(
        schemas(
            LoginRequest,
            RegisterRequest,
            UpdateProfileRequest,
            ChangePasswordRequest,
            AuthResponse,
            UserResponse,
            MessageResponse,
            VerifyTokenResponse
        )
    ),
    tags(
        (name = "auth", description = "Registration, login and profile endpoints. Protected endpoints expect `Authorization: Bearer <token>`.")
    ),
    info(
        title = "Accounts API",
        version = "1.0.0",
        description = "User accounts with opaque bearer token authentication"
    )
)]
pub struct ApiDoc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<AuthService>,
}

impl AppState {
    pub fn new(auth: AuthService) -> Self {
        Self {
            auth: Arc::new(auth),
        }
    }

    /// State backed by Postgres
    pub fn postgres(pool: PgPool, config: &Config) -> Self {
        Self::new(AuthService::new(
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgTokenRepository::new(pool)),
            PasswordService::new(config.hashing),
            config.password_policy.clone(),
        ))
    }
}

/// Creates and configures the application router
/// Maps all API endpoints to their handlers and adds CORS and tracing middleware
pub fn create_router(state: AppState) -> Router {
    // Configure CORS to allow all origins, methods, and headers
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Swagger UI
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        // API routes
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/register", post(handlers::register))
        .route("/api/auth/logout", post(handlers::logout))
        .route(
            "/api/auth/profile",
            get(handlers::get_profile)
                .put(handlers::update_profile)
                .patch(handlers::partial_update_profile),
        )
        .route(
            "/api/auth/change-password",
            put(handlers::change_password).patch(handlers::change_password),
        )
        .route("/api/auth/verify-token", get(handlers::verify_token))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
