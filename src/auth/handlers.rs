// HTTP handlers for authentication endpoints

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    Json,
};

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{
        AuthResponse, ChangePasswordRequest, LoginRequest, MessageResponse, RegisterRequest,
        UpdateProfileRequest, UserResponse, VerifyTokenResponse,
    },
};
use crate::AppState;

/// Handler for POST /api/auth/login
/// Exchanges email and password for the user's token
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid credentials or disabled account", body = String, example = json!({"error": "Unable to log in with provided credentials."})),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Internal server error"}))
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AuthError> {
    let Json(request) = payload?;
    let response = state.auth.login(request).await?;
    Ok(Json(response))
}

/// Handler for POST /api/auth/register
/// Creates an account and returns its first token
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = AuthResponse),
        (status = 400, description = "Field errors", body = String, example = json!({"email": ["A user with this email already exists."]})),
        (status = 500, description = "Internal server error", body = String, example = json!({"error": "Internal server error"}))
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    let Json(request) = payload?;
    tracing::debug!("Registration attempt for username {:?}", request.username);

    let response = state.auth.register(request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Handler for POST /api/auth/logout
/// Revokes the caller's token. Requires `Authorization: Bearer <token>`.
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful", body = MessageResponse),
        (status = 400, description = "No token to revoke", body = String, example = json!({"error": "No active session to log out."})),
        (status = 401, description = "Not authenticated", body = String, example = json!({"error": "Invalid token."}))
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Result<Json<MessageResponse>, AuthError> {
    let response = state.auth.logout(&auth.user).await?;
    Ok(Json(response))
}

/// Handler for GET /api/auth/profile
#[utoipa::path(
    get,
    path = "/api/auth/profile",
    responses(
        (status = 200, description = "Current user", body = UserResponse),
        (status = 401, description = "Not authenticated", body = String, example = json!({"error": "Authentication credentials were not provided."}))
    ),
    tag = "auth"
)]
pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Json<UserResponse> {
    Json(state.auth.profile(&auth.user))
}

/// Handler for PUT /api/auth/profile
/// Full update; `username` and `email` are required
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Field errors", body = String, example = json!({"username": ["This field is required."]})),
        (status = 401, description = "Not authenticated", body = String, example = json!({"error": "Invalid token."}))
    ),
    tag = "auth"
)]
pub async fn update_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Json(request) = payload?;
    let response = state.auth.update_profile(&auth.user, request, false).await?;
    Ok(Json(response))
}

/// Handler for PATCH /api/auth/profile
/// Partial update; `avatar: null` clears the avatar
#[utoipa::path(
    patch,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserResponse),
        (status = 400, description = "Field errors", body = String, example = json!({"bio": ["Ensure this field has no more than 500 characters."]})),
        (status = 401, description = "Not authenticated", body = String, example = json!({"error": "Invalid token."}))
    ),
    tag = "auth"
)]
pub async fn partial_update_profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    payload: Result<Json<UpdateProfileRequest>, JsonRejection>,
) -> Result<Json<UserResponse>, AuthError> {
    let Json(request) = payload?;
    let response = state.auth.update_profile(&auth.user, request, true).await?;
    Ok(Json(response))
}

/// Handler for PUT and PATCH /api/auth/change-password
/// The caller's token stays valid afterwards
#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 400, description = "Field errors", body = String, example = json!({"old_password": ["Your old password was entered incorrectly. Please enter it again."]})),
        (status = 401, description = "Not authenticated", body = String, example = json!({"error": "Invalid token."}))
    ),
    tag = "auth"
)]
pub async fn change_password(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
    payload: Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AuthError> {
    let Json(request) = payload?;
    let response = state.auth.change_password(&auth.user, request).await?;
    Ok(Json(response))
}

/// Handler for GET /api/auth/verify-token
#[utoipa::path(
    get,
    path = "/api/auth/verify-token",
    responses(
        (status = 200, description = "Token is valid", body = VerifyTokenResponse),
        (status = 401, description = "Token is missing, unknown or belongs to an inactive user", body = String, example = json!({"error": "Invalid token."}))
    ),
    tag = "auth"
)]
pub async fn verify_token(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> Json<VerifyTokenResponse> {
    Json(state.auth.verify(&auth.user))
}
