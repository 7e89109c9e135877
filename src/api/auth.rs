//! Authentication API endpoints
//!
//! - POST /api/v1/auth/signup
//! - POST /api/v1/auth/login
//! - POST /api/v1/auth/forgot-password
//! - POST /api/v1/auth/reset-password
//! - POST /api/v1/auth/logout (auth)
//! - PUT  /api/v1/auth/password (auth)
//! - GET  /api/v1/auth/me (auth)

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{MessageResponse, UserResponse};
use crate::models::CreateUserInput;
use crate::services::user::{LoginInput, LoginResponse};

/// Response for a new account
#[derive(Debug, Serialize)]
pub struct SignupResponse {
    pub message: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", post(reset_password))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/password", put(change_password))
        .route("/me", get(current_user))
}

/// POST /api/v1/auth/signup
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<CreateUserInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body).await?;

    Ok((
        StatusCode::CREATED,
        Json(SignupResponse {
            message: "user created".to_string(),
            user: user.into(),
        }),
    ))
}

/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginInput>,
) -> Result<Json<LoginResponse>, ApiError> {
    let response = state.user_service.login(body).await?;
    Ok(Json(response))
}

/// POST /api/v1/auth/forgot-password
///
/// The reset token is stored but not returned; delivery is out of band.
async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.forgot_password(&body.email).await?;
    Ok(Json(MessageResponse::new("reset link sent to email")))
}

/// POST /api/v1/auth/reset-password
async fn reset_password(
    State(state): State<AppState>,
    Json(body): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .reset_password(&body.token, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password reset successfully")))
}

/// POST /api/v1/auth/logout - revokes every token of the caller
async fn logout(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<MessageResponse>, ApiError> {
    state.user_service.logout(user.0.id).await?;
    Ok(Json(MessageResponse::new("logged out successfully")))
}

/// PUT /api/v1/auth/password
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<ChangePasswordRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .user_service
        .change_password(user.0.id, &body.old_password, &body.new_password)
        .await?;
    Ok(Json(MessageResponse::new("password changed successfully")))
}

/// GET /api/v1/auth/me
async fn current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}
