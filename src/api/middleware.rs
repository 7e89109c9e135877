//! API middleware
//!
//! Contains:
//! - shared application state
//! - the JSON error type every handler returns
//! - bearer-token authentication and admin authorization

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;

use crate::models::User;
use crate::services::{BlogService, BlogServiceError, UserService, UserServiceError};

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub blog_service: Arc<BlogService>,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("authentication required"))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new("TIMEOUT", message)
    }

    /// Logs the cause; clients only see a generic message.
    pub fn internal_error(cause: impl std::fmt::Display) -> Self {
        error!(error = %cause, "internal error");
        Self::new("INTERNAL_ERROR", "internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" | "ALREADY_REACTED" => StatusCode::CONFLICT,
            "TIMEOUT" => StatusCode::GATEWAY_TIMEOUT,
            "BAD_GATEWAY" => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

fn timeout_message(secs: u64) -> String {
    format!("operation timed out after {}s", secs)
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::Unauthorized(msg) => ApiError::unauthorized(msg),
            UserServiceError::AlreadyInUse(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(msg) => ApiError::not_found(msg),
            UserServiceError::InvalidArgument(msg) => ApiError::validation_error(msg),
            UserServiceError::Timeout(secs) => ApiError::timeout(timeout_message(secs)),
            UserServiceError::Store(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

impl From<BlogServiceError> for ApiError {
    fn from(err: BlogServiceError) -> Self {
        match err {
            BlogServiceError::NotFound(msg) => ApiError::not_found(msg),
            BlogServiceError::AlreadyReacted(msg) => ApiError::new("ALREADY_REACTED", msg),
            BlogServiceError::InvalidArgument(msg) => ApiError::validation_error(msg),
            BlogServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            BlogServiceError::Timeout(secs) => ApiError::timeout(timeout_message(secs)),
            BlogServiceError::Ai(e) => ApiError::new("BAD_GATEWAY", e.to_string()),
            BlogServiceError::Store(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&request)
        .map(str::to_owned)
        .ok_or_else(|| ApiError::unauthorized("missing authentication token"))?;

    let user = state
        .user_service
        .validate_token(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("invalid or expired token"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware. Must run after [`require_auth`].
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("admin privileges required"));
    }

    Ok(next.run(request).await)
}
