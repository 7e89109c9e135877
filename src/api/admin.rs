//! Admin API endpoints (admin role required)
//!
//! - GET    /api/v1/admin/users
//! - POST   /api/v1/admin/users/promote
//! - DELETE /api/v1/admin/users/{id}

use axum::{
    extract::{Path, State},
    routing::{delete, get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::parse_id;
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::{MessageResponse, UserResponse};

#[derive(Debug, Deserialize)]
pub struct PromoteRequest {
    pub user_id: String,
    #[serde(default)]
    pub role: String,
}

#[derive(Debug, Serialize)]
pub struct PromoteResponse {
    pub message: String,
    pub user: UserResponse,
}

/// Build the admin router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/promote", post(promote_user))
        .route("/users/{id}", delete(delete_user))
}

/// GET /api/v1/admin/users
async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let users = state.user_service.list_users().await?;
    Ok(Json(users.into_iter().map(UserResponse::from).collect()))
}

/// POST /api/v1/admin/users/promote
async fn promote_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    Json(body): Json<PromoteRequest>,
) -> Result<Json<PromoteResponse>, ApiError> {
    let user_id = parse_id(&body.user_id, "user")?;
    let user = state.user_service.promote_user(user_id, &body.role).await?;

    tracing::info!(admin_id = %admin.0.id, %user_id, role = %user.role, "role changed by admin");
    Ok(Json(PromoteResponse {
        message: "user role updated".to_string(),
        user: user.into(),
    }))
}

/// DELETE /api/v1/admin/users/{id}
async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let user_id = parse_id(&id, "user")?;
    state.user_service.delete_user(user_id).await?;
    Ok(Json(MessageResponse::new("user deleted successfully")))
}
