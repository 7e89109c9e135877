//! Blog API endpoints
//!
//! Public:
//! - GET  /api/v1/blog
//! - GET  /api/v1/blog/{id}
//! - POST /api/v1/blog/{id}/view
//! - POST /api/v1/blog/filter
//! - POST /api/v1/blog/search
//!
//! Authenticated:
//! - POST   /api/v1/blog
//! - PUT    /api/v1/blog/{id}
//! - DELETE /api/v1/blog/{id}
//! - POST   /api/v1/blog/{id}/like
//! - POST   /api/v1/blog/{id}/dislike
//! - POST   /api/v1/blog/suggest

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::common::{parse_id, parse_optional_date};
use crate::api::middleware::{ApiError, AppState, AuthenticatedUser};
use crate::api::responses::MessageResponse;
use crate::models::{Blog, CreateBlogInput, UpdateBlogInput};
use crate::services::ReactionSummary;

/// Body of POST /blog/filter
#[derive(Debug, Default, Deserialize)]
pub struct FilterRequest {
    #[serde(default)]
    pub tags: Vec<String>,
    /// RFC 3339, inclusive
    pub start: Option<String>,
    /// RFC 3339, inclusive
    pub end: Option<String>,
    /// `"popularity"` or anything else for newest first
    #[serde(default)]
    pub sort_by: String,
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    #[serde(default)]
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct SuggestRequest {
    #[serde(default)]
    pub topic: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SuggestResponse {
    pub suggestion: String,
}

#[derive(Debug, Serialize)]
pub struct ReactionResponse {
    pub message: String,
    #[serde(flatten)]
    pub summary: ReactionSummary,
}

/// Build public blog routes
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/blog", get(list_blogs))
        .route("/blog/{id}", get(get_blog))
        .route("/blog/{id}/view", post(record_view))
        .route("/blog/filter", post(filter_blogs))
        .route("/blog/search", post(search_blog))
}

/// Build protected blog routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/blog", post(create_blog))
        .route("/blog/{id}", put(update_blog).delete(delete_blog))
        .route("/blog/{id}/like", post(like_blog))
        .route("/blog/{id}/dislike", post(dislike_blog))
        .route("/blog/suggest", post(suggest_content))
}

/// GET /api/v1/blog - newest first
async fn list_blogs(State(state): State<AppState>) -> Result<Json<Vec<Blog>>, ApiError> {
    Ok(Json(state.blog_service.list().await?))
}

/// GET /api/v1/blog/{id}
async fn get_blog(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Blog>, ApiError> {
    let id = parse_id(&id, "blog")?;
    Ok(Json(state.blog_service.get(id).await?))
}

/// POST /api/v1/blog
async fn create_blog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<CreateBlogInput>,
) -> Result<impl IntoResponse, ApiError> {
    let blog = state.blog_service.create(&user.0, body).await?;
    Ok((StatusCode::CREATED, Json(blog)))
}

/// PUT /api/v1/blog/{id}
async fn update_blog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
    Json(body): Json<UpdateBlogInput>,
) -> Result<Json<Blog>, ApiError> {
    let id = parse_id(&id, "blog")?;
    Ok(Json(state.blog_service.update(id, &user.0, body).await?))
}

/// DELETE /api/v1/blog/{id}
async fn delete_blog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let id = parse_id(&id, "blog")?;
    state.blog_service.delete(id, &user.0).await?;
    Ok(Json(MessageResponse::new("blog deleted successfully")))
}

/// POST /api/v1/blog/{id}/like
async fn like_blog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let id = parse_id(&id, "blog")?;
    let summary = state.blog_service.like(user.0.id, id).await?;
    Ok(Json(ReactionResponse {
        message: "blog liked".to_string(),
        summary,
    }))
}

/// POST /api/v1/blog/{id}/dislike
async fn dislike_blog(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<String>,
) -> Result<Json<ReactionResponse>, ApiError> {
    let id = parse_id(&id, "blog")?;
    let summary = state.blog_service.dislike(user.0.id, id).await?;
    Ok(Json(ReactionResponse {
        message: "blog disliked".to_string(),
        summary,
    }))
}

/// POST /api/v1/blog/{id}/view
async fn record_view(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id, "blog")?;
    state.blog_service.record_view(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/blog/filter
async fn filter_blogs(
    State(state): State<AppState>,
    Json(body): Json<FilterRequest>,
) -> Result<Json<Vec<Blog>>, ApiError> {
    let start = parse_optional_date(body.start.as_deref(), "start")?;
    let end = parse_optional_date(body.end.as_deref(), "end")?;

    let blogs = state
        .blog_service
        .filter(body.tags, start, end, &body.sort_by)
        .await?;
    Ok(Json(blogs))
}

/// POST /api/v1/blog/search
async fn search_blog(
    State(state): State<AppState>,
    Json(body): Json<SearchRequest>,
) -> Result<Json<Blog>, ApiError> {
    Ok(Json(state.blog_service.search(&body.title).await?))
}

/// POST /api/v1/blog/suggest
async fn suggest_content(
    State(state): State<AppState>,
    Json(body): Json<SuggestRequest>,
) -> Result<Json<SuggestResponse>, ApiError> {
    let suggestion = state.blog_service.suggest(&body.topic).await?;
    Ok(Json(SuggestResponse { suggestion }))
}
