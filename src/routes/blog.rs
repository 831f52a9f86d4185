/**
 * Blog Routes
 * CRUD API endpoints for blog posts, likes and ratings
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::models::{BlogPost, LikeState};
use crate::error::{ApiError, ApiResult};
use crate::permissions::ensure_owner;
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::validators::first_error;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for GET /api/blogs (list)
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListQuery {
    #[serde(default = "default_page")]
    pub page: i64,
    #[serde(default = "default_page_size")]
    pub page_size: i64,
}

fn default_page() -> i64 {
    1
}

fn default_page_size() -> i64 {
    10
}

/// Response for GET /api/blogs (list)
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogListResponse {
    pub items: Vec<BlogPostResponse>,
    pub page: i64,
    pub page_size: i64,
    pub total: i64,
}

/// Full blog post response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostResponse {
    pub id: i64,
    pub title: String,
    pub content: String,
    pub author: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_likes: i64,
    pub average_rating: Option<f64>,
}

impl From<BlogPost> for BlogPostResponse {
    fn from(post: BlogPost) -> Self {
        let average_rating = post.average_rating();
        Self {
            id: post.id,
            title: post.title,
            content: post.content,
            author: post.author,
            created_at: post.created_at,
            updated_at: post.updated_at,
            total_likes: post.total_likes,
            average_rating,
        }
    }
}

/// Request body for POST /api/blogs (create)
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateBlogRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: String,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
}

/// Request body for PUT/PATCH /api/blogs/{id} (update)
#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct UpdateBlogRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be between 1 and 100 characters"))]
    pub title: Option<String>,
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub message: String,
    pub total_likes: i64,
}

/// Score arrives as a JSON number or a numeric string.
#[derive(Debug, Deserialize, Serialize)]
pub struct RateRequest {
    #[serde(default)]
    pub score: Value,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RateResponse {
    pub message: String,
    pub score: i32,
}

// ============================================================================
// Validation
// ============================================================================

fn parse_score(value: &Value) -> Option<i32> {
    let score = match value {
        Value::Number(n) => n.as_i64()?,
        Value::String(s) => s.trim().parse::<i64>().ok()?,
        _ => return None,
    };
    (1..=5).contains(&score).then_some(score as i32)
}

/// Blank after trimming counts as missing.
fn require_text(value: &str, field: &str) -> ApiResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ApiError::validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

async fn load_post(state: &AppState, id: i64) -> ApiResult<BlogPost> {
    state
        .store
        .find_post(id)
        .await?
        .ok_or_else(ApiError::not_found)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blogs - List blog posts with pagination, newest first
pub async fn list_posts(
    State(state): State<AppState>,
    Query(query): Query<BlogListQuery>,
) -> ApiResult<Json<BlogListResponse>> {
    // Clamp page_size to max 100
    let page_size = query.page_size.clamp(1, 100);
    let page = query.page.max(1);
    // Past the last representable row the page is simply empty.
    let offset = (page - 1).saturating_mul(page_size);

    let result = state.store.list_posts(page_size, offset).await?;

    Ok(Json(BlogListResponse {
        items: result.items.into_iter().map(BlogPostResponse::from).collect(),
        page,
        page_size,
        total: result.total,
    }))
}

/// GET /api/blogs/{id} - Get single blog post
pub async fn get_post(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<BlogPostResponse>> {
    Ok(Json(load_post(&state, id).await?.into()))
}

/// POST /api/blogs - Create blog post (auth required)
pub async fn create_post(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<CreateBlogRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(first_error)?;
    let title = require_text(&payload.title, "Title")?;
    let content = require_text(&payload.content, "Content")?;

    let post = state.store.create_post(user.id, &title, &content).await?;
    tracing::info!(post_id = post.id, author_id = user.id, "blog post created");

    Ok((StatusCode::CREATED, Json(BlogPostResponse::from(post))))
}

/// PUT /api/blogs/{id} - Replace title and content (author only)
pub async fn replace_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBlogRequest>,
) -> ApiResult<Json<BlogPostResponse>> {
    let post = load_post(&state, id).await?;
    ensure_owner(&user, &post)?;

    if payload.title.is_none() {
        return Err(ApiError::validation("Title is required"));
    }
    if payload.content.is_none() {
        return Err(ApiError::validation("Content is required"));
    }
    apply_update(&state, post, payload).await
}

/// PATCH /api/blogs/{id} - Update title and/or content (author only)
pub async fn update_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateBlogRequest>,
) -> ApiResult<Json<BlogPostResponse>> {
    let post = load_post(&state, id).await?;
    ensure_owner(&user, &post)?;
    apply_update(&state, post, payload).await
}

async fn apply_update(
    state: &AppState,
    post: BlogPost,
    payload: UpdateBlogRequest,
) -> ApiResult<Json<BlogPostResponse>> {
    payload.validate().map_err(first_error)?;

    let title = match payload.title {
        Some(title) => require_text(&title, "Title")?,
        None => post.title,
    };
    let content = match payload.content {
        Some(content) => require_text(&content, "Content")?,
        None => post.content,
    };

    let updated = state.store.update_post(post.id, &title, &content).await?;
    tracing::info!(post_id = updated.id, "blog post updated");

    Ok(Json(updated.into()))
}

/// DELETE /api/blogs/{id} - Delete blog post (author only)
pub async fn delete_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<MessageResponse>> {
    let post = load_post(&state, id).await?;
    ensure_owner(&user, &post)?;

    if !state.store.delete_post(id).await? {
        return Err(ApiError::not_found());
    }
    tracing::info!(post_id = id, "blog post deleted");

    Ok(Json(MessageResponse::new("Blog Post Deleted")))
}

/// POST /api/blogs/{id}/like - Toggle the caller's like
pub async fn like_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<LikeResponse>> {
    load_post(&state, id).await?;

    let message = match state.store.toggle_like(id, user.id).await? {
        LikeState::Liked => "Liked",
        LikeState::Unliked => "Unliked",
    };
    let post = load_post(&state, id).await?;

    Ok(Json(LikeResponse {
        message: message.to_string(),
        total_likes: post.total_likes,
    }))
}

/// POST /api/blogs/{id}/rate - Set the caller's score for a post
pub async fn rate_post(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<RateRequest>,
) -> ApiResult<Json<RateResponse>> {
    load_post(&state, id).await?;

    let score = parse_score(&payload.score)
        .ok_or_else(|| ApiError::validation("Score must be between 1 and 5"))?;
    let rating = state.store.upsert_rating(id, user.id, score).await?;

    Ok(Json(RateResponse {
        message: "Rating saved".to_string(),
        score: rating.score,
    }))
}
