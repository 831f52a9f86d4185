/**
 * Comment Routes
 * Threaded comments on blog posts
 */
use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::models::{Comment, NewComment};
use crate::error::{ApiError, ApiResult};
use crate::permissions::ensure_owner;
use crate::state::AppState;
use crate::validators::first_error;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentResponse {
    pub id: i64,
    pub blog: i64,
    pub author: String,
    pub content: String,
    pub parent: Option<i64>,
    pub replies: Vec<CommentResponse>,
    pub created_at: DateTime<Utc>,
}

impl CommentResponse {
    fn leaf(comment: Comment) -> Self {
        Self {
            id: comment.id,
            blog: comment.post_id,
            author: comment.author,
            content: comment.content,
            parent: comment.parent_id,
            replies: Vec::new(),
            created_at: comment.created_at,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: String,
    /// The comment being replied to, if any.
    pub parent: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct UpdateCommentRequest {
    #[validate(length(min = 1, message = "Content is required"))]
    pub content: Option<String>,
}

// ============================================================================
// Tree assembly
// ============================================================================

/// Group a post's comments (oldest first) into reply trees: top level newest
/// first, replies oldest first at every depth.
fn build_tree(comments: Vec<Comment>) -> Vec<CommentResponse> {
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for comment in comments {
        children.entry(comment.parent_id).or_default().push(comment);
    }

    let mut roots = attach(None, &mut children);
    roots.reverse();
    roots
}

fn attach(
    parent: Option<i64>,
    children: &mut HashMap<Option<i64>, Vec<Comment>>,
) -> Vec<CommentResponse> {
    let Some(level) = children.remove(&parent) else {
        return Vec::new();
    };

    level
        .into_iter()
        .map(|comment| {
            let id = comment.id;
            let mut node = CommentResponse::leaf(comment);
            node.replies = attach(Some(id), children);
            node
        })
        .collect()
}

/// `comment` with its reply subtree filled in.
async fn with_replies(state: &AppState, comment: Comment) -> ApiResult<CommentResponse> {
    let id = comment.id;
    let mut children: HashMap<Option<i64>, Vec<Comment>> = HashMap::new();
    for c in state.store.list_comments(comment.post_id).await? {
        if c.parent_id.is_some() {
            children.entry(c.parent_id).or_default().push(c);
        }
    }

    let mut node = CommentResponse::leaf(comment);
    node.replies = attach(Some(id), &mut children);
    Ok(node)
}

async fn load_comment(state: &AppState, id: i64) -> ApiResult<Comment> {
    state
        .store
        .find_comment(id)
        .await?
        .ok_or_else(ApiError::not_found)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/blogs/{id}/comments - Top-level comments with nested replies
pub async fn list_comments(
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
) -> ApiResult<Json<Vec<CommentResponse>>> {
    if state.store.find_post(post_id).await?.is_none() {
        return Err(ApiError::not_found());
    }

    let comments = state.store.list_comments(post_id).await?;
    Ok(Json(build_tree(comments)))
}

/// POST /api/blogs/{id}/comments - Comment on a post or reply to a comment
pub async fn create_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(post_id): Path<i64>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<impl IntoResponse> {
    if state.store.find_post(post_id).await?.is_none() {
        return Err(ApiError::not_found());
    }

    payload.validate().map_err(first_error)?;
    let content = payload.content.trim();
    if content.is_empty() {
        return Err(ApiError::validation("Content is required"));
    }

    if let Some(parent_id) = payload.parent {
        match state.store.find_comment(parent_id).await? {
            Some(parent) if parent.post_id == post_id => {}
            Some(_) => {
                return Err(ApiError::validation(
                    "Parent comment must belong to the same blog post",
                ))
            }
            None => return Err(ApiError::validation("Parent comment does not exist")),
        }
    }

    let comment = state
        .store
        .create_comment(NewComment {
            post_id,
            author_id: user.id,
            content: content.to_string(),
            parent_id: payload.parent,
        })
        .await?;
    tracing::info!(comment_id = comment.id, post_id, "comment created");

    Ok((StatusCode::CREATED, Json(CommentResponse::leaf(comment))))
}

/// GET /api/blogs/comments/{id}/crud
/// Listing lives on the post's comments endpoint; nothing to return here.
pub async fn comment_detail() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// PUT /api/blogs/comments/{id}/crud - Replace content (author only)
pub async fn replace_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> ApiResult<Json<CommentResponse>> {
    let comment = load_comment(&state, id).await?;
    ensure_owner(&user, &comment)?;

    if payload.content.is_none() {
        return Err(ApiError::validation("Content is required"));
    }
    apply_update(&state, comment, payload).await
}

/// PATCH /api/blogs/comments/{id}/crud - Update content (author only)
pub async fn update_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateCommentRequest>,
) -> ApiResult<Json<CommentResponse>> {
    let comment = load_comment(&state, id).await?;
    ensure_owner(&user, &comment)?;
    apply_update(&state, comment, payload).await
}

async fn apply_update(
    state: &AppState,
    comment: Comment,
    payload: UpdateCommentRequest,
) -> ApiResult<Json<CommentResponse>> {
    payload.validate().map_err(first_error)?;

    let comment = match payload.content {
        Some(content) => {
            let content = content.trim();
            if content.is_empty() {
                return Err(ApiError::validation("Content is required"));
            }
            state.store.update_comment(comment.id, content).await?
        }
        None => comment,
    };

    Ok(Json(with_replies(state, comment).await?))
}

/// DELETE /api/blogs/comments/{id}/crud - Delete a comment and its replies
pub async fn delete_comment(
    user: AuthUser,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let comment = load_comment(&state, id).await?;
    ensure_owner(&user, &comment)?;

    if !state.store.delete_comment(id).await? {
        return Err(ApiError::not_found());
    }
    tracing::info!(comment_id = id, "comment deleted");

    Ok(StatusCode::NO_CONTENT)
}
