/**
 * Authentication Routes
 * Registration, login, token refresh and logout
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{self, hash_refresh_token, AuthUser, TokenPair};
use crate::db::models::{NewUser, User};
use crate::error::{ApiError, ApiResult};
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::validators::{first_error, validate_password_strength, validate_username};

// ============================================================================
// Request/Response Types
// ============================================================================

/// Public user fields
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

impl From<&User> for UserResponse {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub password: String,
    pub password2: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "First name must be 150 characters or fewer"))]
    pub first_name: String,
    #[serde(default)]
    #[validate(length(max = 150, message = "Last name must be 150 characters or fewer"))]
    pub last_name: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access: String,
    pub refresh: String,
    pub user: UserResponse,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<impl IntoResponse> {
    payload.validate().map_err(first_error)?;
    validate_username(&payload.username)?;
    validate_password_strength(&payload.password, state.config.password_min_length)?;

    if payload.password != payload.password2 {
        return Err(ApiError::validation("Passwords don't match"));
    }

    let email = payload.email.trim().to_string();
    if state.store.find_user_by_email(&email).await?.is_some() {
        return Err(ApiError::Conflict(
            "This email has already been registered.".to_string(),
        ));
    }
    if state
        .store
        .find_user_by_username(&payload.username)
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(
            "A user with that username already exists.".to_string(),
        ));
    }

    let password_hash = auth::hash_password(payload.password, state.config.bcrypt_cost).await?;
    let user = state
        .store
        .create_user(NewUser {
            username: payload.username,
            email,
            password_hash,
            first_name: payload.first_name.trim().to_string(),
            last_name: payload.last_name.trim().to_string(),
        })
        .await?;

    tracing::info!(user_id = user.id, username = %user.username, "user registered");

    Ok((StatusCode::CREATED, Json(UserResponse::from(&user))))
}

/// POST /api/auth/login
/// Authenticate with username and password
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    if payload.username.trim().is_empty() || payload.password.is_empty() {
        return Err(ApiError::validation("Username and password are required"));
    }

    let found = state.store.find_user_by_username(&payload.username).await?;
    let verified = match &found {
        Some(user) => auth::verify_password(payload.password, user).await,
        None => false,
    };

    let user = match found {
        Some(user) if verified => user,
        _ => {
            tracing::warn!(username = %payload.username, "failed login attempt");
            return Err(ApiError::Unauthorized(
                "No active account found with the given credentials".to_string(),
            ));
        }
    };

    let tokens = auth::issue_token_pair(&state, user.id, &user.username).await?;
    tracing::info!(user_id = user.id, "successful login");

    Ok(Json(LoginResponse {
        access: tokens.access,
        refresh: tokens.refresh,
        user: UserResponse::from(&user),
    }))
}

/// POST /api/auth/token/refresh
/// Exchange a refresh token for a new access token; the refresh token rotates.
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    if payload.refresh.trim().is_empty() {
        return Err(ApiError::validation("Refresh token is required"));
    }

    let invalid = || ApiError::Unauthorized("Invalid or expired refresh token".to_string());
    let token_hash = hash_refresh_token(payload.refresh.trim());

    let stored = match state.store.find_refresh_token(&token_hash).await? {
        Some(token) if !token.revoked && token.expires_at > Utc::now() => token,
        _ => return Err(invalid()),
    };

    // Lost a race with a concurrent refresh or logout.
    if !state.store.revoke_refresh_token(&token_hash).await? {
        return Err(invalid());
    }

    let user = state
        .store
        .find_user(stored.user_id)
        .await?
        .ok_or_else(invalid)?;

    let tokens = auth::issue_token_pair(&state, user.id, &user.username).await?;
    Ok(Json(tokens))
}

/// POST /api/auth/logout
/// Blacklist the caller's refresh token
pub async fn logout(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<LogoutRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let failed = || ApiError::validation("There has been a problem with logging out");
    let token_hash = hash_refresh_token(payload.refresh.trim());

    match state.store.find_refresh_token(&token_hash).await? {
        Some(token) if token.user_id == user.id && !token.revoked => {}
        _ => return Err(failed()),
    }

    if !state.store.revoke_refresh_token(&token_hash).await? {
        return Err(failed());
    }

    tracing::info!(user_id = user.id, "user logged out");
    Ok(Json(MessageResponse::new("Logout was successful")))
}
