/**
 * Account Routes
 * Password change, email change and password reset via one-time codes
 */
use axum::{extract::State, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::{self, AuthUser};
use crate::codes::{self, OneTimeCode};
use crate::error::{ApiError, ApiResult};
use crate::mail::EmailMessage;
use crate::routes::MessageResponse;
use crate::state::AppState;
use crate::validators::{first_error, validate_password_strength};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub old_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailChangeRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub new_email: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct EmailVerifyRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub new_email: String,
    pub code: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct EmailChangedResponse {
    pub message: String,
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize, Serialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PasswordResetConfirmRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    pub code: String,
    pub new_password: String,
    pub confirm_password: String,
}

const EMAIL_TAKEN: &str = "This email has already been registered.";
const NO_REQUEST: &str = "No request was found for this email";
const NO_USER: &str = "No user was found with this email";
const RESET_MISMATCH: &str = "The new passwords do not match";

async fn send_code(state: &AppState, to: &str, subject: &str, code: &str) -> ApiResult<()> {
    let message = EmailMessage {
        from: state.config.email.from_email.clone(),
        to: to.to_string(),
        subject: subject.to_string(),
        body: format!("Your verification code: {code}"),
    };
    state.mailer.send(&message).await?;
    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// PUT /api/auth/change-password
pub async fn change_password(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    let account = state
        .store
        .find_user(user.id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("User no longer exists".to_string()))?;

    if !auth::verify_password(payload.old_password, &account).await {
        return Err(ApiError::validation("Enter your old password correctly"));
    }
    validate_password_strength(&payload.new_password, state.config.password_min_length)?;
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation("New Passwords don't match"));
    }

    let password_hash = auth::hash_password(payload.new_password, state.config.bcrypt_cost).await?;
    state.store.set_password(account.id, &password_hash).await?;

    tracing::info!(user_id = account.id, "password changed");
    Ok(Json(MessageResponse::new("Password Changed")))
}

/// POST /api/auth/email/change
/// Issue (or re-issue) a code for moving the caller to a new address
pub async fn request_email_change(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EmailChangeRequest>,
) -> ApiResult<Json<MessageResponse>> {
    payload.validate().map_err(first_error)?;
    let new_email = payload.new_email.trim();

    if state.store.find_user_by_email(new_email).await?.is_some() {
        return Err(ApiError::Conflict(EMAIL_TAKEN.to_string()));
    }

    let (code, expires_at) = codes::issue(Utc::now(), state.config.verification_code_minutes);
    state
        .store
        .upsert_email_verification(user.id, new_email, &code, expires_at)
        .await?;
    send_code(&state, new_email, "Email change verification code", &code).await?;

    tracing::info!(user_id = user.id, "email change code issued");
    Ok(Json(MessageResponse::new(
        "A verification code has been sent to your new email",
    )))
}

/// POST /api/auth/email/verify
pub async fn verify_email_change(
    user: AuthUser,
    State(state): State<AppState>,
    Json(payload): Json<EmailVerifyRequest>,
) -> ApiResult<Json<EmailChangedResponse>> {
    payload.validate().map_err(first_error)?;
    let new_email = payload.new_email.trim();

    let pending = state
        .store
        .find_pending_email_verification(user.id, new_email)
        .await?
        .ok_or_else(|| ApiError::validation(NO_REQUEST))?;

    if let Some(owner) = state.store.find_user_by_email(new_email).await? {
        if owner.id != user.id {
            return Err(ApiError::Conflict(EMAIL_TAKEN.to_string()));
        }
    }

    pending.check(&payload.code, Utc::now())?;
    let updated = state.store.confirm_email_change(pending.id).await?;

    tracing::info!(user_id = user.id, "email changed");
    Ok(Json(EmailChangedResponse {
        message: "Your email has been changed".to_string(),
        email: updated.email,
    }))
}

/// POST /api/auth/forget-password
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetRequest>,
) -> ApiResult<Json<MessageResponse>> {
    payload.validate().map_err(first_error)?;
    let email = payload.email.trim();

    let user = state
        .store
        .find_user_by_email(email)
        .await?
        .ok_or_else(|| ApiError::validation(NO_USER))?;

    let (code, expires_at) = codes::issue(Utc::now(), state.config.verification_code_minutes);
    state
        .store
        .upsert_password_reset(user.id, &code, expires_at)
        .await?;
    send_code(&state, &user.email, "Password reset verification code", &code).await?;

    tracing::info!(user_id = user.id, "password reset code issued");
    Ok(Json(MessageResponse::new(
        "A verification code has been sent to your email",
    )))
}

/// POST /api/auth/forget-password/change
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(payload): Json<PasswordResetConfirmRequest>,
) -> ApiResult<Json<MessageResponse>> {
    payload.validate().map_err(first_error)?;

    let user = state
        .store
        .find_user_by_email(payload.email.trim())
        .await?
        .ok_or_else(|| ApiError::validation(NO_USER))?;

    let pending = state
        .store
        .find_pending_password_reset(user.id)
        .await?
        .ok_or_else(|| ApiError::validation(NO_REQUEST))?;

    pending.check(&payload.code, Utc::now())?;
    validate_password_strength(&payload.new_password, state.config.password_min_length)?;
    if payload.new_password != payload.confirm_password {
        return Err(ApiError::validation(RESET_MISMATCH));
    }

    let password_hash = auth::hash_password(payload.new_password, state.config.bcrypt_cost).await?;
    state
        .store
        .confirm_password_reset(pending.id, &password_hash)
        .await?;

    tracing::info!(user_id = user.id, "password reset completed");
    Ok(Json(MessageResponse::new("Your password has been changed")))
}
