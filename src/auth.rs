//! Token issuance and verification, password hashing, and the extractor
//! that turns a bearer token into the calling user.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::distr::{Alphanumeric, SampleString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::db::models::User;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,      // User ID
    pub username: String, // Username
    pub exp: i64,         // Expiry timestamp
    pub iat: i64,         // Issued at timestamp
}

/// Access + refresh token pair handed out by login and refresh.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// The authenticated caller, resolved from the `Authorization` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
    pub username: String,
}

/// Generate a random refresh token
fn generate_refresh_token() -> String {
    Alphanumeric.sample_string(&mut rand::rng(), 64)
}

/// Hash a refresh token for storage. Only the SHA-256 digest is persisted.
pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn create_access_token(
    user_id: i64,
    username: &str,
    secret: &str,
    lifetime_minutes: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let exp = now + Duration::minutes(lifetime_minutes);

    let claims = Claims {
        sub: user_id.to_string(),
        username: username.to_string(),
        exp: exp.timestamp(),
        iat: now.timestamp(),
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify and decode access token
pub fn verify_access_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// Extract bearer token from Authorization header
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Issue a fresh access token and persist a new refresh token for `user`.
pub async fn issue_token_pair(state: &AppState, user_id: i64, username: &str) -> ApiResult<TokenPair> {
    let access = create_access_token(
        user_id,
        username,
        &state.config.jwt_secret,
        state.config.access_token_minutes,
    )
    .map_err(|e| ApiError::Internal(format!("failed to create access token: {e}")))?;

    let refresh = generate_refresh_token();
    let expires_at = Utc::now() + Duration::days(state.config.refresh_token_days);
    state
        .store
        .insert_refresh_token(user_id, &hash_refresh_token(&refresh), expires_at)
        .await?;

    Ok(TokenPair { access, refresh })
}

/// bcrypt is CPU-bound; keep it off the async executor.
pub async fn hash_password(password: String, cost: u32) -> ApiResult<String> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| ApiError::Internal(format!("password hashing task failed: {e}")))?
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {e}")))
}

pub async fn verify_password(password: String, user: &User) -> bool {
    let hash = user.password_hash.clone();
    tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash).unwrap_or(false))
        .await
        .unwrap_or(false)
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = extract_bearer_token(&parts.headers)
            .ok_or_else(|| ApiError::Unauthorized("Authorization required".to_string()))?;

        let claims = verify_access_token(&token, &state.config.jwt_secret).map_err(|e| {
            tracing::debug!("Token verification failed: {}", e);
            ApiError::Unauthorized("Invalid or expired token".to_string())
        })?;

        let id = claims
            .sub
            .parse()
            .map_err(|_| ApiError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(AuthUser {
            id,
            username: claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-secret";

    #[test]
    fn test_verify_access_token_invalid_returns_err() {
        let result = verify_access_token("invalid.jwt.token", SECRET);
        assert!(result.is_err());
    }

    #[test]
    fn test_access_token_carries_identity() {
        let token = create_access_token(42, "alice", SECRET, 15).unwrap();
        let claims = verify_access_token(&token, SECRET).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.username, "alice");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_access_token_rejected_with_other_secret() {
        let token = create_access_token(42, "alice", SECRET, 15).unwrap();
        assert!(verify_access_token(&token, "another-secret").is_err());
    }

    #[test]
    fn test_expired_access_token_rejected() {
        // Past the default 60s leeway.
        let token = create_access_token(42, "alice", SECRET, -5).unwrap();
        assert!(verify_access_token(&token, SECRET).is_err());
    }

    #[test]
    fn test_refresh_token_hash_is_stable_hex() {
        let token = generate_refresh_token();
        assert_eq!(token.len(), 64);
        let hash = hash_refresh_token(&token);
        assert_eq!(hash.len(), 64);
        assert_eq!(hash, hash_refresh_token(&token));
        assert_ne!(hash, token);
    }

    #[test]
    fn test_extract_bearer_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_bearer_token(&headers).is_none());
        headers.insert("authorization", "Bearer abc.def".parse().unwrap());
        assert_eq!(extract_bearer_token(&headers).as_deref(), Some("abc.def"));
        headers.insert("authorization", "Basic abc".parse().unwrap());
        assert!(extract_bearer_token(&headers).is_none());
    }
}
