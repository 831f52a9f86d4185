//! API error type and its mapping onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::mail::MailError;
use crate::media::MediaError;
use crate::routes::ErrorResponse;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad field values or mismatched confirmations.
    #[error("{0}")]
    Validation(String),

    /// Missing, invalid or expired credentials.
    #[error("{0}")]
    Unauthorized(String),

    /// Authenticated, but not allowed to touch this object.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    /// Duplicate username or email.
    #[error("{0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Mail(#[from] MailError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("{0}")]
    Internal(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound("Not found".to_string())
    }

    pub fn forbidden() -> Self {
        Self::Forbidden("You do not have permission to perform this action".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Store(StoreError::Duplicate { .. }) => StatusCode::CONFLICT,
            Self::Store(StoreError::NotFound { .. }) => StatusCode::NOT_FOUND,
            Self::Media(MediaError::Rejected(_)) => StatusCode::BAD_REQUEST,
            Self::Store(_) | Self::Mail(_) | Self::Media(_) | Self::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match &self {
            Self::Store(StoreError::Duplicate { field }) => {
                format!("This {field} has already been registered.")
            }
            Self::Store(StoreError::NotFound { .. }) => "Not found".to_string(),
            Self::Media(MediaError::Rejected(reason)) => reason.clone(),
            _ if status.is_server_error() => {
                tracing::error!(error = %self, "request failed");
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        (
            status,
            Json(ErrorResponse {
                error,
                message: None,
            }),
        )
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::validation("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Unauthorized("x".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(ApiError::forbidden().status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found().status(), StatusCode::NOT_FOUND);
        assert_eq!(
            ApiError::Store(StoreError::Duplicate { field: "email" }).status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn test_server_errors_hide_details() {
        let response = ApiError::Internal("secret detail".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(body.error, "Internal server error");
    }
}
