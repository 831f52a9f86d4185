/**
 * Profile Routes
 * Public profile lookup and owner-only updates (JSON or multipart with avatar)
 */
use axum::{
    extract::{FromRequest, Multipart, Path, Request, State},
    http::header::CONTENT_TYPE,
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::auth::AuthUser;
use crate::db::models::{Profile, ProfileChanges, DEFAULT_AVATAR};
use crate::error::{ApiError, ApiResult};
use crate::media::MediaStorage;
use crate::permissions::ensure_owner;
use crate::state::AppState;
use crate::validators::first_error;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: i64,
    pub user_id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

impl ProfileResponse {
    fn new(profile: Profile, media: &MediaStorage) -> Self {
        Self {
            id: profile.id,
            user_id: profile.user_id,
            first_name: profile.first_name,
            last_name: profile.last_name,
            email: profile.email,
            bio: profile.bio,
            avatar: profile.avatar.map(|path| media.url(&path)),
        }
    }
}

/// Uploaded avatar file
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Profile update, read from either a JSON body or multipart form data.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    #[validate(length(max = 150, message = "First name must be 150 characters or fewer"))]
    pub first_name: Option<String>,
    #[validate(length(max = 150, message = "Last name must be 150 characters or fewer"))]
    pub last_name: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub remove_avatar: bool,
    #[serde(skip)]
    pub avatar: Option<AvatarUpload>,
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "true" | "1" | "on" | "yes"
    )
}

impl ProfileUpdate {
    async fn from_multipart(mut multipart: Multipart) -> ApiResult<Self> {
        let mut update = ProfileUpdate::default();

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::validation(e.body_text()))?
        {
            let name = field.name().unwrap_or("").to_string();
            match name.as_str() {
                "avatar" => {
                    let file_name = field.file_name().unwrap_or("").to_string();
                    let bytes = field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::validation(e.body_text()))?;
                    update.avatar = Some(AvatarUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
                "firstName" | "lastName" | "bio" | "removeAvatar" => {
                    let text = field
                        .text()
                        .await
                        .map_err(|e| ApiError::validation(e.body_text()))?;
                    match name.as_str() {
                        "firstName" => update.first_name = Some(text),
                        "lastName" => update.last_name = Some(text),
                        "bio" => update.bio = Some(text),
                        _ => update.remove_avatar = parse_flag(&text),
                    }
                }
                _ => {
                    tracing::debug!(field = %name, "ignoring unknown multipart field");
                }
            }
        }

        Ok(update)
    }
}

impl FromRequest<AppState> for ProfileUpdate {
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.starts_with("multipart/form-data"));

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            Self::from_multipart(multipart).await
        } else {
            let Json(update) = Json::<ProfileUpdate>::from_request(req, state)
                .await
                .map_err(|e| ApiError::validation(e.body_text()))?;
            Ok(update)
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/auth/profile/{user_id}
pub async fn get_profile(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state
        .store
        .find_profile(user_id)
        .await?
        .ok_or_else(ApiError::not_found)?;

    Ok(Json(ProfileResponse::new(profile, &state.media)))
}

/// PUT/PATCH /api/auth/profile/{user_id}
pub async fn update_profile(
    user: AuthUser,
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
    update: ProfileUpdate,
) -> ApiResult<Json<ProfileResponse>> {
    let profile = state
        .store
        .find_profile(user_id)
        .await?
        .ok_or_else(ApiError::not_found)?;
    ensure_owner(&user, &profile)?;
    update.validate().map_err(first_error)?;

    let mut changes = ProfileChanges {
        first_name: update.first_name.map(|v| v.trim().to_string()),
        last_name: update.last_name.map(|v| v.trim().to_string()),
        bio: update.bio,
        avatar: None,
    };

    // removeAvatar wins over an upload in the same request.
    let mut stored_upload = None;
    if update.remove_avatar {
        changes.avatar = Some(DEFAULT_AVATAR.to_string());
    } else if let Some(upload) = update.avatar {
        let relative = state
            .media
            .save_avatar(user.id, &upload.file_name, &upload.bytes)
            .await?;
        changes.avatar = Some(relative.clone());
        stored_upload = Some(relative);
    }
    let replaces_avatar = changes.avatar.is_some();

    let updated = match state.store.update_profile(user_id, changes).await {
        Ok(updated) => updated,
        Err(e) => {
            if let Some(relative) = stored_upload {
                if let Err(cleanup) = state.media.delete(&relative).await {
                    tracing::warn!(path = %relative, error = %cleanup, "failed to remove orphaned avatar");
                }
            }
            return Err(e.into());
        }
    };

    if replaces_avatar {
        if let Some(old) = profile.avatar.as_deref() {
            if updated.avatar.as_deref() != Some(old) {
                if let Err(e) = state.media.delete(old).await {
                    tracing::warn!(path = %old, error = %e, "failed to delete previous avatar");
                }
            }
        }
    }

    tracing::info!(user_id, "profile updated");
    Ok(Json(ProfileResponse::new(updated, &state.media)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::body::Body;
    use axum::http::{Method, StatusCode};
    use serde_json::json;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0];
    const BOUNDARY: &str = "X-BLOG-BOUNDARY";

    fn multipart_body(fields: &[(&str, &str)], avatar: Option<(&str, &[u8])>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in fields {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some((file_name, bytes)) = avatar {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"avatar\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send_multipart(
        app: &TestApp,
        uri: &str,
        token: &str,
        body: Vec<u8>,
    ) -> (StatusCode, serde_json::Value) {
        let req = axum::http::Request::builder()
            .method(Method::PATCH)
            .uri(uri)
            .header("authorization", format!("Bearer {token}"))
            .header(
                "content-type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();
        app.send(req).await
    }

    #[tokio::test]
    async fn test_get_profile_is_public() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;

        let (status, body) = app
            .request(Method::GET, &format!("/api/auth/profile/{}", ada.id), None, None)
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["userId"], ada.id);
        assert_eq!(body["email"], "ada@example.com");
        assert_eq!(body["avatar"], "/media/avatars/default.png");
    }

    #[tokio::test]
    async fn test_get_missing_profile_returns_not_found() {
        let app = TestApp::new();
        let (status, _) = app
            .request(Method::GET, "/api/auth/profile/999", None, None)
            .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_owner_updates_profile_with_json() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;

        let (status, body) = app
            .request(
                Method::PATCH,
                &format!("/api/auth/profile/{}", ada.id),
                Some(&app.token(&ada)),
                Some(json!({"firstName": "Ada", "bio": "Analyst"})),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["firstName"], "Ada");
        assert_eq!(body["bio"], "Analyst");
        assert_eq!(body["lastName"], "");
    }

    #[tokio::test]
    async fn test_anonymous_update_returns_unauthorized() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;
        let (status, _) = app
            .request(
                Method::PUT,
                &format!("/api/auth/profile/{}", ada.id),
                None,
                Some(json!({"bio": "hijacked"})),
            )
            .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_other_user_update_returns_forbidden() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;
        let bob = app.user("bob", "bob@example.com").await;
        let (status, _) = app
            .request(
                Method::PUT,
                &format!("/api/auth/profile/{}", ada.id),
                Some(&app.token(&bob)),
                Some(json!({"bio": "hijacked"})),
            )
            .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let profile = app.state.store.find_profile(ada.id).await.unwrap().unwrap();
        assert_ne!(profile.bio.as_deref(), Some("hijacked"));
    }

    #[tokio::test]
    async fn test_multipart_avatar_upload_and_remove() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;
        let token = app.token(&ada);
        let uri = format!("/api/auth/profile/{}", ada.id);

        let body = multipart_body(&[("bio", "With picture")], Some(("me.png", PNG)));
        let (status, response) = send_multipart(&app, &uri, &token, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["bio"], "With picture");
        let avatar_url = response["avatar"].as_str().unwrap().to_string();
        assert!(avatar_url.starts_with(&format!("/media/avatars/user_{}/", ada.id)));

        let relative = avatar_url.trim_start_matches("/media/").to_string();
        let stored = app.state.media.root().join(&relative);
        assert!(stored.exists());

        // Removal wins over a new upload in the same request.
        let body = multipart_body(&[("removeAvatar", "true")], Some(("again.png", PNG)));
        let (status, response) = send_multipart(&app, &uri, &token, body).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["avatar"], "/media/avatars/default.png");
        assert!(!stored.exists());
    }

    #[tokio::test]
    async fn test_replacing_avatar_deletes_previous_file() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;
        let token = app.token(&ada);
        let uri = format!("/api/auth/profile/{}", ada.id);

        let (_, first) =
            send_multipart(&app, &uri, &token, multipart_body(&[], Some(("a.png", PNG)))).await;
        let first = first["avatar"].as_str().unwrap().trim_start_matches("/media/").to_string();

        let (status, second) =
            send_multipart(&app, &uri, &token, multipart_body(&[], Some(("b.png", PNG)))).await;
        assert_eq!(status, StatusCode::OK);
        let second = second["avatar"].as_str().unwrap().trim_start_matches("/media/").to_string();

        assert_ne!(first, second);
        assert!(!app.state.media.root().join(&first).exists());
        assert!(app.state.media.root().join(&second).exists());
    }

    #[tokio::test]
    async fn test_non_image_avatar_rejected() {
        let app = TestApp::new();
        let ada = app.user("ada", "ada@example.com").await;
        let (status, _) = send_multipart(
            &app,
            &format!("/api/auth/profile/{}", ada.id),
            &app.token(&ada),
            multipart_body(&[], Some(("evil.png", &b"<?php echo 1; ?>"[..]))),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(""));
    }
}
