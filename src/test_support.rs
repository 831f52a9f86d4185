//! Shared fixtures for the HTTP handler tests: the real router over the
//! in-memory store and mailer, with media written to a temp directory.

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

use crate::auth;
use crate::config::AppConfig;
use crate::db::models::{NewUser, User};
use crate::mail::MemoryMailer;
use crate::routes::auth::LoginResponse;
use crate::state::AppState;
use crate::store::MemoryStore;

pub struct TestApp {
    pub state: AppState,
    pub mailer: MemoryMailer,
    pub router: Router,
    _media: TempDir,
}

impl TestApp {
    pub const PASSWORD: &'static str = "12345!Ab";

    pub fn new() -> Self {
        let media = tempfile::tempdir().unwrap();
        let config = AppConfig {
            bcrypt_cost: 4,
            media_root: media.path().to_path_buf(),
            ..AppConfig::default()
        };
        let mailer = MemoryMailer::new();
        let state = AppState::new(
            config,
            Arc::new(MemoryStore::new()),
            Arc::new(mailer.clone()),
        );
        let router = crate::create_app(state.clone());
        Self {
            state,
            mailer,
            router,
            _media: media,
        }
    }

    /// Insert a user with [`Self::PASSWORD`] directly through the store.
    pub async fn user(&self, username: &str, email: &str) -> User {
        let password_hash = auth::hash_password(Self::PASSWORD.to_string(), 4)
            .await
            .unwrap();
        self.state
            .store
            .create_user(NewUser {
                username: username.to_string(),
                email: email.to_string(),
                password_hash,
                first_name: String::new(),
                last_name: String::new(),
            })
            .await
            .unwrap()
    }

    /// Access token for `user` without going through login.
    pub fn token(&self, user: &User) -> String {
        auth::create_access_token(
            user.id,
            &user.username,
            &self.state.config.jwt_secret,
            self.state.config.access_token_minutes,
        )
        .unwrap()
    }

    pub async fn login(&self, username: &str) -> LoginResponse {
        let (status, body) = self
            .request(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({"username": username, "password": Self::PASSWORD})),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "login failed: {body}");
        serde_json::from_value(body).unwrap()
    }

    /// Send a JSON request. An empty response body comes back as `Value::Null`,
    /// a non-JSON one as a string.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        json: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let body = match json {
            Some(json) => {
                builder = builder.header("content-type", "application/json");
                Body::from(serde_json::to_vec(&json).unwrap())
            }
            None => Body::empty(),
        };
        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let res = self.router.clone().oneshot(request).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }
}
