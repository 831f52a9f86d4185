//! Blog Backend - library for app logic and testing

pub mod auth;
pub mod codes;
pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod mail;
pub mod media;
pub mod permissions;
pub mod routes;
pub mod state;
pub mod store;
pub mod validators;

#[cfg(test)]
mod test_support;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post, put},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::{
    compression::CompressionLayer, cors::CorsLayer, limit::RequestBodyLimitLayer,
    services::ServeDir, trace::TraceLayer,
};

use crate::config::AppConfig;
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, Store};

/// Request body cap: a 5 MB avatar plus multipart framing.
const BODY_LIMIT: usize = 6 * 1024 * 1024;

/// Configure CORS from environment variables.
/// Uses ALLOWED_ORIGINS (comma-separated) or FRONTEND_ORIGIN.
/// Falls back to the local frontend dev server.
pub fn configure_cors() -> CorsLayer {
    let allowed_origins = std::env::var("ALLOWED_ORIGINS")
        .ok()
        .and_then(|s| {
            let origins: Vec<HeaderValue> = s
                .split(',')
                .filter_map(|origin| origin.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                None
            } else {
                Some(origins)
            }
        })
        .or_else(|| {
            std::env::var("FRONTEND_ORIGIN")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(|origin| vec![origin])
        })
        .unwrap_or_else(|| {
            vec![
                HeaderValue::from_static("http://localhost:3000"),
                HeaderValue::from_static("http://127.0.0.1:3000"),
            ]
        });

    CorsLayer::new()
        .allow_origin(allowed_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn auth_routes() -> Router<AppState> {
    use routes::{account, auth, profile};

    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/token/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route(
            "/profile/{user_id}",
            get(profile::get_profile)
                .put(profile::update_profile)
                .patch(profile::update_profile),
        )
        .route("/change-password", put(account::change_password))
        .route("/email/change", post(account::request_email_change))
        .route("/email/verify", post(account::verify_email_change))
        .route("/forget-password", post(account::request_password_reset))
        .route(
            "/forget-password/change",
            post(account::confirm_password_reset),
        )
}

fn blog_routes() -> Router<AppState> {
    use routes::{blog, comments};

    Router::new()
        .route("/", get(blog::list_posts).post(blog::create_post))
        .route(
            "/{id}",
            get(blog::get_post)
                .put(blog::replace_post)
                .patch(blog::update_post)
                .delete(blog::delete_post),
        )
        .route("/{id}/like", post(blog::like_post))
        .route("/{id}/rate", post(blog::rate_post))
        .route(
            "/{id}/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/comments/{id}/crud",
            get(comments::comment_detail)
                .put(comments::replace_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
}

/// Create and configure the application router.
pub fn create_app(state: AppState) -> Router {
    let cors = configure_cors();
    tracing::info!("CORS configured");

    let media_prefix = if state.config.media_url.is_empty() {
        "/media".to_string()
    } else {
        state.config.media_url.clone()
    };
    let media = ServeDir::new(state.media.root());

    Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/blogs", blog_routes())
        .route("/health", get(routes::health::health_ping))
        .route("/health/database", get(routes::health::health_database))
        .route("/health/ready", get(routes::health::health_ready))
        .nest_service(&media_prefix, media)
        .with_state(state)
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        // Compress responses with gzip/br/zstd automatically
        .layer(CompressionLayer::new())
        .layer(DefaultBodyLimit::max(BODY_LIMIT))
        .layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(cors)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    tracing::info!("Shutdown signal received");
}

/// Run the server (used by main).
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = AppConfig::from_env().context("invalid configuration")?;

    // Guards MUST be held for the programme's lifetime; dropping them early
    // shuts down background log-writer threads and loses buffered log lines.
    let _log_guards = logging::init(config.is_production());

    routes::health::init_start_time();

    let store: Arc<dyn Store> = if std::env::var("DATABASE_URL").is_ok() {
        let pool = db::init_pool(None)
            .await
            .context("failed to initialize database pool")?;
        db::run_migrations(&pool)
            .await
            .context("failed to run database migrations")?;
        Arc::new(PgStore::new(pool))
    } else {
        tracing::warn!("DATABASE_URL not set. Using the in-memory store; data will not survive a restart.");
        Arc::new(MemoryStore::new())
    };

    let mailer = mail::from_settings(&config.email).context("failed to configure email backend")?;

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("invalid HOST/PORT configuration")?;

    let state = AppState::new(config, store, mailer);
    tokio::fs::create_dir_all(state.media.root())
        .await
        .context("failed to create media directory")?;

    let app = create_app(state);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    .context("server error")?;

    Ok(())
}
