/**
 * Health Routes
 * Endpoints for checking backend health status
 */
use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::state::AppState;

// Track server start time for uptime calculation
lazy_static::lazy_static! {
    static ref SERVER_START: Instant = Instant::now();
}

/// Initialize the server start time
pub fn init_start_time() {
    lazy_static::initialize(&SERVER_START);
}

/// Single service check result
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceCheck {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Ready check response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    pub checks: ReadyChecks,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Ready checks summary
#[derive(Debug, Serialize, Deserialize)]
pub struct ReadyChecks {
    pub database: String,
}

/// Simple health response
#[derive(Debug, Serialize, Deserialize)]
pub struct SimpleHealthResponse {
    pub status: String,
}

async fn check_database(state: &AppState) -> ServiceCheck {
    match state.store.ping().await {
        Ok(duration) => ServiceCheck {
            status: "healthy".to_string(),
            response_time: Some(duration.as_millis() as u64),
            error: None,
        },
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            ServiceCheck {
                status: "unhealthy".to_string(),
                response_time: None,
                error: Some(e.to_string()),
            }
        }
    }
}

/// GET /health - Simple health ping
pub async fn health_ping() -> impl IntoResponse {
    Json(SimpleHealthResponse {
        status: "ok".to_string(),
    })
}

/// GET /health/database - Database health check
pub async fn health_database(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(check_database(&state).await))
}

/// GET /health/ready - Readiness check
/// Not ready (503) while the store cannot be reached.
pub async fn health_ready(State(state): State<AppState>) -> impl IntoResponse {
    let uptime = SERVER_START.elapsed().as_secs();
    let database = check_database(&state).await;
    let is_ready = database.status == "healthy";

    let response = ReadyResponse {
        status: if is_ready {
            "ready".to_string()
        } else {
            "not ready".to_string()
        },
        timestamp: Utc::now(),
        uptime: Some(uptime),
        checks: ReadyChecks {
            database: database.status,
        },
        reason: if !is_ready {
            Some("Database is not healthy".to_string())
        } else {
            None
        },
    };

    let status = if is_ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::http::Method;

    #[tokio::test]
    async fn test_health_ping_returns_ok() {
        init_start_time();
        let app = TestApp::new();
        let (status, body) = app.request(Method::GET, "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body: SimpleHealthResponse = serde_json::from_value(body).unwrap();
        assert_eq!(body.status, "ok");
    }

    #[tokio::test]
    async fn test_health_database_reports_store() {
        let app = TestApp::new();
        let (status, body) = app.request(Method::GET, "/health/database", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body: ServiceCheck = serde_json::from_value(body).unwrap();
        assert_eq!(body.status, "healthy");
        assert!(body.response_time.is_some());
    }

    #[tokio::test]
    async fn test_health_ready_returns_ready() {
        init_start_time();
        let app = TestApp::new();
        let (status, body) = app.request(Method::GET, "/health/ready", None, None).await;
        assert_eq!(status, StatusCode::OK);
        let body: ReadyResponse = serde_json::from_value(body).unwrap();
        assert_eq!(body.status, "ready");
        assert_eq!(body.checks.database, "healthy");
        assert!(body.uptime.is_some());
    }

    #[test]
    fn test_service_check_skips_empty_fields() {
        let check = ServiceCheck {
            status: "healthy".to_string(),
            response_time: Some(10),
            error: None,
        };
        let json = serde_json::to_string(&check).unwrap();
        assert!(json.contains("responseTime"));
        assert!(!json.contains("error"));
    }
}
