//! Per-request logging and `x-request-id` handling.

use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};
use std::time::Instant;
use tower_http::request_id::{
    MakeRequestUuid, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};

fn user_agent(headers: &HeaderMap) -> &str {
    headers
        .get(axum::http::header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("-")
}

pub async fn log_request(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let agent = user_agent(request.headers()).to_string();

    let req_id: String = request
        .extensions()
        .get::<RequestId>()
        .and_then(|id| id.header_value().to_str().ok())
        .unwrap_or("unknown")
        .to_string();

    tracing::debug!(
        request_id = %req_id,
        method = %method,
        path = %path,
        user_agent = %agent,
        "incoming request"
    );

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        tracing::error!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration_ms,
            "request failed"
        );
    } else if status.is_client_error() {
        tracing::warn!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration_ms,
            "request rejected"
        );
    } else {
        tracing::info!(
            request_id = %req_id,
            method = %method,
            path = %path,
            status = %status,
            duration_ms = %duration_ms,
            "request completed"
        );
    }

    response
}

pub fn request_id_layer() -> SetRequestIdLayer<MakeRequestUuid> {
    SetRequestIdLayer::x_request_id(MakeRequestUuid)
}

pub fn propagate_request_id_layer() -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::x_request_id()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestApp;
    use axum::body::Body;

    #[test]
    fn test_user_agent_defaults_to_dash() {
        let mut headers = HeaderMap::new();
        assert_eq!(user_agent(&headers), "-");
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        assert_eq!(user_agent(&headers), "curl/8.0");
    }

    #[tokio::test]
    async fn test_responses_carry_request_id() {
        let app = TestApp::new();
        let res = tower::ServiceExt::oneshot(
            app.router.clone(),
            axum::http::Request::get("/health").body(Body::empty()).unwrap(),
        )
        .await
        .unwrap();
        assert!(res.headers().contains_key("x-request-id"));
    }
}
