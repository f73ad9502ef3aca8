use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use booking_core::Metrics;
use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::AppError;

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Label for requests no route matched, so unknown paths share one series.
const UNMATCHED_PATH: &str = "unmatched";

/// Counts every request under its route template, not the concrete URI.
pub async fn track_http(State(metrics): State<Arc<Metrics>>, req: Request, next: Next) -> Response {
    let method = req.method().to_string();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| UNMATCHED_PATH.to_owned());

    let start = Instant::now();
    metrics.http_request_started();
    let response = next.run(req).await;
    metrics.http_request_finished(&method, &path, response.status().as_u16(), start.elapsed().as_secs_f64());

    response
}

pub async fn request_timeout(State(limit): State<Duration>, req: Request, next: Next) -> Response {
    let path = req.uri().path().to_owned();
    match tokio::time::timeout(limit, next.run(req)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(path = %path, timeout_ms = limit.as_millis() as u64, "Request timed out");
            AppError::Timeout("request timeout".into()).into_response()
        }
    }
}

/// Renders a handler panic as the standard error envelope.
pub fn panic_response(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    };
    AppError::Anyhow(anyhow::anyhow!("handler panicked: {detail}")).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use serde_json::Value;
    use tower::ServiceExt;
    use tower_http::catch_panic::CatchPanicLayer;

    async fn slow() -> &'static str {
        tokio::time::sleep(Duration::from_secs(60)).await;
        "done"
    }

    async fn boom() -> &'static str {
        panic!("lost the booking ledger")
    }

    async fn call(router: Router, uri: &str) -> (StatusCode, Value) {
        let response = router
            .oneshot(axum::http::Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_request_gets_timeout_envelope() {
        let router = Router::new()
            .route("/slow", get(slow))
            .layer(axum::middleware::from_fn_with_state(REQUEST_TIMEOUT, request_timeout));

        let (status, body) = call(router, "/slow").await;
        assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["type"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "request timeout");
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error_and_is_counted() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let router = Router::new()
            .route("/boom/{id}", get(boom))
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(axum::middleware::from_fn_with_state(metrics.clone(), track_http));

        let (status, body) = call(router, "/boom/7").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["type"], "INTERNAL_ERROR");
        assert_eq!(body["error"]["message"], "Internal Server Error");

        assert_eq!(metrics.http_request_count("GET", "/boom/{id}", 500), 1);
        assert_eq!(metrics.http_in_flight(), 0);
    }

    #[tokio::test]
    async fn test_unknown_paths_share_one_series() {
        let metrics = Arc::new(Metrics::new().unwrap());
        let router = Router::new()
            .route("/known", get(|| async { "ok" }))
            .layer(axum::middleware::from_fn_with_state(metrics.clone(), track_http));

        call(router.clone(), "/nope/1").await;
        call(router, "/nope/2").await;
        assert_eq!(metrics.http_request_count("GET", UNMATCHED_PATH, 404), 2);
    }
}
