use axum::{
    extract::{MatchedPath, Request},
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Request ID header name
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Successful requests slower than this are logged at warn
const SLOW_REQUEST: Duration = Duration::from_secs(90);

/// Log every request with its id, route template and outcome, and echo the id back
pub async fn request_logger_middleware(request: Request, next: Next) -> Response {
    let request_id = extract_or_generate_request_id(&request);
    let method = request.method().clone();
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map(|matched| matched.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let start = Instant::now();

    debug!(
        request_id = %request_id,
        method = %method,
        route = %route,
        "Incoming request"
    );

    let response = next.run(request).await;

    let status = response.status();
    let elapsed = start.elapsed();
    let duration_ms = elapsed.as_millis() as u64;

    if status.is_server_error() {
        error!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status = %status,
            duration_ms,
            "Request failed with server error"
        );
    } else if status.is_client_error() {
        warn!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status = %status,
            duration_ms,
            "Request failed with client error"
        );
    } else if elapsed > SLOW_REQUEST {
        warn!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status = %status,
            duration_ms,
            "Slow request"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %method,
            route = %route,
            status = %status,
            duration_ms,
            "Request completed"
        );
    }

    let (mut parts, body) = response.into_parts();
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        parts.headers.insert(REQUEST_ID_HEADER, value);
    }

    Response::from_parts(parts, body)
}

/// Extract existing request ID or generate a new one
fn extract_or_generate_request_id(request: &Request) -> String {
    request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}
