//! Request timing middleware
//!
//! Tags every request with a v4 request id (echoed in `x-request-id`) and
//! logs its duration; requests over the slow threshold log at warn.

use axum::{
    extract::{Request, State},
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{debug, info_span, warn, Instrument};
use uuid::Uuid;

use crate::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

pub async fn request_timing(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let request_id = Uuid::new_v4();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = info_span!("request", %request_id, %method, path = %path);

    let started = Instant::now();
    let mut response = next.run(request).instrument(span).await;
    let elapsed = started.elapsed();
    let elapsed_ms = elapsed.as_millis() as u64;
    let status = response.status().as_u16();

    if elapsed > state.slow_request {
        warn!(
            %request_id,
            %method,
            path = %path,
            status,
            elapsed_ms,
            threshold_ms = state.slow_request.as_millis() as u64,
            "Slow request"
        );
    } else {
        debug!(%request_id, %method, path = %path, status, elapsed_ms, "Request completed");
    }

    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}
