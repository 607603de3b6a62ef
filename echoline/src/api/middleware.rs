//! Request logging middleware for Axum

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use std::time::Instant;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

/// Header carrying the per-request id back to the caller
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Log method, path, status and latency for every request under a fresh request id
pub async fn request_logging(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let span = tracing::info_span!("request", id = %request_id);

    let start = Instant::now();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed = start.elapsed();
    let status = response.status();

    span.in_scope(|| {
        if status.is_server_error() {
            warn!("{} {} -> {} in {:?}", method, path, status.as_u16(), elapsed);
        } else {
            info!("{} {} -> {} in {:?}", method, path, status.as_u16(), elapsed);
        }
    });

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    response
}
