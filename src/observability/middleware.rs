// ============================================================================
// HTTP METRICS MIDDLEWARE
// ============================================================================

use axum::{extract::MatchedPath, extract::Request, middleware::Next, response::Response};
use std::time::Instant;

use crate::observability::record_http_request;

/// Records count and latency of every request
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let endpoint = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_string(),
        None => normalize_path(req.uri().path()),
    };

    let response = next.run(req).await;

    record_http_request(
        &method,
        &endpoint,
        response.status().as_u16(),
        start.elapsed().as_secs_f64(),
    );

    response
}

/// Collapses numeric ids so unmatched paths don't explode label cardinality
fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|seg| if seg.parse::<i64>().is_ok() { ":id" } else { seg })
        .collect::<Vec<_>>()
        .join("/")
}
