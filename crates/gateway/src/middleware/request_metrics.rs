//! Per-request counters and latency histograms

use askdocs_common::metrics::RequestMetrics;
use axum::{
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
};

/// Record method, route template and status for every routed request
pub async fn track_metrics(request: Request, next: Next) -> Response {
    let endpoint = request
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());

    let tracker = RequestMetrics::start(request.method().as_str(), &endpoint);
    let response = next.run(request).await;
    tracker.finish(response.status().as_u16());

    response
}
