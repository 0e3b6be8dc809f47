//! Service middleware for metrics and request tracking.
//!
//! ## Metrics Exposed
//!
//! Metrics are emitted as structured log events under the
//! `revision_kernel::metrics` target:
//!
//! - `request_metric` - path pattern, method, status and latency per request
//! - `action_metric` - page action, outcome code and latency per dispatch

use axum::{extract::Request, middleware::Next, response::Response};
use regex_lite::Regex;
use std::sync::OnceLock;
use std::time::Instant;
use tracing::info;

use crate::action::PageAction;

/// Metrics middleware that records request counts and latency.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = normalize_path(request.uri().path());

    let response = next.run(request).await;

    let latency = start.elapsed();
    let status = response.status().as_u16();

    info!(
        target: "revision_kernel::metrics",
        metric_type = "request",
        path = %path,
        method = %method,
        status = status,
        latency_ms = latency.as_millis() as u64,
        "request_metric"
    );

    response
}

/// Normalize path for metrics to avoid high cardinality.
///
/// Site ids become `:site_id` and page slugs become `:slug`; the action
/// segment is kept.
fn normalize_path(path: &str) -> String {
    static PAGE_PATH: OnceLock<Regex> = OnceLock::new();
    let regex = PAGE_PATH.get_or_init(|| {
        Regex::new(r"^/api/sites/[^/]+/pages/[^/]+").expect("static regex")
    });

    regex.replace(path, "/api/sites/:site_id/pages/:slug").to_string()
}

/// Record the outcome of one dispatched page action.
///
/// `outcome` is `"ok"` or the error code.
pub fn record_action_metrics(action: PageAction, outcome: &str, latency_ms: u64) {
    info!(
        target: "revision_kernel::metrics",
        metric_type = "action",
        action = %action,
        mutation = action.is_mutation(),
        outcome = outcome,
        latency_ms = latency_ms,
        "action_metric"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_replaces_site_and_slug() {
        let path = "/api/sites/42/pages/scp-173/edit";
        assert_eq!(normalize_path(path), "/api/sites/:site_id/pages/:slug/edit");
    }

    #[test]
    fn test_normalize_path_delete_route() {
        let path = "/api/sites/7/pages/system:recent-changes";
        assert_eq!(normalize_path(path), "/api/sites/:site_id/pages/:slug");
    }

    #[test]
    fn test_normalize_path_preserves_regular_path() {
        assert_eq!(normalize_path("/health/ready"), "/health/ready");
    }
}
