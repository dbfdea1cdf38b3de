//! Structured per-request logging.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::info;

use nvf_core::RequestId;

/// Paths too chatty to log: liveness probes fire every few seconds.
const QUIET_PATHS: [&str; 4] = ["/health/live", "/healthz", "/live", "/health"];

#[derive(Clone)]
pub struct HttpLogState {
    pub service: Arc<str>,
}

impl HttpLogState {
    pub fn new(service: impl Into<Arc<str>>) -> Self {
        Self {
            service: service.into(),
        }
    }
}

/// Middleware logging one line per completed request with the service tag,
/// method, path, status, duration and request id.
pub async fn http_log(
    State(state): State<HttpLogState>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let rid = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.as_str().to_string())
        .unwrap_or_default();
    let quiet = QUIET_PATHS.contains(&path.as_str());

    let start = Instant::now();
    let response = next.run(req).await;

    if !quiet {
        info!(
            service = %state.service,
            method = %method,
            path = %path,
            status = response.status().as_u16(),
            duration_ms = start.elapsed().as_millis() as u64,
            rid = %rid,
            "request"
        );
    }
    response
}
