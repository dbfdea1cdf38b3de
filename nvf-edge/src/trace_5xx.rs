//! First-5xx capture: log the origin once per request and enqueue an
//! audit-error event so operators can triage without grepping handler code.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::{error, warn};

use nvf_core::RequestId;
use nvf_wal::{AuditBlob, WalEngine};

#[derive(Clone)]
pub struct Trace5xxState {
    pub service: Arc<str>,
    pub engine: Option<Arc<WalEngine>>,
}

impl Trace5xxState {
    pub fn new(service: impl Into<Arc<str>>, engine: Option<Arc<WalEngine>>) -> Self {
        Self {
            service: service.into(),
            engine,
        }
    }
}

pub async fn trace_5xx(
    State(state): State<Trace5xxState>,
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

    let response = next.run(req).await;

    let status = response.status();
    if status.is_server_error() {
        warn!(
            service = %state.service,
            method = %method,
            path = %path,
            status = status.as_u16(),
            rid = %rid,
            "5xx response"
        );
        if let Some(engine) = &state.engine {
            let blob = AuditBlob::new(
                state.service.as_ref(),
                chrono::Utc::now().timestamp_millis(),
                if rid.is_empty() { "unknown" } else { &rid },
                serde_json::json!({
                    "phase": "end",
                    "error": true,
                    "status": status.as_u16(),
                    "path": path,
                }),
            );
            if let Err(err) = engine.append(blob) {
                error!(error = %err, rid = %rid, "failed to journal audit-error event");
            }
        }
    }
    response
}
