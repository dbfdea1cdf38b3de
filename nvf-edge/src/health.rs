//! Health probes, always open.
//!
//! | Path | Behavior |
//! |------|----------|
//! | `GET /health` | Aggregated status — 200 if UP, 503 if DOWN |
//! | `GET /health/live`, `/healthz`, `/live` | Liveness — always 200 |
//! | `GET /health/ready`, `/readyz`, `/ready` | Readiness — 200 when all checks pass |

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use http::StatusCode;
use serde::Serialize;

/// Result of a single readiness check.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Up,
    Down(String),
}

impl HealthStatus {
    pub fn is_up(&self) -> bool {
        matches!(self, HealthStatus::Up)
    }
}

/// A named readiness check (WAL dir writable, config service reachable...).
pub trait HealthIndicator: Send + Sync + 'static {
    fn name(&self) -> &str;
    fn check(&self) -> Pin<Box<dyn Future<Output = HealthStatus> + Send + '_>>;
}

#[derive(Debug, Serialize)]
struct CheckReport {
    name: String,
    up: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct HealthReport {
    status: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    checks: Vec<CheckReport>,
}

/// Builder for the open health router.
#[derive(Default)]
pub struct HealthRoutes {
    checks: Vec<Box<dyn HealthIndicator>>,
}

impl HealthRoutes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn check(mut self, indicator: impl HealthIndicator) -> Self {
        self.checks.push(Box::new(indicator));
        self
    }

    /// Build the router with canonical paths and legacy aliases.
    pub fn router(self) -> Router {
        let state = Arc::new(self.checks);
        Router::new()
            .route("/health", get(aggregate_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/healthz", get(liveness_handler))
            .route("/readyz", get(readiness_handler))
            .route("/live", get(liveness_handler))
            .route("/ready", get(readiness_handler))
            .with_state(state)
    }
}

type Checks = Arc<Vec<Box<dyn HealthIndicator>>>;

async fn run_checks(checks: &Checks) -> HealthReport {
    let mut reports = Vec::with_capacity(checks.len());
    let mut all_up = true;
    for indicator in checks.iter() {
        let status = indicator.check().await;
        if !status.is_up() {
            all_up = false;
        }
        reports.push(CheckReport {
            name: indicator.name().to_string(),
            up: status.is_up(),
            reason: match status {
                HealthStatus::Up => None,
                HealthStatus::Down(reason) => Some(reason),
            },
        });
    }
    HealthReport {
        status: if all_up { "UP" } else { "DOWN" },
        checks: reports,
    }
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(checks): State<Checks>) -> impl IntoResponse {
    let report = run_checks(&checks).await;
    let status = if report.status == "UP" {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

async fn aggregate_handler(State(checks): State<Checks>) -> impl IntoResponse {
    readiness_handler(State(checks)).await
}
