//! Read-only gate: refuse mutating methods with 503 while the mode is on.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{Method, StatusCode};
use tracing::warn;

use nvf_config::ReadOnlyConfig;
use nvf_core::{Problem, RequestId};

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub async fn read_only_gate(
    State(config): State<ReadOnlyConfig>,
    req: Request,
    next: Next,
) -> Response {
    if !config.enabled || !is_mutating(req.method()) {
        return next.run(req).await;
    }

    let path = req.uri().path();
    if config
        .exempt_prefixes
        .iter()
        .any(|prefix| path.starts_with(prefix.as_str()))
    {
        return next.run(req).await;
    }

    let rid = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.as_str().to_string())
        .unwrap_or_default();
    warn!(method = %req.method(), path = %path, rid = %rid, "mutation refused in read-only mode");
    Problem::from_status(
        StatusCode::SERVICE_UNAVAILABLE,
        "service is in read-only mode",
        rid,
    )
    .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_mutating_methods() {
        assert!(is_mutating(&Method::POST));
        assert!(is_mutating(&Method::DELETE));
        assert!(!is_mutating(&Method::GET));
        assert!(!is_mutating(&Method::HEAD));
    }
}
