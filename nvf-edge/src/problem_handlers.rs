//! Problem+json rendering at the edges of the router: API 404s, oversized
//! bodies, and panics.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::{header, HeaderValue, StatusCode};

use nvf_core::{Problem, RequestId, PROBLEM_CONTENT_TYPE};

/// Fallback handler: problem+json under the API prefix, bare 404 elsewhere.
pub async fn not_found(
    State(api_prefix): State<std::sync::Arc<str>>,
    rid: RequestId,
    req: Request,
) -> Response {
    let path = req.uri().path();
    if path.starts_with(api_prefix.as_ref()) {
        Problem::from_status(StatusCode::NOT_FOUND, "no such route", rid.as_str())
            .into_response()
    } else {
        StatusCode::NOT_FOUND.into_response()
    }
}

/// Rewrite plain 413s (from the body-limit layer) into problem+json.
pub async fn problem_413(req: Request, next: Next) -> Response {
    let rid = req
        .extensions()
        .get::<RequestId>()
        .map(|r| r.as_str().to_string())
        .unwrap_or_default();
    let response = next.run(req).await;

    if response.status() == StatusCode::PAYLOAD_TOO_LARGE && !is_problem(&response) {
        return Problem::from_status(
            StatusCode::PAYLOAD_TOO_LARGE,
            "request body too large",
            rid,
        )
        .into_response();
    }
    response
}

fn is_problem(response: &Response) -> bool {
    response
        .headers()
        .get(header::CONTENT_TYPE)
        .map(|v| v == HeaderValue::from_static(PROBLEM_CONTENT_TYPE))
        .unwrap_or(false)
}

/// Panic-to-problem conversion for the catch-panic layer.
pub fn panic_response(_err: Box<dyn std::any::Any + Send + 'static>) -> Response {
    Problem::from_status(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal error",
        "unknown",
    )
    .into_response()
}
