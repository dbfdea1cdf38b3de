//! Request ID middleware — propagates or generates a unique identifier per request.
//!
//! # Behavior
//!
//! 1. Reads `X-Request-Id`, then `X-Correlation-Id`, then `X-Amzn-Trace-Id`
//!    from the incoming request headers; if all are absent, generates a UUID v4.
//! 2. Stores the ID as an Axum request extension (extractable in handlers).
//! 3. Copies the ID into the response `X-Request-Id` header unconditionally.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::{HeaderMap, HeaderValue};
use axum::response::{IntoResponse, Response};

use crate::headers::{X_AMZN_TRACE_ID, X_CORRELATION_ID, X_REQUEST_ID};

/// A request identifier — propagated from an inbound correlation header or
/// generated as a UUID v4.
///
/// Implements [`FromRequestParts`] for use as a handler parameter and
/// [`Display`](std::fmt::Display) for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    /// Extract the request id from inbound headers, minting one when no
    /// recognized correlation header is present.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        for name in [&X_REQUEST_ID, &X_CORRELATION_ID, &X_AMZN_TRACE_ID] {
            if let Some(v) = headers.get(name).and_then(|v| v.to_str().ok()) {
                if !v.is_empty() {
                    return RequestId(v.to_string());
                }
            }
        }
        RequestId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for RequestId {
    type Rejection = std::convert::Infallible;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        async move {
            let id = parts
                .extensions
                .get::<RequestId>()
                .cloned()
                .unwrap_or_else(|| RequestId(uuid::Uuid::new_v4().to_string()));
            Ok(id)
        }
    }
}

impl IntoResponse for RequestId {
    fn into_response(self) -> Response {
        self.0.into_response()
    }
}

/// Middleware function that injects the request ID and echoes it back.
///
/// Install with `axum::middleware::from_fn(request_id_middleware)`; it must
/// sit outermost so every later layer (and the error renderer) can read the
/// extension.
pub async fn request_id_middleware(
    mut req: axum::extract::Request,
    next: axum::middleware::Next,
) -> Response {
    let request_id = RequestId::from_headers(req.headers());
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(val) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(X_REQUEST_ID.clone(), val);
    }

    response
}
