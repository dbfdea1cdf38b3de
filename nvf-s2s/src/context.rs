//! Per-request S2S context established by the receiver.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use http::StatusCode;

use nvf_core::Problem;
use nvf_token::Act;

/// What a verified inbound S2S request knows about itself.
#[derive(Debug, Clone)]
pub struct S2sContext {
    pub request_id: String,
    /// Verified caller slug (the hop token's issuer).
    pub caller: String,
    /// End-user projection, when the route policy allows one.
    pub act: Option<Act>,
    /// Absolute deadline, epoch milliseconds, derived from the hop expiry.
    pub deadline_ms: i64,
}

impl<S: Send + Sync> FromRequestParts<S> for S2sContext {
    type Rejection = Problem;

    fn from_request_parts(
        parts: &mut Parts,
        _state: &S,
    ) -> impl std::future::Future<Output = Result<Self, Self::Rejection>> + Send {
        let ctx = parts.extensions.get::<S2sContext>().cloned();
        async move {
            ctx.ok_or_else(|| {
                Problem::from_status(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "handler reached without a verified S2S context",
                    "unknown",
                )
            })
        }
    }
}
