//! Canonical header names used across the fabric.
//!
//! Every service speaks the same header dialect; keeping the names in one
//! place prevents the `X-Request-Id` / `x-requestid` drift that plagued the
//! first platform iteration.

use http::HeaderName;

/// Primary request correlation header, echoed on every response.
pub static X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Alternate correlation headers accepted on inbound requests, in order of
/// preference after [`X_REQUEST_ID`].
pub static X_CORRELATION_ID: HeaderName = HeaderName::from_static("x-correlation-id");
pub static X_AMZN_TRACE_ID: HeaderName = HeaderName::from_static("x-amzn-trace-id");

/// Calling service slug on S2S requests.
pub static X_SERVICE_NAME: HeaderName = HeaderName::from_static("x-service-name");

/// Caller's major API version on S2S requests.
pub static X_API_VERSION: HeaderName = HeaderName::from_static("x-api-version");

/// Optional end-user assertion forwarded on S2S requests when route policy
/// permits it.
pub static X_USER_ASSERTION: HeaderName = HeaderName::from_static("x-user-assertion");

/// Contract identifier attached to body-carrying S2S calls.
pub static X_NV_CONTRACT: HeaderName = HeaderName::from_static("x-nv-contract");
