//! Inbound S2S receiver: hop verification, route policy, audit bracketing.
//!
//! Installed as axum middleware in front of a service's routes. Open paths
//! (health probes, JWKS) bypass everything; every other request must present
//! a valid hop token, pass route policy, and gets `begin`/`end` audit blobs
//! journaled around its handler.

use std::collections::HashSet;
use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use tracing::{debug, error, warn};

use nvf_core::headers::X_USER_ASSERTION;
use nvf_core::{Problem, RequestId};
use nvf_policy::{AssertionMode, RoutePolicyStore};
use nvf_token::{HopClaims, TokenError, TokenVerifier};
use nvf_wal::{AuditBlob, WalEngine};

use crate::context::S2sContext;

/// Paths that never require authentication.
fn default_open_paths() -> HashSet<String> {
    [
        "/health",
        "/health/live",
        "/health/ready",
        "/healthz",
        "/readyz",
        "/live",
        "/ready",
        "/.well-known/jwks.json",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

pub struct SvcReceiver {
    verifier: Arc<TokenVerifier>,
    policy: Arc<RoutePolicyStore>,
    engine: Option<Arc<WalEngine>>,
    service_slug: String,
    major_version: u16,
    api_prefix: String,
    open_paths: HashSet<String>,
}

impl SvcReceiver {
    pub fn new(
        verifier: Arc<TokenVerifier>,
        policy: Arc<RoutePolicyStore>,
        service_slug: impl Into<String>,
        major_version: u16,
    ) -> Self {
        Self {
            verifier,
            policy,
            engine: None,
            service_slug: service_slug.into(),
            major_version,
            api_prefix: "/api".to_string(),
            open_paths: default_open_paths(),
        }
    }

    /// Attach the WAL engine; without one the receiver still authenticates
    /// but emits no audit blobs (tests, tooling).
    pub fn with_engine(mut self, engine: Arc<WalEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_open_path(mut self, path: impl Into<String>) -> Self {
        self.open_paths.insert(path.into());
        self
    }

    /// The path route policy rules are written against: the inbound path
    /// with the `<prefix>/<slug>` mount stripped.
    fn policy_path<'a>(&self, path: &'a str) -> &'a str {
        let mount = format!("{}/{}", self.api_prefix, self.service_slug);
        match path.strip_prefix(&mount) {
            Some(rest) if rest.starts_with('/') => rest,
            _ => path,
        }
    }

    fn emit(&self, blob: AuditBlob) -> Result<(), Response> {
        let Some(engine) = &self.engine else {
            return Ok(());
        };
        let rid = blob.meta.request_id.clone();
        engine.append(blob).map_err(|err| {
            error!(error = %err, rid = %rid, "audit journal append failed, refusing request");
            Problem::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                "audit journal unavailable",
                rid,
            )
            .into_response()
        })
    }
}

fn unauthorized(detail: &str, rid: &str) -> Response {
    Problem::from_status(StatusCode::UNAUTHORIZED, detail, rid).into_response()
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// The receiver middleware. Install with
/// `axum::middleware::from_fn_with_state(receiver, receive)`.
pub async fn receive(
    State(receiver): State<Arc<SvcReceiver>>,
    mut req: Request,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    if receiver.open_paths.contains(&path) {
        return next.run(req).await;
    }

    let request_id = req
        .extensions()
        .get::<RequestId>()
        .cloned()
        .unwrap_or_else(|| RequestId::from_headers(req.headers()));
    let rid = request_id.as_str().to_string();

    let Some(token) = bearer_token(&req) else {
        warn!(%path, rid = %rid, "S2S request without bearer token");
        return unauthorized("missing bearer token", &rid);
    };

    let claims: HopClaims = match receiver
        .verifier
        .verify_hop(token, &receiver.service_slug)
        .await
    {
        Ok(claims) => claims,
        Err(err @ TokenError::VerifierMisconfigured(_)) => {
            error!(error = %err, rid = %rid, "hop verification unavailable");
            return Problem::from_status(
                StatusCode::INTERNAL_SERVER_ERROR,
                "verifier misconfigured",
                &rid,
            )
            .into_response();
        }
        Err(err) => {
            warn!(error = %err, %path, rid = %rid, "hop token rejected");
            return unauthorized(err.public_detail(), &rid);
        }
    };

    let method = req.method().as_str().to_string();
    let policy_path = receiver.policy_path(&path).to_string();
    let decision = receiver.policy.lookup(
        &receiver.service_slug,
        receiver.major_version,
        &method,
        &policy_path,
    );
    let Some(rule) = decision.rule else {
        warn!(%path, method = %method, rid = %rid, "route denied by policy");
        return Problem::from_status(
            StatusCode::FORBIDDEN,
            "route not permitted by policy",
            &rid,
        )
        .into_response();
    };

    match rule.user_assertion {
        AssertionMode::Forbidden => {
            req.headers_mut().remove(&X_USER_ASSERTION);
        }
        AssertionMode::Required => {
            let has_assertion =
                req.headers().contains_key(&X_USER_ASSERTION) || claims.act.is_some();
            if !has_assertion {
                warn!(%path, rid = %rid, "user assertion required but absent");
                return unauthorized("user assertion required", &rid);
            }
        }
        AssertionMode::Optional => {}
    }

    let context = S2sContext {
        request_id: rid.clone(),
        caller: claims.iss.clone(),
        act: if rule.user_assertion == AssertionMode::Forbidden {
            None
        } else {
            claims.act.clone()
        },
        deadline_ms: claims.exp * 1000,
    };
    req.extensions_mut().insert(request_id.clone());
    req.extensions_mut().insert(context);

    let now = chrono::Utc::now().timestamp_millis();
    let begin = AuditBlob::new(
        &receiver.service_slug,
        now,
        &rid,
        serde_json::json!({
            "phase": "begin",
            "method": method,
            "path": path.clone(),
            "caller": claims.iss.clone(),
            "opId": rule.op_id.clone(),
        }),
    );
    if let Err(response) = receiver.emit(begin) {
        return response;
    }

    debug!(%path, caller = %claims.iss, rid = %rid, "S2S request admitted");
    let response = next.run(req).await;

    let end = AuditBlob::new(
        &receiver.service_slug,
        chrono::Utc::now().timestamp_millis(),
        &rid,
        serde_json::json!({
            "phase": "end",
            "status": response.status().as_u16(),
            "opId": rule.op_id.clone(),
        }),
    );
    if let Err(failure) = receiver.emit(end) {
        return failure;
    }

    response
}
