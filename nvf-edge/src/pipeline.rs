//! The ordered middleware stack shared by every fabric service.
//!
//! Outermost to innermost: request-id, http-log, trace-5xx, verify-hop
//! (internal services), read-only gate, 413 rewrite, body size cap, panic
//! catcher, then the service's own routes with health mounted open and a
//! problem+json 404 fallback under the API prefix.

use std::sync::Arc;

use axum::{middleware, Router};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::limit::RequestBodyLimitLayer;

use nvf_config::ReadOnlyConfig;
use nvf_core::request_id::request_id_middleware;
use nvf_s2s::{receive, SvcReceiver};
use nvf_wal::WalEngine;

use crate::health::HealthRoutes;
use crate::http_log::{http_log, HttpLogState};
use crate::problem_handlers::{not_found, panic_response, problem_413};
use crate::read_only::read_only_gate;
use crate::trace_5xx::{trace_5xx, Trace5xxState};

const DEFAULT_BODY_LIMIT: usize = 1024 * 1024;

pub struct EdgePipeline {
    service_slug: String,
    api_prefix: String,
    read_only: ReadOnlyConfig,
    body_limit: usize,
    receiver: Option<Arc<SvcReceiver>>,
    engine: Option<Arc<WalEngine>>,
    health: HealthRoutes,
}

impl EdgePipeline {
    pub fn new(service_slug: impl Into<String>) -> Self {
        Self {
            service_slug: service_slug.into(),
            api_prefix: "/api".to_string(),
            read_only: ReadOnlyConfig::default(),
            body_limit: DEFAULT_BODY_LIMIT,
            receiver: None,
            engine: None,
            health: HealthRoutes::new(),
        }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }

    pub fn with_read_only(mut self, config: ReadOnlyConfig) -> Self {
        self.read_only = config;
        self
    }

    pub fn with_body_limit(mut self, bytes: usize) -> Self {
        self.body_limit = bytes;
        self
    }

    /// Internal services install the S2S receiver; the public gateway does
    /// its own edge authentication instead.
    pub fn with_receiver(mut self, receiver: Arc<SvcReceiver>) -> Self {
        self.receiver = Some(receiver);
        self
    }

    /// WAL engine for audit-error events emitted on 5xx responses.
    pub fn with_engine(mut self, engine: Arc<WalEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn with_health(mut self, health: HealthRoutes) -> Self {
        self.health = health;
        self
    }

    /// Assemble the stack around the service's routes.
    pub fn router(self, routes: Router) -> Router {
        let api_prefix: Arc<str> = self.api_prefix.into();

        let mut app = Router::new()
            .merge(self.health.router())
            .merge(routes)
            .fallback_service(axum::routing::any(not_found).with_state(api_prefix));

        // Innermost layers first; each .layer wraps everything before it.
        app = app
            .layer(CatchPanicLayer::custom(panic_response))
            .layer(RequestBodyLimitLayer::new(self.body_limit))
            .layer(middleware::from_fn(problem_413))
            .layer(middleware::from_fn_with_state(
                self.read_only,
                read_only_gate,
            ));

        if let Some(receiver) = self.receiver {
            app = app.layer(middleware::from_fn_with_state(receiver, receive));
        }

        app.layer(middleware::from_fn_with_state(
            Trace5xxState::new(self.service_slug.clone(), self.engine),
            trace_5xx,
        ))
        .layer(middleware::from_fn_with_state(
            HttpLogState::new(self.service_slug),
            http_log,
        ))
        .layer(middleware::from_fn(request_id_middleware))
    }
}
