//! JWKS publication: the public halves of the key ring, served at
//! `/.well-known/jwks.json` with caching headers so downstream verifiers can
//! fetch cheaply.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::keyring::KeyRing;

pub const JWKS_PATH: &str = "/.well-known/jwks.json";

/// A single JWK entry in the published document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwkEntry {
    pub kty: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_: String,
    pub kid: String,
    pub n: String,
    pub e: String,
}

/// JWKS document body: `{keys: [...]}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwksDocument {
    pub keys: Vec<JwkEntry>,
}

impl JwksDocument {
    /// Current + previous public keys from the ring.
    pub fn from_ring(ring: &KeyRing) -> Self {
        let snapshot = ring.snapshot();
        let mut keys = Vec::with_capacity(2);
        for key in std::iter::once(&snapshot.current).chain(snapshot.previous.iter()) {
            let (kid, n, e) = key.jwk_components();
            keys.push(JwkEntry {
                kty: "RSA".to_string(),
                alg: "RS256".to_string(),
                use_: "sig".to_string(),
                kid: kid.to_string(),
                n: n.to_string(),
                e: e.to_string(),
            });
        }
        Self { keys }
    }

    /// Weak entity tag derived from the key ids; changes exactly when the
    /// ring rotates.
    pub fn etag(&self) -> String {
        let kids: Vec<&str> = self.keys.iter().map(|k| k.kid.as_str()).collect();
        format!("\"{}\"", kids.join("."))
    }
}

#[derive(Clone)]
pub struct JwksPublisher {
    ring: Arc<KeyRing>,
    max_age_secs: u64,
}

impl JwksPublisher {
    pub fn new(ring: Arc<KeyRing>, max_age_secs: u64) -> Self {
        Self { ring, max_age_secs }
    }

    /// Router serving the JWKS document on the well-known path. Always open;
    /// mount it outside any auth layer.
    pub fn routes(self) -> Router {
        Router::new()
            .route(JWKS_PATH, get(jwks_handler))
            .with_state(Arc::new(self))
    }
}

async fn jwks_handler(State(publisher): State<Arc<JwksPublisher>>) -> Response {
    let document = JwksDocument::from_ring(&publisher.ring);
    let etag = document.etag();

    let mut response = (StatusCode::OK, Json(document)).into_response();
    let headers = response.headers_mut();
    if let Ok(val) = HeaderValue::from_str(&format!("max-age={}", publisher.max_age_secs)) {
        headers.insert(header::CACHE_CONTROL, val);
    }
    if let Ok(val) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, val);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esk::StaticAttestor;
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    #[tokio::test]
    async fn serves_current_and_previous_keys_with_cache_headers() {
        let ring = Arc::new(
            KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
                .await
                .unwrap(),
        );
        ring.rotate().await.unwrap();

        let app = JwksPublisher::new(ring.clone(), 120).routes();
        let response = app
            .oneshot(
                axum::http::Request::builder()
                    .uri(JWKS_PATH)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CACHE_CONTROL).unwrap(),
            "max-age=120"
        );
        assert!(response.headers().contains_key(header::ETAG));

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let doc: JwksDocument = serde_json::from_slice(&body).unwrap();
        assert_eq!(doc.keys.len(), 2);
        assert!(doc.keys.iter().all(|k| k.use_ == "sig" && k.kty == "RSA"));
    }

    #[tokio::test]
    async fn etag_changes_on_rotation() {
        let ring = Arc::new(
            KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
                .await
                .unwrap(),
        );
        let before = JwksDocument::from_ring(&ring).etag();
        ring.rotate().await.unwrap();
        let after = JwksDocument::from_ring(&ring).etag();
        assert_ne!(before, after);
    }
}
