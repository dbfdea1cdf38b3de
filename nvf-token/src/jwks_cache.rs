//! Verifier-side JWKS cache.
//!
//! Keys are indexed by `kid`. An unknown `kid` triggers at most one refresh
//! before failing; refresh attempts honor a cooldown so a flapping issuer
//! cannot turn every request into a JWKS fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::DecodingKey;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::debug;

use crate::error::TokenError;

const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// The subset of a JWK the verifier needs. `DecodingKey` does not implement
/// `Clone` from components, so the raw material is kept and keys are rebuilt
/// on demand.
#[derive(Debug, Clone, Deserialize)]
struct FetchedJwk {
    kid: Option<String>,
    kty: String,
    #[serde(default)]
    n: Option<String>,
    #[serde(default)]
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FetchedJwks {
    keys: Vec<FetchedJwk>,
}

impl FetchedJwk {
    fn to_decoding_key(&self) -> Result<DecodingKey, TokenError> {
        if self.kty != "RSA" {
            return Err(TokenError::VerifierMisconfigured(format!(
                "unsupported key type {}",
                self.kty
            )));
        }
        let n = self
            .n
            .as_deref()
            .ok_or_else(|| TokenError::VerifierMisconfigured("RSA key missing 'n'".into()))?;
        let e = self
            .e
            .as_deref()
            .ok_or_else(|| TokenError::VerifierMisconfigured("RSA key missing 'e'".into()))?;
        DecodingKey::from_rsa_components(n, e)
            .map_err(|err| TokenError::VerifierMisconfigured(format!("bad RSA components: {err}")))
    }
}

struct CacheState {
    keys: HashMap<String, FetchedJwk>,
    refreshed_at: Option<Instant>,
    attempted_at: Option<Instant>,
}

/// TTL-bounded cache of a remote JWKS document.
pub struct JwksCache {
    state: Arc<RwLock<CacheState>>,
    refresh_gate: Mutex<()>,
    client: reqwest::Client,
    jwks_url: String,
    ttl: Duration,
    cooldown: Duration,
}

impl JwksCache {
    pub fn new(jwks_url: impl Into<String>, cooldown_ms: u64) -> Self {
        Self {
            state: Arc::new(RwLock::new(CacheState {
                keys: HashMap::new(),
                refreshed_at: None,
                attempted_at: None,
            })),
            refresh_gate: Mutex::new(()),
            client: reqwest::Client::new(),
            jwks_url: jwks_url.into(),
            ttl: DEFAULT_TTL,
            cooldown: Duration::from_millis(cooldown_ms),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Decoding key for `kid`, refreshing once when the kid is unknown or
    /// the cache has gone stale.
    pub async fn key_for(&self, kid: &str) -> Result<DecodingKey, TokenError> {
        {
            let state = self.state.read().await;
            if let Some(jwk) = state.keys.get(kid) {
                if !expired(state.refreshed_at, self.ttl) {
                    return jwk.to_decoding_key();
                }
            }
        }

        self.refresh_guarded(kid).await?;

        let state = self.state.read().await;
        state
            .keys
            .get(kid)
            .ok_or_else(|| TokenError::UnknownKeyId(kid.to_string()))?
            .to_decoding_key()
    }

    async fn refresh_guarded(&self, kid: &str) -> Result<(), TokenError> {
        let _gate = self.refresh_gate.lock().await;

        // Another task may have refreshed while we waited on the gate.
        {
            let state = self.state.read().await;
            if state.keys.contains_key(kid) && !expired(state.refreshed_at, self.ttl) {
                return Ok(());
            }
            if let Some(at) = state.attempted_at {
                if at.elapsed() < self.cooldown {
                    debug!(%kid, "JWKS refresh suppressed by cooldown");
                    return Ok(());
                }
            }
        }

        {
            let mut state = self.state.write().await;
            state.attempted_at = Some(Instant::now());
        }

        let fetched: FetchedJwks = self
            .client
            .get(&self.jwks_url)
            .send()
            .await
            .map_err(|e| TokenError::JwksFetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| TokenError::JwksFetch(e.to_string()))?
            .json()
            .await
            .map_err(|e| TokenError::JwksFetch(format!("unparseable JWKS: {e}")))?;

        let mut keys = HashMap::new();
        for jwk in fetched.keys {
            if let Some(kid) = jwk.kid.clone() {
                keys.insert(kid, jwk);
            }
        }
        debug!(count = keys.len(), "JWKS refreshed");

        let mut state = self.state.write().await;
        state.keys = keys;
        state.refreshed_at = Some(Instant::now());
        Ok(())
    }
}

fn expired(refreshed_at: Option<Instant>, ttl: Duration) -> bool {
    match refreshed_at {
        None => true,
        Some(at) => at.elapsed() >= ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_when_never_refreshed() {
        assert!(expired(None, Duration::from_secs(60)));
    }

    #[test]
    fn expired_after_ttl() {
        let at = Instant::now() - Duration::from_secs(61);
        assert!(expired(Some(at), Duration::from_secs(60)));
        let at = Instant::now() - Duration::from_secs(10);
        assert!(!expired(Some(at), Duration::from_secs(60)));
    }

    #[test]
    fn non_rsa_keys_are_rejected() {
        let jwk = FetchedJwk {
            kid: Some("k1".into()),
            kty: "EC".into(),
            n: None,
            e: None,
        };
        assert!(matches!(
            jwk.to_decoding_key(),
            Err(TokenError::VerifierMisconfigured(_))
        ));
    }
}
