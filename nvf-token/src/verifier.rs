//! Inbound HOP verification.

use std::sync::Arc;

use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use nvf_config::VerifierConfig;
use tracing::{debug, warn};

use crate::claims::HopClaims;
use crate::error::TokenError;
use crate::esk::epoch_ms;
use crate::jwks_cache::JwksCache;

/// Where decoding keys come from: the remote JWKS cache in production, a
/// static key in tests.
enum KeySource {
    Jwks(Arc<JwksCache>),
    Static(DecodingKey),
}

pub struct TokenVerifier {
    key_source: KeySource,
    config: VerifierConfig,
}

impl TokenVerifier {
    /// Verifier backed by the JWKS endpoint named in the config.
    pub fn new(config: VerifierConfig) -> Self {
        let cache = JwksCache::new(config.jwks_url.clone(), config.jwks_cooldown_ms);
        Self {
            key_source: KeySource::Jwks(Arc::new(cache)),
            config,
        }
    }

    pub fn from_cache(cache: Arc<JwksCache>, config: VerifierConfig) -> Self {
        Self {
            key_source: KeySource::Jwks(cache),
            config,
        }
    }

    /// Static-key verifier for tests.
    pub fn with_static_key(key: DecodingKey, config: VerifierConfig) -> Self {
        Self {
            key_source: KeySource::Static(key),
            config,
        }
    }

    pub fn config(&self) -> &VerifierConfig {
        &self.config
    }

    /// Verify an inbound hop token against this service's audience.
    ///
    /// Enforces signature, issuer allow-list, exact audience, skewed
    /// `iat`/`exp` windows, and the `svc` caller allow-list when the claim
    /// is present.
    pub async fn verify_hop(
        &self,
        token: &str,
        expected_aud: &str,
    ) -> Result<HopClaims, TokenError> {
        if self.config.allowed_issuers.is_empty() {
            return Err(TokenError::VerifierMisconfigured(
                "no allowed issuers configured".into(),
            ));
        }
        if expected_aud.is_empty() {
            return Err(TokenError::VerifierMisconfigured(
                "expected audience is empty".into(),
            ));
        }

        let header = decode_header(token)
            .map_err(|e| TokenError::InvalidToken(format!("undecodable header: {e}")))?;
        if header.alg != Algorithm::RS256 {
            return Err(TokenError::InvalidToken(format!(
                "disallowed algorithm {:?}",
                header.alg
            )));
        }

        let key = match &self.key_source {
            KeySource::Static(key) => key.clone(),
            KeySource::Jwks(cache) => {
                let kid = header
                    .kid
                    .as_deref()
                    .ok_or_else(|| TokenError::InvalidToken("header missing 'kid'".into()))?;
                cache.key_for(kid).await?
            }
        };

        let mut validation = Validation::new(Algorithm::RS256);
        validation.leeway = self.config.clock_skew_secs;
        validation.set_audience(&[expected_aud]);
        validation.set_issuer(&self.config.allowed_issuers);
        validation.validate_exp = true;

        let data = decode::<HopClaims>(token, &key, &validation).map_err(|e| {
            let err = match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => TokenError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidAudience => TokenError::BadAudience,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => TokenError::BadIssuer,
                _ => TokenError::InvalidToken(e.to_string()),
            };
            warn!(error = %err, "hop token rejected");
            err
        })?;

        let claims = data.claims;

        let now = epoch_ms() / 1000;
        if claims.iat > now + self.config.clock_skew_secs as i64 {
            return Err(TokenError::InvalidToken("iat in the future".into()));
        }

        if let Some(svc) = &claims.svc {
            if !self.config.allowed_callers.is_empty()
                && !self.config.allowed_callers.iter().any(|c| c == svc)
            {
                return Err(TokenError::CallerNotAllowed(svc.clone()));
            }
        }

        debug!(iss = %claims.iss, rid = %claims.rid, "hop token accepted");
        Ok(claims)
    }
}
