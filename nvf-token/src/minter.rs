//! Token minting against the current signing key.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{encode, Algorithm, Header};
use serde::Serialize;

use crate::claims::{Act, CtxClaims, HopClaims};
use crate::error::TokenError;
use crate::esk::epoch_ms;
use crate::keyring::KeyRing;

/// Upper bound the fabric enforces on hop token lifetime.
pub const MAX_HOP_TTL: Duration = Duration::from_secs(120);

const DEFAULT_HOP_TTL: Duration = Duration::from_secs(90);
const DEFAULT_HOP_BUDGET: u32 = 8;

pub struct TokenMinter {
    ring: Arc<KeyRing>,
    service_slug: String,
    hop_ttl: Duration,
    hop_budget_max: u32,
}

impl TokenMinter {
    pub fn new(ring: Arc<KeyRing>, service_slug: impl Into<String>) -> Self {
        Self {
            ring,
            service_slug: service_slug.into(),
            hop_ttl: DEFAULT_HOP_TTL,
            hop_budget_max: DEFAULT_HOP_BUDGET,
        }
    }

    /// Set the hop token lifetime, clamped to [`MAX_HOP_TTL`].
    pub fn with_hop_ttl(mut self, ttl: Duration) -> Self {
        self.hop_ttl = ttl.min(MAX_HOP_TTL);
        self
    }

    pub fn with_hop_budget(mut self, budget: u32) -> Self {
        self.hop_budget_max = budget;
        self
    }

    pub fn service_slug(&self) -> &str {
        &self.service_slug
    }

    /// Mint a context token at the public edge. The deadline doubles as the
    /// token's expiry.
    pub fn mint_ctx(
        &self,
        rid: &str,
        deadline_ms: i64,
        act: Option<Act>,
    ) -> Result<(String, CtxClaims), TokenError> {
        let now = epoch_ms();
        let claims = CtxClaims {
            rid: rid.to_string(),
            hop_budget: self.hop_budget_max,
            deadline_ms,
            act,
            iss: self.service_slug.clone(),
            iat: now / 1000,
            exp: (deadline_ms / 1000).max(now / 1000 + 1),
        };
        let token = self.sign(&claims)?;
        Ok((token, claims))
    }

    /// Mint a hop token for one outbound call. The caller has already
    /// resolved the target and applied the route policy's `act` rule.
    pub fn mint_hop(
        &self,
        target_slug: &str,
        rid: &str,
        act: Option<Act>,
    ) -> Result<String, TokenError> {
        let now = epoch_ms();
        let claims = HopClaims {
            iss: self.service_slug.clone(),
            aud: target_slug.to_string(),
            iat: now / 1000,
            exp: now / 1000 + self.hop_ttl.as_secs() as i64,
            svc: Some(self.service_slug.clone()),
            rid: rid.to_string(),
            act,
        };
        self.sign(&claims)
    }

    fn sign<C: Serialize>(&self, claims: &C) -> Result<String, TokenError> {
        let snapshot = self.ring.snapshot();
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(snapshot.current.kid().to_string());
        encode(&header, claims, snapshot.current.encoding_key())
            .map_err(|e| TokenError::Signing(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esk::StaticAttestor;
    use jsonwebtoken::decode_header;

    async fn minter() -> TokenMinter {
        let ring = Arc::new(
            KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
                .await
                .unwrap(),
        );
        TokenMinter::new(ring, "gateway")
    }

    #[tokio::test]
    async fn hop_header_carries_current_kid() {
        let minter = minter().await;
        let token = minter.mint_hop("user", "rid-1", None).unwrap();
        let header = decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::RS256);
        assert_eq!(
            header.kid.as_deref(),
            Some(minter.ring.snapshot().current.kid())
        );
    }

    #[tokio::test]
    async fn hop_ttl_is_clamped() {
        let minter = minter().await.with_hop_ttl(Duration::from_secs(3600));
        assert_eq!(minter.hop_ttl, MAX_HOP_TTL);
    }

    #[tokio::test]
    async fn ctx_budget_and_deadline() {
        let minter = minter().await.with_hop_budget(3);
        let deadline = epoch_ms() + 30_000;
        let (_token, claims) = minter.mint_ctx("rid-2", deadline, None).unwrap();
        assert_eq!(claims.hop_budget, 3);
        assert_eq!(claims.deadline_ms, deadline);
        assert!(claims.exp > claims.iat);
    }
}
