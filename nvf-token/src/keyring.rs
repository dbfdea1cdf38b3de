//! Key ring owning the current and previous ephemeral signing keys.
//!
//! Rotation publishes a new snapshot atomically; readers always observe a
//! consistent `(current, previous)` pair. Verifiers keep accepting the
//! previous key for the overlap window so in-flight tokens survive a
//! rotation.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::TokenError;
use crate::esk::{EphemeralKey, KmsAttestor};

/// Immutable view of the ring at a point in time.
pub struct KeySnapshot {
    pub current: Arc<EphemeralKey>,
    pub previous: Option<Arc<EphemeralKey>>,
}

pub struct KeyRing {
    snapshot: RwLock<Arc<KeySnapshot>>,
    attestor: Arc<dyn KmsAttestor>,
}

impl KeyRing {
    /// Generate and attest the initial key.
    pub async fn new(attestor: Arc<dyn KmsAttestor>) -> Result<Self, TokenError> {
        let key = Self::mint_attested(&*attestor).await?;
        info!(kid = key.kid(), "initial signing key attested");
        Ok(Self {
            snapshot: RwLock::new(Arc::new(KeySnapshot {
                current: Arc::new(key),
                previous: None,
            })),
            attestor,
        })
    }

    async fn mint_attested(attestor: &dyn KmsAttestor) -> Result<EphemeralKey, TokenError> {
        let mut key = EphemeralKey::generate();
        let cert = attestor.attest(key.kid(), key.public_key_der()).await?;
        key.set_certificate(cert);
        Ok(key)
    }

    /// Current `(current, previous)` pair.
    pub fn snapshot(&self) -> Arc<KeySnapshot> {
        self.snapshot
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Mint, attest and publish a new current key; the old current becomes
    /// previous.
    pub async fn rotate(&self) -> Result<(), TokenError> {
        let key = Self::mint_attested(&*self.attestor).await?;
        info!(kid = key.kid(), "signing key rotated");

        let mut guard = self
            .snapshot
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let old = guard.current.clone();
        *guard = Arc::new(KeySnapshot {
            current: Arc::new(key),
            previous: Some(old),
        });
        Ok(())
    }

    /// Run rotation on a cadence until cancelled. Attestation failures keep
    /// the existing key in place and retry on the next tick.
    pub fn spawn_rotation(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> tokio::task::JoinHandle<()> {
        let ring = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = ring.rotate().await {
                            error!(error = %err, "signing key rotation failed");
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::esk::StaticAttestor;

    #[tokio::test]
    async fn rotation_keeps_previous_key() {
        let ring = KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
            .await
            .unwrap();
        let first = ring.snapshot().current.kid().to_string();

        ring.rotate().await.unwrap();
        let snap = ring.snapshot();
        assert_ne!(snap.current.kid(), first);
        assert_eq!(snap.previous.as_ref().unwrap().kid(), first);

        ring.rotate().await.unwrap();
        let snap2 = ring.snapshot();
        assert_eq!(
            snap2.previous.as_ref().unwrap().kid(),
            snap.current.kid(),
            "previous tracks the displaced current"
        );
    }

    #[tokio::test]
    async fn snapshot_is_attested() {
        let ring = KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
            .await
            .unwrap();
        assert!(ring.snapshot().current.certificate().is_some());
    }

    #[tokio::test]
    async fn rotation_task_stops_on_cancel() {
        let ring = Arc::new(
            KeyRing::new(Arc::new(StaticAttestor::new("kms-dev")))
                .await
                .unwrap(),
        );
        let cancel = CancellationToken::new();
        let handle = ring.spawn_rotation(Duration::from_secs(3600), cancel.clone());
        cancel.cancel();
        handle.await.unwrap();
    }
}
