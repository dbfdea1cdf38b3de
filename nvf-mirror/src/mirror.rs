//! The configuration mirror: a process-local, TTL-refreshed view of service
//! configuration used for S2S target resolution.
//!
//! Resolution never blocks on the network when the cache is warm; a miss
//! costs exactly one GET against the config service. The config service's
//! own entry is special-cased from the bootstrap URL so resolution never
//! recurses.

use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};
use url::Url;

use crate::cache::TtlCache;
use crate::error::MirrorError;
use crate::service_config::{to_target, DenyReason, ServiceConfig, Target};

/// Slug under which the config service itself is addressed.
pub const CONFIG_SERVICE_SLUG: &str = "config";

const DEFAULT_TTL: Duration = Duration::from_secs(30);

/// Envelope returned by the config service's lookup endpoints.
#[derive(Debug, Deserialize)]
struct ItemsEnvelope {
    items: Vec<ServiceConfig>,
}

pub struct ConfigMirror {
    cache: TtlCache<String, ServiceConfig>,
    client: reqwest::Client,
    base_url: String,
}

impl ConfigMirror {
    /// Create a mirror rooted at the bootstrapped config-service URL.
    pub fn new(config_service_url: Url) -> Self {
        Self::with_ttl(config_service_url, DEFAULT_TTL)
    }

    pub fn with_ttl(config_service_url: Url, ttl: Duration) -> Self {
        Self {
            cache: TtlCache::new(ttl),
            client: reqwest::Client::new(),
            base_url: config_service_url.as_str().trim_end_matches('/').to_string(),
        }
    }

    fn key(env: &str, slug: &str, major_version: u16) -> String {
        format!("{env}:{slug}:{major_version}")
    }

    /// Resolve a call target for `(env, slug, majorVersion)`.
    ///
    /// The config service resolves to its bootstrap URL without a lookup.
    /// Cache hits reset the entry's TTL; a miss performs one GET against
    /// `/config/s2s-route`. Zero items is an unauthorized target
    /// (`NOT_FOUND`); more than one is data corruption and a hard error.
    pub async fn resolve(
        &self,
        env: &str,
        slug: &str,
        major_version: u16,
    ) -> Result<Target, MirrorError> {
        if slug == CONFIG_SERVICE_SLUG {
            return Ok(Target::authorized(
                self.base_url.clone(),
                slug,
                major_version,
                "",
            ));
        }

        let key = Self::key(env, slug, major_version);
        if let Some(config) = self.cache.get(&key) {
            debug!(%key, "config mirror hit");
            return Ok(to_target(&config));
        }

        debug!(%key, "config mirror miss, fetching");
        let envelope: ItemsEnvelope = self
            .fetch(
                "/config/s2s-route",
                &[
                    ("env", env),
                    ("slug", slug),
                    ("majorVersion", &major_version.to_string()),
                ],
            )
            .await?;

        if envelope.items.len() > 1 {
            return Err(MirrorError::DuplicateConfig {
                env: env.to_string(),
                slug: slug.to_string(),
                major_version,
            });
        }
        match envelope.items.into_iter().next() {
            None => {
                warn!(%key, "no config entry, target unauthorized");
                Ok(Target::denied(slug, major_version, DenyReason::NotFound))
            }
            Some(config) => {
                let target = to_target(&config);
                self.cache.insert(key, config);
                Ok(target)
            }
        }
    }

    /// Bulk-prime the cache from `/config/listAll`. Boot-time only; the hot
    /// path never calls this.
    pub async fn warm(&self, env: &str) -> Result<usize, MirrorError> {
        let envelope: ItemsEnvelope = self.fetch("/config/listAll", &[("env", env)]).await?;
        let count = envelope.items.len();
        for config in envelope.items {
            let key = Self::key(&config.env, &config.slug, config.major_version);
            self.cache.insert(key, config);
        }
        info!(env, count, "config mirror warmed");
        Ok(count)
    }

    /// Seed an entry directly. Bootstrap and test hook.
    pub fn put(&self, config: ServiceConfig) {
        let key = Self::key(&config.env, &config.slug, config.major_version);
        self.cache.insert(key, config);
    }

    pub fn invalidate(&self, env: &str, slug: &str, major_version: u16) {
        self.cache.remove(&Self::key(env, slug, major_version));
    }

    async fn fetch(
        &self,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<ItemsEnvelope, MirrorError> {
        let url = format!("{}{path}", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MirrorError::Fetch(e.to_string()))?
            .error_for_status()
            .map_err(|e| MirrorError::Fetch(e.to_string()))?;

        response
            .json()
            .await
            .map_err(|e| MirrorError::BadPayload(e.to_string()))
    }
}
