//! Service configuration entries and resolved call targets.

use serde::{Deserialize, Serialize};

/// One service's configuration as published by the config service.
/// Identity is `(env, slug, majorVersion)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub env: String,
    pub slug: String,
    #[serde(rename = "majorVersion")]
    pub major_version: u16,
    #[serde(rename = "baseUrl", default)]
    pub base_url: String,
    pub enabled: bool,
    #[serde(rename = "isS2STarget")]
    pub is_s2s_target: bool,
    #[serde(rename = "exposeHealth", default)]
    pub expose_health: bool,
    #[serde(rename = "outboundApiPrefix", default = "default_api_prefix")]
    pub outbound_api_prefix: String,
    #[serde(rename = "updatedAt", default)]
    pub updated_at: i64,
    #[serde(default)]
    pub revision: u64,
}

fn default_api_prefix() -> String {
    "/api".to_string()
}

/// Why a resolution result is not authorized for S2S use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DenyReason {
    #[serde(rename = "NOT_FOUND")]
    NotFound,
    #[serde(rename = "DISABLED")]
    Disabled,
    #[serde(rename = "NOT_S2S_TARGET")]
    NotS2sTarget,
    #[serde(rename = "BASEURL_MISSING")]
    BaseUrlMissing,
}

impl DenyReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenyReason::NotFound => "NOT_FOUND",
            DenyReason::Disabled => "DISABLED",
            DenyReason::NotS2sTarget => "NOT_S2S_TARGET",
            DenyReason::BaseUrlMissing => "BASEURL_MISSING",
        }
    }
}

impl std::fmt::Display for DenyReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A resolved S2S call target. `is_authorized == true` implies a non-empty
/// `base_url`.
#[derive(Debug, Clone)]
pub struct Target {
    pub base_url: String,
    pub slug: String,
    pub major_version: u16,
    pub outbound_api_prefix: String,
    pub is_authorized: bool,
    pub deny_reason: Option<DenyReason>,
}

impl Target {
    pub fn authorized(
        base_url: impl Into<String>,
        slug: impl Into<String>,
        major_version: u16,
        outbound_api_prefix: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            slug: slug.into(),
            major_version,
            outbound_api_prefix: outbound_api_prefix.into(),
            is_authorized: true,
            deny_reason: None,
        }
    }

    pub fn denied(slug: impl Into<String>, major_version: u16, reason: DenyReason) -> Self {
        Self {
            base_url: String::new(),
            slug: slug.into(),
            major_version,
            outbound_api_prefix: String::new(),
            is_authorized: false,
            deny_reason: Some(reason),
        }
    }
}

/// Authorization rules applied to a cached or freshly fetched entry.
pub fn to_target(config: &ServiceConfig) -> Target {
    if !config.enabled {
        return Target::denied(&config.slug, config.major_version, DenyReason::Disabled);
    }
    if !config.is_s2s_target {
        return Target::denied(&config.slug, config.major_version, DenyReason::NotS2sTarget);
    }
    let base = config.base_url.trim();
    if base.is_empty() {
        return Target::denied(&config.slug, config.major_version, DenyReason::BaseUrlMissing);
    }
    Target::authorized(
        base.trim_end_matches('/'),
        &config.slug,
        config.major_version,
        &config.outbound_api_prefix,
    )
}
