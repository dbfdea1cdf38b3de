//! Typed configuration snapshots for the fabric.
//!
//! Services build one [`FabricConfig`] during bootstrap and hand the
//! relevant section to each component by value. Nothing in the fabric reads
//! the environment after this point.
//!
//! # Recognized options
//!
//! | Option | Effect |
//! |---|---|
//! | `WAL_DIR` | Absolute directory for segments (required when the WAL section is built). |
//! | `WAL_FSYNC_MS` | 0 ⇒ fsync each append; else group-fsync cadence in ms. |
//! | `WAL_ROTATE_BYTES` / `WAL_ROTATE_MS` | Segment rotation thresholds. |
//! | `WAL_CURSOR_FILE` | Absolute cursor path (default: `<WAL_DIR>/wal.cursor.json`). |
//! | `WAL_REPLAY_BATCH_LINES` / `WAL_REPLAY_BATCH_BYTES` / `WAL_REPLAY_TICK_MS` | Replay sizing + cadence. |
//! | `CONFIG_SERVICE_URL` | Absolute base URL for the config service (required). |
//! | `S2S_JWT_AUDIENCE` / `S2S_ALLOWED_ISSUERS` / `S2S_ALLOWED_CALLERS` | Verifier policy. |
//! | `S2S_JWKS_URL` / `S2S_CLOCK_SKEW_SEC` / `S2S_JWKS_COOLDOWN_MS` | JWKS fetch behavior. |
//! | `READ_ONLY_MODE` / `READ_ONLY_EXEMPT_PREFIXES` | Gate mutating methods. |
//! | `API_PREFIX` | Mounted prefix for all versioned routes (default `/api`). |

use std::path::PathBuf;

use url::Url;

use crate::env;
use crate::error::ConfigError;

/// Durable audit WAL settings.
#[derive(Debug, Clone)]
pub struct WalConfig {
    /// Absolute directory holding `wal-<epoch-ms>.ldjson` segments.
    pub dir: PathBuf,
    /// 0 means fsync on every append; otherwise the group-fsync cadence.
    pub fsync_ms: u64,
    pub rotate_bytes: u64,
    pub rotate_ms: u64,
    /// Absolute path of the replay cursor file.
    pub cursor_file: PathBuf,
    pub replay_batch_lines: usize,
    pub replay_batch_bytes: usize,
    pub replay_tick_ms: u64,
}

impl WalConfig {
    pub const DEFAULT_ROTATE_BYTES: u64 = 64 * 1024 * 1024;
    pub const DEFAULT_ROTATE_MS: u64 = 3_600_000;
    pub const DEFAULT_BATCH_LINES: usize = 500;
    pub const DEFAULT_BATCH_BYTES: usize = 1024 * 1024;
    pub const DEFAULT_TICK_MS: u64 = 500;

    pub fn from_env() -> Result<Self, ConfigError> {
        let dir = env::require_absolute_path("WAL_DIR")?;
        let cursor_file = match env::lookup("WAL_CURSOR_FILE") {
            Some(raw) => env::absolute_path("WAL_CURSOR_FILE", raw)?,
            None => dir.join("wal.cursor.json"),
        };
        Ok(Self {
            dir,
            fsync_ms: env::parse_or("WAL_FSYNC_MS", 0)?,
            rotate_bytes: env::parse_or("WAL_ROTATE_BYTES", Self::DEFAULT_ROTATE_BYTES)?,
            rotate_ms: env::parse_or("WAL_ROTATE_MS", Self::DEFAULT_ROTATE_MS)?,
            cursor_file,
            replay_batch_lines: env::parse_or("WAL_REPLAY_BATCH_LINES", Self::DEFAULT_BATCH_LINES)?,
            replay_batch_bytes: env::parse_or("WAL_REPLAY_BATCH_BYTES", Self::DEFAULT_BATCH_BYTES)?,
            replay_tick_ms: env::parse_or("WAL_REPLAY_TICK_MS", Self::DEFAULT_TICK_MS)?,
        })
    }

    /// Programmatic construction rooted at a directory, with defaults for
    /// everything else. Used by tests and embedded tools.
    pub fn rooted_at(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let cursor_file = dir.join("wal.cursor.json");
        Self {
            dir,
            fsync_ms: 0,
            rotate_bytes: Self::DEFAULT_ROTATE_BYTES,
            rotate_ms: Self::DEFAULT_ROTATE_MS,
            cursor_file,
            replay_batch_lines: Self::DEFAULT_BATCH_LINES,
            replay_batch_bytes: Self::DEFAULT_BATCH_BYTES,
            replay_tick_ms: Self::DEFAULT_TICK_MS,
        }
    }

    pub fn with_fsync_ms(mut self, ms: u64) -> Self {
        self.fsync_ms = ms;
        self
    }

    pub fn with_rotate_bytes(mut self, bytes: u64) -> Self {
        self.rotate_bytes = bytes;
        self
    }

    pub fn with_tick_ms(mut self, ms: u64) -> Self {
        self.replay_tick_ms = ms;
        self
    }
}

/// Inbound HOP verification policy.
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Expected `aud` claim — this service's slug.
    pub audience: String,
    pub allowed_issuers: Vec<String>,
    /// Allowed values of the `svc` claim; empty means any issuer-approved caller.
    pub allowed_callers: Vec<String>,
    pub jwks_url: String,
    pub clock_skew_secs: u64,
    pub jwks_cooldown_ms: u64,
}

impl VerifierConfig {
    pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;
    pub const DEFAULT_JWKS_COOLDOWN_MS: u64 = 30_000;

    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            audience: env::require("S2S_JWT_AUDIENCE")?,
            allowed_issuers: env::csv("S2S_ALLOWED_ISSUERS"),
            allowed_callers: env::csv("S2S_ALLOWED_CALLERS"),
            jwks_url: env::require_absolute_url("S2S_JWKS_URL")?.to_string(),
            clock_skew_secs: env::parse_or("S2S_CLOCK_SKEW_SEC", Self::DEFAULT_CLOCK_SKEW_SECS)?,
            jwks_cooldown_ms: env::parse_or("S2S_JWKS_COOLDOWN_MS", Self::DEFAULT_JWKS_COOLDOWN_MS)?,
        })
    }

    pub fn new(audience: impl Into<String>, jwks_url: impl Into<String>) -> Self {
        Self {
            audience: audience.into(),
            allowed_issuers: Vec::new(),
            allowed_callers: Vec::new(),
            jwks_url: jwks_url.into(),
            clock_skew_secs: Self::DEFAULT_CLOCK_SKEW_SECS,
            jwks_cooldown_ms: Self::DEFAULT_JWKS_COOLDOWN_MS,
        }
    }

    pub fn with_allowed_issuers(mut self, issuers: impl IntoIterator<Item = String>) -> Self {
        self.allowed_issuers = issuers.into_iter().collect();
        self
    }

    pub fn with_allowed_callers(mut self, callers: impl IntoIterator<Item = String>) -> Self {
        self.allowed_callers = callers.into_iter().collect();
        self
    }

    pub fn with_clock_skew_secs(mut self, secs: u64) -> Self {
        self.clock_skew_secs = secs;
        self
    }
}

/// Read-only gate settings for the edge pipeline.
#[derive(Debug, Clone, Default)]
pub struct ReadOnlyConfig {
    pub enabled: bool,
    pub exempt_prefixes: Vec<String>,
}

impl ReadOnlyConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            enabled: env::parse_bool_or("READ_ONLY_MODE", false)?,
            exempt_prefixes: env::csv("READ_ONLY_EXEMPT_PREFIXES"),
        })
    }
}

/// Top-level bootstrap snapshot for one fabric service.
#[derive(Debug, Clone)]
pub struct FabricConfig {
    /// This service's slug, used as the `iss`/`svc` claim and log tag.
    pub service_slug: String,
    pub api_prefix: String,
    pub config_service_url: Url,
    pub read_only: ReadOnlyConfig,
}

impl FabricConfig {
    pub const DEFAULT_API_PREFIX: &'static str = "/api";

    /// Load from the process environment. Reads `.env` first in the style of
    /// local development setups; real deployments inject the environment.
    pub fn from_env(service_slug: impl Into<String>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Ok(Self {
            service_slug: service_slug.into(),
            api_prefix: env::lookup("API_PREFIX")
                .unwrap_or_else(|| Self::DEFAULT_API_PREFIX.to_string()),
            config_service_url: env::require_absolute_url("CONFIG_SERVICE_URL")?,
            read_only: ReadOnlyConfig::from_env()?,
        })
    }

    pub fn new(service_slug: impl Into<String>, config_service_url: Url) -> Self {
        Self {
            service_slug: service_slug.into(),
            api_prefix: Self::DEFAULT_API_PREFIX.to_string(),
            config_service_url,
            read_only: ReadOnlyConfig::default(),
        }
    }

    pub fn with_api_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.api_prefix = prefix.into();
        self
    }
}
