//! Small typed readers over the process environment.
//!
//! All lookups treat an empty string the same as an unset variable.

use std::path::PathBuf;
use std::str::FromStr;

use url::Url;

use crate::error::ConfigError;

pub(crate) fn lookup(name: &str) -> Option<String> {
    match std::env::var(name) {
        Ok(v) if !v.trim().is_empty() => Some(v.trim().to_string()),
        _ => None,
    }
}

pub(crate) fn require(name: &str) -> Result<String, ConfigError> {
    lookup(name).ok_or_else(|| ConfigError::MissingRequiredEnv(name.to_string()))
}

pub(crate) fn parse_or<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            name: name.to_string(),
            value: raw,
        }),
    }
}

pub(crate) fn parse_bool_or(name: &str, default: bool) -> Result<bool, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => match raw.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue {
                name: name.to_string(),
                value: raw,
            }),
        },
    }
}

pub(crate) fn require_absolute_url(name: &str) -> Result<Url, ConfigError> {
    let raw = require(name)?;
    absolute_url(name, &raw)
}

pub(crate) fn absolute_url(name: &str, raw: &str) -> Result<Url, ConfigError> {
    match Url::parse(raw) {
        Ok(url) if url.has_host() => Ok(url),
        _ => Err(ConfigError::MalformedUrl {
            name: name.to_string(),
            value: raw.to_string(),
        }),
    }
}

pub(crate) fn require_absolute_path(name: &str) -> Result<PathBuf, ConfigError> {
    let raw = require(name)?;
    absolute_path(name, raw)
}

pub(crate) fn absolute_path(name: &str, raw: String) -> Result<PathBuf, ConfigError> {
    let path = PathBuf::from(&raw);
    if path.is_absolute() {
        Ok(path)
    } else {
        Err(ConfigError::RelativePath {
            name: name.to_string(),
            value: raw,
        })
    }
}

/// Split a comma-separated list option, trimming blanks.
pub(crate) fn csv(name: &str) -> Vec<String> {
    lookup(name)
        .map(|raw| {
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
