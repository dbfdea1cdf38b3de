//! Path normalization and pattern matching.
//!
//! Patterns are segment-wise: literals, `:param` placeholders, and `*`.
//! A mid-pattern `*` matches exactly one segment; a trailing `*` matches the
//! rest of the path (at least one segment).

use crate::error::PolicyError;

/// Precedence tier of a pattern. Lower wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Tier {
    Exact,
    Parametric,
    Wildcard,
}

/// Collapse duplicate slashes and trim the trailing slash (except root).
pub fn normalize_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len() + 1);
    if !path.starts_with('/') {
        out.push('/');
    }
    let mut prev_slash = false;
    for ch in path.chars() {
        if ch == '/' {
            if prev_slash {
                continue;
            }
            prev_slash = true;
        } else {
            prev_slash = false;
        }
        out.push(ch);
    }
    if out.len() > 1 && out.ends_with('/') {
        out.pop();
    }
    out
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

/// Classify a pattern into its precedence tier.
pub fn tier_of(pattern: &str) -> Tier {
    let mut tier = Tier::Exact;
    for seg in segments(pattern) {
        if seg == "*" {
            return Tier::Wildcard;
        }
        if seg.starts_with(':') {
            tier = Tier::Parametric;
        }
    }
    tier
}

/// Validate pattern structure at load time.
pub fn check_pattern(pattern: &str) -> Result<(), PolicyError> {
    if !pattern.starts_with('/') {
        return Err(PolicyError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "must start with '/'".to_string(),
        });
    }
    for seg in segments(pattern) {
        if seg == ":" {
            return Err(PolicyError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "empty parameter name".to_string(),
            });
        }
        if seg.contains('*') && seg != "*" {
            return Err(PolicyError::InvalidPattern {
                pattern: pattern.to_string(),
                reason: "'*' must be a whole segment".to_string(),
            });
        }
    }
    Ok(())
}

/// Match a normalized path against a pattern.
pub fn matches(pattern: &str, path: &str) -> bool {
    let pat: Vec<&str> = segments(pattern).collect();
    let seg: Vec<&str> = segments(path).collect();

    for (i, p) in pat.iter().enumerate() {
        let trailing_star = *p == "*" && i == pat.len() - 1;
        if trailing_star {
            // Trailing wildcard consumes one or more remaining segments.
            return seg.len() > i;
        }
        match seg.get(i) {
            None => return false,
            Some(s) => {
                if *p == "*" || p.starts_with(':') {
                    continue;
                }
                if *p != *s {
                    return false;
                }
            }
        }
    }
    seg.len() == pat.len()
}

/// Shape key used by the ambiguity lint: two same-tier patterns with equal
/// shapes can match the same request.
pub fn shape_key(pattern: &str) -> String {
    let mut out = String::new();
    for seg in segments(pattern) {
        out.push('/');
        if seg.starts_with(':') {
            out.push(':');
        } else {
            out.push_str(seg);
        }
    }
    if out.is_empty() {
        out.push('/');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_duplicate_and_trailing_slashes() {
        assert_eq!(normalize_path("//v1///foo/"), "/v1/foo");
        assert_eq!(normalize_path("/"), "/");
        assert_eq!(normalize_path("v1/foo"), "/v1/foo");
    }

    #[test]
    fn tiers_are_classified() {
        assert_eq!(tier_of("/v1/foo"), Tier::Exact);
        assert_eq!(tier_of("/v1/foo/:id"), Tier::Parametric);
        assert_eq!(tier_of("/v1/*"), Tier::Wildcard);
        assert_eq!(tier_of("/v1/*/:id"), Tier::Wildcard);
    }

    #[test]
    fn parametric_matches_exactly_one_segment() {
        assert!(matches("/v1/foo/:id", "/v1/foo/123"));
        assert!(!matches("/v1/foo/:id", "/v1/foo"));
        assert!(!matches("/v1/foo/:id", "/v1/foo/123/bar"));
    }

    #[test]
    fn exact_requires_full_equality() {
        assert!(matches("/v1/foo", "/v1/foo"));
        assert!(!matches("/v1/foo", "/v1/foo/bar"));
        assert!(!matches("/v1/foo", "/v1"));
    }

    #[test]
    fn trailing_wildcard_consumes_remainder() {
        assert!(matches("/v1/foo/*", "/v1/foo/a"));
        assert!(matches("/v1/foo/*", "/v1/foo/a/b/c"));
        assert!(!matches("/v1/foo/*", "/v1/foo"));
    }

    #[test]
    fn mid_wildcard_matches_one_segment() {
        assert!(matches("/v1/*/items", "/v1/abc/items"));
        assert!(!matches("/v1/*/items", "/v1/a/b/items"));
    }

    #[test]
    fn shape_keys_unify_param_names() {
        assert_eq!(shape_key("/v1/foo/:id"), shape_key("/v1/foo/:userId"));
        assert_ne!(shape_key("/v1/foo/:id"), shape_key("/v1/bar/:id"));
    }

    #[test]
    fn pattern_checks_reject_bad_shapes() {
        assert!(check_pattern("v1/foo").is_err());
        assert!(check_pattern("/v1/:").is_err());
        assert!(check_pattern("/v1/a*b").is_err());
        assert!(check_pattern("/v1/foo/:id").is_ok());
    }
}
