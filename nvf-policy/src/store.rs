//! Per-`(slug, majorVersion)` route policy table with default-deny lookup.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::error::PolicyError;
use crate::matcher::{check_pattern, matches, normalize_path, shape_key, tier_of, Tier};
use crate::rule::{Rule, RoutePolicy};

/// Result of a policy lookup. A miss is a deny; callers never see an
/// implicit allow.
#[derive(Debug, Clone)]
pub struct Decision {
    pub matched: bool,
    pub rule: Option<Rule>,
    pub revision: u64,
}

impl Decision {
    fn deny(revision: u64) -> Self {
        Self {
            matched: false,
            rule: None,
            revision,
        }
    }
}

/// In-process table of loaded route policies.
///
/// Policies load whole; a reload for the same key replaces the previous
/// revision atomically. Lookups are lock-free reads.
#[derive(Default)]
pub struct RoutePolicyStore {
    policies: DashMap<(String, u16), Arc<RoutePolicy>>,
}

impl RoutePolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lint and install a policy document. Rejects same-tier ambiguity and
    /// duplicate op ids within the revision.
    pub fn load(&self, policy: RoutePolicy) -> Result<(), PolicyError> {
        lint(&policy)?;
        info!(
            slug = %policy.slug,
            version = policy.major_version,
            revision = policy.revision,
            rules = policy.rules.len(),
            "route policy loaded"
        );
        self.policies.insert(
            (policy.slug.clone(), policy.major_version),
            Arc::new(policy),
        );
        Ok(())
    }

    /// Look up the rule governing `method path` for a service version.
    ///
    /// Precedence: exact > parametric > wildcard; first match within a tier
    /// wins; no match (or no policy at all) is a deny.
    pub fn lookup(&self, slug: &str, major_version: u16, method: &str, path: &str) -> Decision {
        let Some(policy) = self
            .policies
            .get(&(slug.to_string(), major_version))
            .map(|e| e.value().clone())
        else {
            debug!(slug, major_version, "no policy loaded, default deny");
            return Decision::deny(0);
        };

        let method = method.to_ascii_uppercase();
        let path = normalize_path(path);

        for tier in [Tier::Exact, Tier::Parametric, Tier::Wildcard] {
            for rule in &policy.rules {
                if rule.method != method || tier_of(&rule.path_pattern) != tier {
                    continue;
                }
                if matches(&rule.path_pattern, &path) {
                    return Decision {
                        matched: true,
                        rule: Some(rule.clone()),
                        revision: policy.revision,
                    };
                }
            }
        }
        Decision::deny(policy.revision)
    }

    pub fn revision(&self, slug: &str, major_version: u16) -> Option<u64> {
        self.policies
            .get(&(slug.to_string(), major_version))
            .map(|e| e.revision)
    }
}

fn lint(policy: &RoutePolicy) -> Result<(), PolicyError> {
    let mut seen_shapes: Vec<(Tier, String, String, &str)> = Vec::new();
    let mut seen_ops: Vec<&str> = Vec::new();

    for rule in &policy.rules {
        check_pattern(&rule.path_pattern)?;

        if seen_ops.contains(&rule.op_id.as_str()) {
            return Err(PolicyError::DuplicateOpId {
                slug: policy.slug.clone(),
                major_version: policy.major_version,
                op_id: rule.op_id.clone(),
            });
        }
        seen_ops.push(&rule.op_id);

        let tier = tier_of(&rule.path_pattern);
        let shape = shape_key(&rule.path_pattern);
        let method = rule.method.to_ascii_uppercase();
        if let Some((_, _, _, earlier)) = seen_shapes
            .iter()
            .find(|(t, m, s, _)| *t == tier && *m == method && *s == shape)
        {
            return Err(PolicyError::RouteAmbiguous {
                slug: policy.slug.clone(),
                major_version: policy.major_version,
                first: (*earlier).to_string(),
                second: rule.path_pattern.clone(),
            });
        }
        seen_shapes.push((tier, method, shape, &rule.path_pattern));
    }
    Ok(())
}
