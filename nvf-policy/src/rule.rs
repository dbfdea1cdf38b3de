//! Route rules as they travel in policy documents.

use serde::{Deserialize, Serialize};

/// How a route treats the `X-User-Assertion` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssertionMode {
    /// The assertion must be present and valid.
    Required,
    /// Passed through when present.
    Optional,
    /// Stripped; the route never sees an assertion.
    Forbidden,
}

impl Default for AssertionMode {
    fn default() -> Self {
        AssertionMode::Required
    }
}

/// One route rule. Defaults are the locked-down ones: non-public with a
/// required user assertion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub method: String,
    #[serde(rename = "pathPattern")]
    pub path_pattern: String,
    #[serde(default)]
    pub public: bool,
    #[serde(rename = "userAssertion", default)]
    pub user_assertion: AssertionMode,
    #[serde(rename = "opId")]
    pub op_id: String,
}

impl Rule {
    pub fn new(method: impl Into<String>, path_pattern: impl Into<String>, op_id: impl Into<String>) -> Self {
        Self {
            method: method.into().to_ascii_uppercase(),
            path_pattern: path_pattern.into(),
            public: false,
            user_assertion: AssertionMode::Required,
            op_id: op_id.into(),
        }
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn assertion(mut self, mode: AssertionMode) -> Self {
        self.user_assertion = mode;
        self
    }
}

/// A revisioned policy document for one `(slug, majorVersion)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutePolicy {
    pub slug: String,
    #[serde(rename = "majorVersion")]
    pub major_version: u16,
    pub revision: u64,
    pub rules: Vec<Rule>,
}
