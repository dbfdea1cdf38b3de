/// Errors raised while loading a route policy document.
#[derive(Debug)]
pub enum PolicyError {
    /// Two rules in the same precedence tier can match the same request.
    RouteAmbiguous {
        slug: String,
        major_version: u16,
        first: String,
        second: String,
    },

    /// Two rules in one policy revision share an `op_id`.
    DuplicateOpId {
        slug: String,
        major_version: u16,
        op_id: String,
    },

    /// A rule's path pattern is structurally invalid.
    InvalidPattern { pattern: String, reason: String },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::RouteAmbiguous {
                slug,
                major_version,
                first,
                second,
            } => write!(
                f,
                "ambiguous rules for {slug}@v{major_version}: {first} overlaps {second}"
            ),
            PolicyError::DuplicateOpId {
                slug,
                major_version,
                op_id,
            } => write!(f, "duplicate op id {op_id} in {slug}@v{major_version}"),
            PolicyError::InvalidPattern { pattern, reason } => {
                write!(f, "invalid path pattern {pattern}: {reason}")
            }
        }
    }
}

impl std::error::Error for PolicyError {}
