/// Errors raised while resolving or warming service configuration.
#[derive(Debug)]
pub enum MirrorError {
    /// The config service returned more than one item for a unique key.
    DuplicateConfig {
        env: String,
        slug: String,
        major_version: u16,
    },

    /// Network or HTTP failure talking to the config service.
    Fetch(String),

    /// The config service answered with a body the mirror cannot parse.
    BadPayload(String),
}

impl std::fmt::Display for MirrorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MirrorError::DuplicateConfig {
                env,
                slug,
                major_version,
            } => write!(
                f,
                "config service returned duplicate entries for {env}:{slug}:{major_version}"
            ),
            MirrorError::Fetch(msg) => write!(f, "config service fetch failed: {msg}"),
            MirrorError::BadPayload(msg) => write!(f, "config service payload invalid: {msg}"),
        }
    }
}

impl std::error::Error for MirrorError {}
