/// Errors raised while reading the bootstrap environment.
#[derive(Debug)]
pub enum ConfigError {
    /// A required environment variable is absent or empty.
    MissingRequiredEnv(String),

    /// A URL-valued option failed to parse as an absolute URL.
    MalformedUrl { name: String, value: String },

    /// A numeric or boolean option failed to parse.
    InvalidValue { name: String, value: String },

    /// A path-valued option must be absolute.
    RelativePath { name: String, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::MissingRequiredEnv(name) => {
                write!(f, "missing required environment variable {name}")
            }
            ConfigError::MalformedUrl { name, value } => {
                write!(f, "{name} is not an absolute URL: {value}")
            }
            ConfigError::InvalidValue { name, value } => {
                write!(f, "{name} has an unparseable value: {value}")
            }
            ConfigError::RelativePath { name, value } => {
                write!(f, "{name} must be an absolute path: {value}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
