use nvf_mirror::MirrorError;
use nvf_token::TokenError;

/// Failures of the outbound S2S path.
#[derive(Debug)]
pub enum S2sError {
    /// Target resolution said no; carries the mirror's reason string.
    UnauthorizedCall {
        slug: String,
        major_version: u16,
        reason: String,
    },

    /// Raw passthrough was asked to leave the mounted API prefix.
    RawPathOutsidePrefix { path: String, prefix: String },

    /// The request-scoped hop budget is spent.
    HopBudgetExhausted { rid: String },

    /// Target resolution itself failed.
    Mirror(MirrorError),

    /// Hop token minting failed.
    Token(TokenError),

    /// The deadline elapsed before the upstream answered.
    UpstreamTimeout { slug: String, timeout_ms: u64 },

    /// Connect/transport failure on the wire.
    UpstreamNetwork(String),

    /// The upstream answered outside 2xx.
    UpstreamNon2xx {
        slug: String,
        major_version: u16,
        status: u16,
        snippet: String,
    },

    /// 2xx with a body that failed to parse as JSON.
    UpstreamBadJson(String),
}

impl std::fmt::Display for S2sError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            S2sError::UnauthorizedCall {
                slug,
                major_version,
                reason,
            } => write!(f, "call to {slug}@v{major_version} not authorized: {reason}"),
            S2sError::RawPathOutsidePrefix { path, prefix } => {
                write!(f, "raw path {path} does not start with prefix {prefix}")
            }
            S2sError::HopBudgetExhausted { rid } => {
                write!(f, "hop budget exhausted for request {rid}")
            }
            S2sError::Mirror(err) => write!(f, "target resolution failed: {err}"),
            S2sError::Token(err) => write!(f, "hop token minting failed: {err}"),
            S2sError::UpstreamTimeout { slug, timeout_ms } => {
                write!(f, "call to {slug} timed out after {timeout_ms}ms")
            }
            S2sError::UpstreamNetwork(msg) => write!(f, "upstream network failure: {msg}"),
            S2sError::UpstreamNon2xx {
                slug,
                major_version,
                status,
                snippet,
            } => write!(
                f,
                "{slug}@v{major_version} answered {status}: {snippet}"
            ),
            S2sError::UpstreamBadJson(msg) => write!(f, "upstream body is not JSON: {msg}"),
        }
    }
}

impl std::error::Error for S2sError {}

impl From<MirrorError> for S2sError {
    fn from(err: MirrorError) -> Self {
        S2sError::Mirror(err)
    }
}

impl From<TokenError> for S2sError {
    fn from(err: TokenError) -> Self {
        S2sError::Token(err)
    }
}
