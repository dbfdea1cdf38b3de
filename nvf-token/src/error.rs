/// Failures across minting, key management and HOP verification.
///
/// Verification kinds map 1:1 onto 401 details at the receiver; minting and
/// key-management kinds surface as internal errors.
#[derive(Debug)]
pub enum TokenError {
    /// No bearer token on an authenticated route.
    MissingToken,

    /// Malformed token, bad signature, or undecodable claims.
    InvalidToken(String),

    /// The token's `exp` is in the past beyond the allowed skew.
    TokenExpired,

    /// `aud` does not exactly match this service.
    BadAudience,

    /// `iss` is not in the allowed issuer set.
    BadIssuer,

    /// The `svc` claim names a caller this target does not accept.
    CallerNotAllowed(String),

    /// The verifier itself is unusable (no issuers configured, bad JWKS
    /// URL, empty key set).
    VerifierMisconfigured(String),

    /// `kid` not present in the JWKS after one refresh.
    UnknownKeyId(String),

    /// Fetching or parsing the JWKS failed.
    JwksFetch(String),

    /// KMS attestation of a freshly minted signing key failed.
    Attestation(String),

    /// Signing failed (key material rejected by the JWT library).
    Signing(String),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::MissingToken => write!(f, "missing bearer token"),
            TokenError::InvalidToken(msg) => write!(f, "invalid token: {msg}"),
            TokenError::TokenExpired => write!(f, "token expired"),
            TokenError::BadAudience => write!(f, "token audience mismatch"),
            TokenError::BadIssuer => write!(f, "token issuer not allowed"),
            TokenError::CallerNotAllowed(svc) => write!(f, "caller not allowed: {svc}"),
            TokenError::VerifierMisconfigured(msg) => {
                write!(f, "verifier misconfigured: {msg}")
            }
            TokenError::UnknownKeyId(kid) => write!(f, "unknown signing key: {kid}"),
            TokenError::JwksFetch(msg) => write!(f, "JWKS fetch error: {msg}"),
            TokenError::Attestation(msg) => write!(f, "key attestation failed: {msg}"),
            TokenError::Signing(msg) => write!(f, "token signing failed: {msg}"),
        }
    }
}

impl std::error::Error for TokenError {}

impl TokenError {
    /// Safe detail for 401 responses; internal specifics stay in logs.
    pub fn public_detail(&self) -> &'static str {
        match self {
            TokenError::MissingToken => "missing bearer token",
            TokenError::TokenExpired => "token expired",
            TokenError::BadAudience => "token audience mismatch",
            TokenError::BadIssuer => "token issuer not allowed",
            TokenError::CallerNotAllowed(_) => "caller not allowed",
            _ => "invalid token",
        }
    }
}
