pub mod claims;
pub mod error;
pub mod esk;
pub mod jwks;
pub mod jwks_cache;
pub mod keyring;
pub mod minter;
pub mod verifier;

pub use claims::{Act, CtxClaims, HopClaims};
pub use error::TokenError;
pub use esk::{EphemeralKey, KeyCertificate, KmsAttestor, StaticAttestor};
pub use jwks::{JwkEntry, JwksDocument, JwksPublisher, JWKS_PATH};
pub use jwks_cache::JwksCache;
pub use keyring::{KeyRing, KeySnapshot};
pub use minter::{TokenMinter, MAX_HOP_TTL};
pub use verifier::TokenVerifier;
