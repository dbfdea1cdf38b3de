//! Ephemeral signing keys and their KMS attestation seam.
//!
//! The fabric never ships long-lived signing material: each process mints an
//! RSA-2048 key locally, has its public half attested by KMS, and rotates on
//! a cadence. Verifiers only ever see the JWKS document.

use std::future::Future;
use std::pin::Pin;
use std::time::{SystemTime, UNIX_EPOCH};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use jsonwebtoken::{DecodingKey, EncodingKey};
use rand::rngs::OsRng;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

pub(crate) fn epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// KMS-issued certificate binding a `kid` to a public key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyCertificate {
    pub kid: String,
    pub issuer: String,
    /// Base64url signature over the subject public key, produced by KMS.
    pub signature: String,
    #[serde(rename = "issuedAt")]
    pub issued_at: i64,
}

/// Abstract KMS signer for ESK attestation. The concrete provider API lives
/// outside the fabric; components only depend on this seam.
pub trait KmsAttestor: Send + Sync + 'static {
    fn attest<'a>(
        &'a self,
        kid: &'a str,
        public_key_der: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<KeyCertificate, TokenError>> + Send + 'a>>;
}

/// Development and test attestor: certifies any key under a fixed issuer
/// name without calling out.
pub struct StaticAttestor {
    issuer: String,
}

impl StaticAttestor {
    pub fn new(issuer: impl Into<String>) -> Self {
        Self {
            issuer: issuer.into(),
        }
    }
}

impl KmsAttestor for StaticAttestor {
    fn attest<'a>(
        &'a self,
        kid: &'a str,
        public_key_der: &'a [u8],
    ) -> Pin<Box<dyn Future<Output = Result<KeyCertificate, TokenError>> + Send + 'a>> {
        Box::pin(async move {
            Ok(KeyCertificate {
                kid: kid.to_string(),
                issuer: self.issuer.clone(),
                signature: URL_SAFE_NO_PAD.encode(public_key_der),
                issued_at: epoch_ms(),
            })
        })
    }
}

/// One ephemeral RSA-2048 signing key.
pub struct EphemeralKey {
    kid: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// Base64url RSA modulus (for JWKS).
    n: String,
    /// Base64url RSA public exponent (for JWKS).
    e: String,
    public_key_der: Vec<u8>,
    created_at: i64,
    certificate: Option<KeyCertificate>,
}

impl EphemeralKey {
    /// Generate a fresh RSA-2048 key with a UUID `kid`.
    pub fn generate() -> Self {
        let private_key =
            RsaPrivateKey::new(&mut OsRng, 2048).expect("failed to generate RSA-2048 key");
        let public_key = RsaPublicKey::from(&private_key);

        let pkcs8_pem = private_key
            .to_pkcs8_pem(rsa::pkcs8::LineEnding::LF)
            .expect("failed to export RSA key as PKCS8 PEM");
        let encoding_key = EncodingKey::from_rsa_pem(pkcs8_pem.as_bytes())
            .expect("failed to create EncodingKey from RSA PEM");

        let n = URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be());
        let decoding_key = DecodingKey::from_rsa_components(&n, &e)
            .expect("failed to create DecodingKey from RSA components");

        let public_key_der = public_key
            .to_public_key_der()
            .expect("failed to export RSA public key as DER")
            .into_vec();

        Self {
            kid: uuid::Uuid::new_v4().to_string(),
            encoding_key,
            decoding_key,
            n,
            e,
            public_key_der,
            created_at: epoch_ms(),
            certificate: None,
        }
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn decoding_key(&self) -> DecodingKey {
        self.decoding_key.clone()
    }

    pub fn public_key_der(&self) -> &[u8] {
        &self.public_key_der
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    pub fn certificate(&self) -> Option<&KeyCertificate> {
        self.certificate.as_ref()
    }

    pub(crate) fn set_certificate(&mut self, cert: KeyCertificate) {
        self.certificate = Some(cert);
    }

    pub(crate) fn jwk_components(&self) -> (&str, &str, &str) {
        (&self.kid, &self.n, &self.e)
    }
}
