//! Public keys and signature primitives
//!
//! The key type decides which primitive runs. A declared algorithm (the
//! draft-cavage `algorithm` or RFC 9421 `alg` parameter) is only checked for
//! agreement with it.

use ed25519_dalek::pkcs8::DecodePublicKey as _;
use rsa::pkcs1::DecodeRsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::signature::Verifier;
use rsa::{RsaPublicKey, pkcs1v15::Signature as Pkcs1v15Signature};
use sha2::Sha256;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    #[error("unsupported signature algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("algorithm {declared} does not match {key_type} key")]
    AlgorithmMismatch {
        declared: String,
        key_type: &'static str,
    },

    #[error("malformed signature")]
    MalformedSignature,

    #[error("signature does not verify")]
    Invalid,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unsupported or malformed public key")]
pub struct KeyParseError;

/// Public key material of a remote actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicKey {
    Rsa(RsaPublicKey),
    Ed25519(ed25519_dalek::VerifyingKey),
}

impl PublicKey {
    /// Parse a PEM public key.
    ///
    /// Accepts SPKI (`BEGIN PUBLIC KEY`) for RSA and Ed25519, and PKCS#1
    /// (`BEGIN RSA PUBLIC KEY`) for RSA.
    pub fn from_pem(pem: &str) -> Result<Self, KeyParseError> {
        let pem = pem.trim();
        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = RsaPublicKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = ed25519_dalek::VerifyingKey::from_public_key_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        Err(KeyParseError)
    }

    pub fn key_type(&self) -> &'static str {
        match self {
            PublicKey::Rsa(_) => "rsa",
            PublicKey::Ed25519(_) => "ed25519",
        }
    }

    fn accepts_algorithm(&self, declared: Option<&str>) -> Result<(), CryptoError> {
        let Some(declared) = declared else {
            return Ok(());
        };
        let declared_lower = declared.to_ascii_lowercase();
        let compatible = match declared_lower.as_str() {
            "hs2019" => true,
            "rsa-sha256" | "rsa-v1_5-sha256" => matches!(self, PublicKey::Rsa(_)),
            "ed25519" => matches!(self, PublicKey::Ed25519(_)),
            _ => return Err(CryptoError::UnsupportedAlgorithm(declared.to_string())),
        };

        if compatible {
            Ok(())
        } else {
            Err(CryptoError::AlgorithmMismatch {
                declared: declared.to_string(),
                key_type: self.key_type(),
            })
        }
    }
}

/// Verify `signature` over `signing_string` with `key`
///
/// Without a declared algorithm the key type alone picks the primitive.
pub fn verify_signature(
    key: &PublicKey,
    declared_algorithm: Option<&str>,
    signing_string: &[u8],
    signature: &[u8],
) -> Result<(), CryptoError> {
    key.accepts_algorithm(declared_algorithm)?;

    match key {
        PublicKey::Rsa(public_key) => {
            let verifier = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(public_key.clone());
            let signature = Pkcs1v15Signature::try_from(signature)
                .map_err(|_| CryptoError::MalformedSignature)?;
            verifier
                .verify(signing_string, &signature)
                .map_err(|_| CryptoError::Invalid)
        }
        PublicKey::Ed25519(public_key) => {
            let signature = ed25519_dalek::Signature::from_slice(signature)
                .map_err(|_| CryptoError::MalformedSignature)?;
            public_key
                .verify_strict(signing_string, &signature)
                .map_err(|_| CryptoError::Invalid)
        }
    }
}
