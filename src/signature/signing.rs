//! Outbound request signing
//!
//! Produces draft-cavage Signature headers the verifier in this crate (and
//! Mastodon-compatible servers) accept.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use ed25519_dalek::pkcs8::DecodePrivateKey as _;
use rsa::pkcs8::DecodePrivateKey;
use rsa::signature::{RandomizedSigner, SignatureEncoding};
use sha2::Sha256;

use super::crypto::{KeyParseError, PublicKey};
use super::digest::generate_digest;
use crate::error::AppError;

/// Private key of a local actor
#[derive(Debug, Clone)]
pub enum PrivateKey {
    Rsa(RsaPrivateKey),
    Ed25519(ed25519_dalek::SigningKey),
}

impl PrivateKey {
    /// Parse a PEM private key (PKCS#8 RSA or Ed25519, PKCS#1 RSA)
    pub fn from_pem(pem: &str) -> Result<Self, KeyParseError> {
        let pem = pem.trim();
        if let Ok(key) = RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = RsaPrivateKey::from_pkcs1_pem(pem) {
            return Ok(Self::Rsa(key));
        }
        if let Ok(key) = ed25519_dalek::SigningKey::from_pkcs8_pem(pem) {
            return Ok(Self::Ed25519(key));
        }
        Err(KeyParseError)
    }

    pub fn public_key(&self) -> PublicKey {
        match self {
            PrivateKey::Rsa(key) => PublicKey::Rsa(key.to_public_key()),
            PrivateKey::Ed25519(key) => PublicKey::Ed25519(key.verifying_key()),
        }
    }

    /// Value of the `algorithm` parameter for this key
    pub fn algorithm(&self) -> &'static str {
        match self {
            PrivateKey::Rsa(_) => "rsa-sha256",
            PrivateKey::Ed25519(_) => "hs2019",
        }
    }

    pub(crate) fn sign(&self, message: &[u8]) -> Vec<u8> {
        match self {
            PrivateKey::Rsa(key) => {
                let signing_key = rsa::pkcs1v15::SigningKey::<Sha256>::new(key.clone());
                let mut rng = rand::thread_rng();
                signing_key.sign_with_rng(&mut rng, message).to_vec()
            }
            PrivateKey::Ed25519(key) => ed25519_dalek::Signer::sign(key, message)
                .to_bytes()
                .to_vec(),
        }
    }
}

/// Build a Signature header over ordered `(name, value)` pairs.
///
/// Names are lower-cased; values are signed byte for byte, so header values
/// outside UTF-8 can be covered too.
pub fn signature_header<V: AsRef<[u8]>>(
    key: &PrivateKey,
    key_id: &str,
    signed: &[(&str, V)],
) -> String {
    let names = signed
        .iter()
        .map(|(name, _)| name.to_ascii_lowercase())
        .collect::<Vec<_>>();

    let mut signing_string = Vec::new();
    for (i, ((_, value), name)) in signed.iter().zip(&names).enumerate() {
        if i > 0 {
            signing_string.push(b'\n');
        }
        signing_string.extend_from_slice(name.as_bytes());
        signing_string.extend_from_slice(b": ");
        signing_string.extend_from_slice(value.as_ref());
    }

    let signature = BASE64.encode(key.sign(&signing_string));

    format!(
        "keyId=\"{}\",algorithm=\"{}\",headers=\"{}\",signature=\"{}\"",
        key_id,
        key.algorithm(),
        names.join(" "),
        signature
    )
}

/// Headers to add for signed request
#[derive(Debug, Clone)]
pub struct SignatureHeaders {
    /// Signature header value
    pub signature: String,
    /// Date header value (RFC 2616)
    pub date: String,
    /// Digest header value (if body present)
    pub digest: Option<String>,
}

/// Sign an HTTP request
///
/// Covers `(request-target) host date`, plus `digest` when a body is present.
///
/// # Example
/// ```ignore
/// let headers = sign_request(
///     "POST",
///     "https://remote.server/inbox",
///     Some(&body),
///     &private_key,
///     "https://my.server/users/me#main-key",
///     Utc::now(),
/// )?;
/// ```
pub fn sign_request(
    method: &str,
    url: &str,
    body: Option<&[u8]>,
    private_key: &PrivateKey,
    key_id: &str,
    date: DateTime<Utc>,
) -> Result<SignatureHeaders, AppError> {
    let parsed_url =
        url::Url::parse(url).map_err(|e| AppError::Validation(format!("Invalid URL: {}", e)))?;

    let host = parsed_url
        .host_str()
        .ok_or_else(|| AppError::Validation("Missing host in URL".to_string()))?;
    let host = match parsed_url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };

    let path_and_query = match parsed_url.query() {
        Some(q) => format!("{}?{}", parsed_url.path(), q),
        None => parsed_url.path().to_string(),
    };
    let request_target = format!("{} {}", method.to_lowercase(), path_and_query);

    let date = date.format("%a, %d %b %Y %H:%M:%S GMT").to_string();
    let digest = body.map(generate_digest);

    let mut signed = vec![
        ("(request-target)", request_target.as_str()),
        ("host", host.as_str()),
        ("date", date.as_str()),
    ];
    if let Some(ref digest_value) = digest {
        signed.push(("digest", digest_value.as_str()));
    }

    Ok(SignatureHeaders {
        signature: signature_header(private_key, key_id, &signed),
        date,
        digest,
    })
}
