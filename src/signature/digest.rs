//! Body digest validation
//!
//! Binds the signature to the body, either through the draft-cavage `Digest`
//! header (`SHA-256=base64(sha256(body))`) or the RFC 9530 `Content-Digest`
//! dictionary (`sha-256=:base64(sha256(body)):`).

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use http::Method;
use sfv::{BareItem, Item, ListEntry, Parser};
use sha2::{Digest, Sha256};
use thiserror::Error;

pub const DIGEST: &str = "digest";
pub const CONTENT_DIGEST: &str = "content-digest";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DigestError {
    #[error("The {header} header must be signed when doing a {method} request")]
    NotSigned {
        header: &'static str,
        method: String,
    },

    #[error("Header {0} is declared as signed but missing from the request")]
    Missing(&'static str),

    #[error("Invalid Digest value. Computed SHA-256 digest: {computed}; given: {given}")]
    Mismatch { computed: String, given: String },

    #[error("{0}")]
    Malformed(String),

    #[error("Only SHA-256 is supported in Content-Digest. Offered algorithms: {0}")]
    Unsupported(String),
}

/// Methods whose requests carry a body that must be bound by a signed digest
pub fn carries_body(method: &Method) -> bool {
    matches!(*method, Method::POST | Method::PUT | Method::PATCH)
}

/// Generate SHA-256 digest for body
///
/// # Returns
/// `SHA-256=base64(hash)`
pub fn generate_digest(body: &[u8]) -> String {
    format!("SHA-256={}", sha256_base64(body))
}

fn sha256_base64(body: &[u8]) -> String {
    BASE64.encode(Sha256::digest(body))
}

/// Validate the `Digest` header against `body`
///
/// Body-carrying methods must list `digest` among the signed headers. When
/// `digest` is signed, the SHA-256 entry of the header must match the body.
/// The header is taken as raw bytes; anything outside visible ASCII is
/// rejected before comparing.
pub fn validate_digest(
    method: &Method,
    covered: &[String],
    body: &[u8],
    digest_header: Option<&[u8]>,
) -> Result<(), DigestError> {
    let digest_signed = covered.iter().any(|h| h.eq_ignore_ascii_case(DIGEST));

    if carries_body(method) && !digest_signed {
        return Err(DigestError::NotSigned {
            header: "Digest",
            method: method.as_str().to_string(),
        });
    }
    if !digest_signed {
        return Ok(());
    }

    let header = digest_header.ok_or(DigestError::Missing(DIGEST))?;
    let header = std::str::from_utf8(header)
        .ok()
        .filter(|h| h.is_ascii())
        .ok_or_else(|| DigestError::Malformed("Digest header is not valid ASCII".to_string()))?;
    let computed = sha256_base64(body);

    let given = header
        .split(',')
        .filter_map(|entry| entry.trim().split_once('='))
        .find(|(algorithm, _)| algorithm.trim().eq_ignore_ascii_case("sha-256"))
        .map(|(_, value)| value.trim());

    match given {
        Some(given) if given == computed => Ok(()),
        Some(given) => Err(DigestError::Mismatch {
            computed,
            given: given.to_string(),
        }),
        None => Err(DigestError::Mismatch {
            computed,
            given: header.to_string(),
        }),
    }
}

/// Validate the `Content-Digest` header against `body`
///
/// `signed` tells whether `content-digest` is a covered component. The
/// header must parse as an RFC 8941 dictionary and its `sha-256` member must
/// be a byte sequence equal to the SHA-256 of the body.
pub fn validate_content_digest(
    method: &Method,
    signed: bool,
    body: &[u8],
    header: Option<&[u8]>,
) -> Result<(), DigestError> {
    if carries_body(method) && !signed {
        return Err(DigestError::NotSigned {
            header: "Content-Digest",
            method: method.as_str().to_string(),
        });
    }
    if !signed {
        return Ok(());
    }

    let header = header.ok_or(DigestError::Missing(CONTENT_DIGEST))?;
    let dictionary = Parser::parse_dictionary(header).map_err(|_| {
        DigestError::Malformed(
            "Content-Digest could not be parsed. It does not contain a valid RFC8941 dictionary."
                .to_string(),
        )
    })?;

    let Some(entry) = dictionary.get("sha-256") else {
        let offered = dictionary.keys().cloned().collect::<Vec<_>>().join(", ");
        return Err(DigestError::Unsupported(offered));
    };
    let given = match entry {
        ListEntry::Item(Item {
            bare_item: BareItem::ByteSeq(bytes),
            ..
        }) => bytes,
        _ => {
            return Err(DigestError::Malformed(
                "Content-Digest sha-256 member is not a byte sequence".to_string(),
            ));
        }
    };

    let computed = Sha256::digest(body);
    if computed.as_slice() == given.as_slice() {
        Ok(())
    } else {
        Err(DigestError::Mismatch {
            computed: BASE64.encode(computed),
            given: BASE64.encode(given),
        })
    }
}
