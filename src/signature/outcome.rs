//! Verification results

use thiserror::Error;

use super::canonical::BuildError;
use super::digest::DigestError;
use super::freshness::DateError;
use super::header::ParseError;
use super::input::InputError;

/// Why a signed request was rejected
///
/// Closed set. `Display` is the diagnostic message exposed to callers that
/// opt into failure reasons.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerificationFailure {
    /// Signature header present but unparsable, or missing required coverage
    #[error("{0}")]
    InvalidSignatureHeader(String),

    /// Date missing or not an HTTP-date
    #[error("Invalid Date header: {0}")]
    InvalidDate(String),

    #[error("Signed request date outside acceptable time window")]
    DateOutOfWindow,

    /// A header listed in `headers=` is absent from the request
    #[error("Header {0} is declared as signed but missing from the request")]
    MissingSignedHeader(String),

    #[error("Unable to fetch key JSON at {key_id}")]
    KeyUnreachable { key_id: String },

    /// Cryptographic check failed, whatever the cause
    #[error("Verification failed for {key_id}")]
    BadSignature { key_id: String },

    /// `Digest` or `Content-Digest` left out of a body-carrying request
    #[error("The {header} header must be signed when doing a {method} request")]
    DigestNotSigned {
        header: &'static str,
        method: String,
    },

    #[error("Invalid Digest value. Computed SHA-256 digest: {computed}; given: {given}")]
    DigestMismatch { computed: String, given: String },

    /// Digest header present but unparsable; rejected as a bad request
    #[error("{0}")]
    MalformedDigest(String),

    #[error("Only SHA-256 is supported in Content-Digest. Offered algorithms: {offered}")]
    UnsupportedDigest { offered: String },
}

impl VerificationFailure {
    /// Stable label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidSignatureHeader(_) => "invalid_signature_header",
            Self::InvalidDate(_) => "invalid_date",
            Self::DateOutOfWindow => "date_out_of_window",
            Self::MissingSignedHeader(_) => "missing_signed_header",
            Self::KeyUnreachable { .. } => "key_unreachable",
            Self::BadSignature { .. } => "bad_signature",
            Self::DigestNotSigned { .. } => "digest_not_signed",
            Self::DigestMismatch { .. } => "digest_mismatch",
            Self::MalformedDigest(_) => "malformed_digest",
            Self::UnsupportedDigest { .. } => "unsupported_digest",
        }
    }

    /// Whether the request itself is malformed rather than unauthenticated
    pub fn is_bad_request(&self) -> bool {
        matches!(self, Self::MalformedDigest(_))
    }
}

impl From<ParseError> for VerificationFailure {
    fn from(err: ParseError) -> Self {
        Self::InvalidSignatureHeader(format!("Invalid Signature header: {}", err))
    }
}

impl From<InputError> for VerificationFailure {
    fn from(err: InputError) -> Self {
        Self::InvalidSignatureHeader(format!("Invalid Signature-Input header: {}", err))
    }
}

impl From<DateError> for VerificationFailure {
    fn from(err: DateError) -> Self {
        match err {
            DateError::OutOfWindow => Self::DateOutOfWindow,
            other => Self::InvalidDate(other.to_string()),
        }
    }
}

impl From<BuildError> for VerificationFailure {
    fn from(err: BuildError) -> Self {
        match err {
            BuildError::MissingHeader(name) => Self::MissingSignedHeader(name),
            BuildError::UnsupportedComponent(name) => Self::InvalidSignatureHeader(format!(
                "Invalid Signature-Input header: unsupported component {}",
                name
            )),
        }
    }
}

impl From<DigestError> for VerificationFailure {
    fn from(err: DigestError) -> Self {
        match err {
            DigestError::NotSigned { header, method } => Self::DigestNotSigned { header, method },
            DigestError::Missing(name) => Self::MissingSignedHeader(name.to_string()),
            DigestError::Mismatch { computed, given } => Self::DigestMismatch { computed, given },
            DigestError::Malformed(message) => Self::MalformedDigest(message),
            DigestError::Unsupported(offered) => Self::UnsupportedDigest { offered },
        }
    }
}

/// Result of verifying one inbound request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationOutcome {
    /// No Signature header at all
    NotSigned,
    Verified {
        actor_id: String,
        key_id: String,
    },
    Failed {
        reason: VerificationFailure,
    },
}

impl VerificationOutcome {
    pub fn is_signed(&self) -> bool {
        !matches!(self, Self::NotSigned)
    }

    pub fn is_verified(&self) -> bool {
        matches!(self, Self::Verified { .. })
    }

    pub fn actor_id(&self) -> Option<&str> {
        match self {
            Self::Verified { actor_id, .. } => Some(actor_id),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&VerificationFailure> {
        match self {
            Self::Failed { reason } => Some(reason),
            _ => None,
        }
    }

    /// Human-readable reason the request is not authenticated
    pub fn error_message(&self) -> Option<String> {
        match self {
            Self::NotSigned => Some("Request not signed".to_string()),
            Self::Verified { .. } => None,
            Self::Failed { reason } => Some(reason.to_string()),
        }
    }

    /// Metrics label
    pub fn label(&self) -> &'static str {
        match self {
            Self::NotSigned => "not_signed",
            Self::Verified { .. } => "verified",
            Self::Failed { reason } => reason.kind(),
        }
    }
}
