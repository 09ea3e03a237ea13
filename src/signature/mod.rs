//! HTTP Signatures (draft-cavage and RFC 9421)
//!
//! Handles:
//! - Signature and Signature-Input header parsing
//! - Signing string and signature base reconstruction
//! - Digest, Content-Digest and freshness checks
//! - RSA / Ed25519 verification
//! - Outbound signing

mod canonical;
mod crypto;
mod digest;
mod freshness;
mod header;
mod input;
mod outcome;
mod signing;
mod verifier;

pub use canonical::{
    BuildError, CREATED, CanonicalRequestView, EXPIRES, REQUEST_TARGET, RequestTarget,
    build_signature_base, build_signing_string,
};
pub use crypto::{CryptoError, KeyParseError, PublicKey, verify_signature};
pub use digest::{
    CONTENT_DIGEST, DIGEST, DigestError, carries_body, generate_digest, validate_content_digest,
    validate_digest,
};
pub use freshness::{Clock, DateError, FixedClock, FreshnessGuard, SystemClock, parse_http_date};
pub use header::{ParseError, ParsedSignature, parse_signature_header};
pub use input::{InputError, ParsedMessageSignature, parse_message_signature};
pub use outcome::{VerificationFailure, VerificationOutcome};
pub use signing::{PrivateKey, SignatureHeaders, sign_request, signature_header};
pub use verifier::{InboundRequest, SignatureVerifier, VerificationPolicy};
