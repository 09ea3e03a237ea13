//! Signature-Input parsing
//!
//! RFC 9421 message signatures travel in two RFC 8941 dictionaries keyed by
//! the same label:
//!
//! ```text
//! Signature-Input: sig1=("@method" "@target-uri");created=1703066400;keyid="..."
//! Signature: sig1=:base64:
//! ```

use sfv::{BareItem, InnerList, Item, ListEntry, Parser, SerializeValue};
use thiserror::Error;

/// Derived components this verifier can reconstruct
pub const DERIVED_COMPONENTS: [&str; 7] = [
    "@method",
    "@target-uri",
    "@authority",
    "@scheme",
    "@request-target",
    "@path",
    "@query",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("Signature-Input is not a valid RFC8941 dictionary")]
    InvalidInput,

    #[error("Signature is not a valid RFC8941 dictionary")]
    InvalidSignature,

    #[error("Signature has no entries")]
    NoLabel,

    #[error("no Signature-Input entry for label {0}")]
    UnknownLabel(String),

    #[error("Signature-Input entry {0} must be an inner list")]
    NotInnerList(String),

    #[error("Signature entry {0} must be a byte sequence")]
    NotByteSequence(String),

    #[error("component identifiers must be strings")]
    InvalidComponent,

    #[error("unsupported component {0}")]
    UnsupportedComponent(String),

    #[error("component {0} is listed twice")]
    DuplicateComponent(String),

    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("invalid {0} parameter")]
    InvalidParameter(&'static str),
}

/// One message signature, selected by label
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedMessageSignature {
    pub label: String,
    /// Covered component identifiers, in declaration order
    pub components: Vec<String>,
    pub key_id: String,
    /// `alg` parameter, when given
    pub algorithm: Option<String>,
    pub created: i64,
    pub expires: Option<i64>,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
    /// Serialized inner list for the `@signature-params` line
    pub params: String,
}

impl ParsedMessageSignature {
    pub fn covers(&self, component: &str) -> bool {
        self.components.iter().any(|c| c == component)
    }
}

/// Parse the `Signature-Input` and `Signature` field values.
///
/// The first label of `Signature` picks the entry to verify.
pub fn parse_message_signature(
    signature_input: &[u8],
    signature: &[u8],
) -> Result<ParsedMessageSignature, InputError> {
    let signatures =
        Parser::parse_dictionary(signature).map_err(|_| InputError::InvalidSignature)?;
    let inputs = Parser::parse_dictionary(signature_input).map_err(|_| InputError::InvalidInput)?;

    let (label, entry) = signatures.first().ok_or(InputError::NoLabel)?;
    let signature = match entry {
        ListEntry::Item(Item {
            bare_item: BareItem::ByteSeq(bytes),
            ..
        }) => bytes.clone(),
        _ => return Err(InputError::NotByteSequence(label.clone())),
    };

    let input_entry = inputs
        .get(label)
        .ok_or_else(|| InputError::UnknownLabel(label.clone()))?;
    let ListEntry::InnerList(inner) = input_entry else {
        return Err(InputError::NotInnerList(label.clone()));
    };

    let components = covered_components(inner)?;
    let params = vec![input_entry.clone()]
        .serialize_value()
        .map_err(|_| InputError::InvalidInput)?;

    let key_id = match inner.params.get("keyid") {
        None => return Err(InputError::MissingParameter("keyid")),
        Some(value) => value
            .as_str()
            .filter(|s| !s.is_empty())
            .ok_or(InputError::InvalidParameter("keyid"))?
            .to_string(),
    };
    let algorithm = match inner.params.get("alg") {
        None => None,
        Some(value) => Some(
            value
                .as_str()
                .ok_or(InputError::InvalidParameter("alg"))?
                .to_string(),
        ),
    };
    let created = match inner.params.get("created") {
        None => return Err(InputError::MissingParameter("created")),
        Some(value) => value
            .as_int()
            .ok_or(InputError::InvalidParameter("created"))?,
    };
    let expires = match inner.params.get("expires") {
        None => None,
        Some(value) => Some(
            value
                .as_int()
                .ok_or(InputError::InvalidParameter("expires"))?,
        ),
    };

    Ok(ParsedMessageSignature {
        label: label.clone(),
        components,
        key_id,
        algorithm,
        created,
        expires,
        signature,
        params,
    })
}

fn covered_components(inner: &InnerList) -> Result<Vec<String>, InputError> {
    let mut components: Vec<String> = Vec::with_capacity(inner.items.len());

    for item in &inner.items {
        let name = item.bare_item.as_str().ok_or(InputError::InvalidComponent)?;

        // Component parameters (sf, key, bs, req, tr) change the value
        // representation; none of them are reconstructed here.
        if !item.params.is_empty() {
            return Err(InputError::UnsupportedComponent(name.to_string()));
        }
        if name.starts_with('@') {
            if !DERIVED_COMPONENTS.contains(&name) {
                return Err(InputError::UnsupportedComponent(name.to_string()));
            }
        } else if name.is_empty() || name != name.to_ascii_lowercase() {
            return Err(InputError::InvalidComponent);
        }
        if components.iter().any(|c| c == name) {
            return Err(InputError::DuplicateComponent(name.to_string()));
        }

        components.push(name.to_string());
    }

    Ok(components)
}

#[cfg(test)]
mod tests {
    use super::*;

    const GET_INPUT: &str = r#"sig1=("@method" "@target-uri");created=1703066400;keyid="https://remote.domain/users/bob#main-key""#;
    const SIGNATURE: &str = "sig1=:aGVsbG8=:";

    #[test]
    fn parses_recorded_input() {
        let parsed = parse_message_signature(GET_INPUT.as_bytes(), SIGNATURE.as_bytes())
            .expect("valid input");

        assert_eq!(parsed.label, "sig1");
        assert_eq!(parsed.components, vec!["@method", "@target-uri"]);
        assert_eq!(parsed.key_id, "https://remote.domain/users/bob#main-key");
        assert_eq!(parsed.algorithm, None);
        assert_eq!(parsed.created, 1_703_066_400);
        assert_eq!(parsed.expires, None);
        assert_eq!(parsed.signature, b"hello");
        assert!(parsed.covers("@method"));
        assert!(!parsed.covers("content-digest"));
    }

    #[test]
    fn params_line_is_the_serialized_inner_list() {
        let parsed =
            parse_message_signature(GET_INPUT.as_bytes(), SIGNATURE.as_bytes()).unwrap();
        assert_eq!(
            parsed.params,
            r#"("@method" "@target-uri");created=1703066400;keyid="https://remote.domain/users/bob#main-key""#
        );
    }

    #[test]
    fn first_signature_label_selects_the_input() {
        let input = r#"other=("@path");created=1;keyid="a", sig1=("@method");created=2;keyid="b";alg="ed25519";expires=3"#;
        let parsed =
            parse_message_signature(input.as_bytes(), b"sig1=:aGVsbG8=:, other=:aGVsbG8=:")
                .unwrap();

        assert_eq!(parsed.label, "sig1");
        assert_eq!(parsed.key_id, "b");
        assert_eq!(parsed.algorithm.as_deref(), Some("ed25519"));
        assert_eq!(parsed.expires, Some(3));
    }

    #[test]
    fn label_without_input_is_rejected() {
        let result = parse_message_signature(GET_INPUT.as_bytes(), b"sig2=:aGVsbG8=:");
        assert_eq!(result, Err(InputError::UnknownLabel("sig2".to_string())));
    }

    #[test]
    fn signature_must_be_a_byte_sequence() {
        let result = parse_message_signature(GET_INPUT.as_bytes(), b"sig1=\"aGVsbG8=\"");
        assert_eq!(result, Err(InputError::NotByteSequence("sig1".to_string())));
    }

    #[test]
    fn keyid_and_created_are_required() {
        let no_key = r#"sig1=("@method");created=1703066400"#;
        assert_eq!(
            parse_message_signature(no_key.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::MissingParameter("keyid"))
        );

        let no_created = r#"sig1=("@method");keyid="k""#;
        assert_eq!(
            parse_message_signature(no_created.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::MissingParameter("created"))
        );

        let bad_created = r#"sig1=("@method");created="yesterday";keyid="k""#;
        assert_eq!(
            parse_message_signature(bad_created.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::InvalidParameter("created"))
        );
    }

    #[test]
    fn unsupported_and_duplicate_components_are_rejected() {
        let status = r#"sig1=("@status");created=1;keyid="k""#;
        assert_eq!(
            parse_message_signature(status.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::UnsupportedComponent("@status".to_string()))
        );

        let with_params = r#"sig1=("content-digest";sf);created=1;keyid="k""#;
        assert_eq!(
            parse_message_signature(with_params.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::UnsupportedComponent("content-digest".to_string()))
        );

        let twice = r#"sig1=("host" "host");created=1;keyid="k""#;
        assert_eq!(
            parse_message_signature(twice.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::DuplicateComponent("host".to_string()))
        );

        let upper = r#"sig1=("Host");created=1;keyid="k""#;
        assert_eq!(
            parse_message_signature(upper.as_bytes(), SIGNATURE.as_bytes()),
            Err(InputError::InvalidComponent)
        );
    }

    #[test]
    fn garbage_is_not_a_dictionary() {
        assert_eq!(
            parse_message_signature(b"not a dictionary (", SIGNATURE.as_bytes()),
            Err(InputError::InvalidInput)
        );
        assert_eq!(
            parse_message_signature(GET_INPUT.as_bytes(), b"sig1=:not base64 !:"),
            Err(InputError::InvalidSignature)
        );
    }
}
