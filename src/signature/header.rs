//! Signature header parsing
//!
//! Parses the draft-cavage `Signature` header:
//!
//! ```text
//! keyId="...",algorithm="...",headers="...",signature="..."
//! ```
//!
//! This is not an RFC 8941 structured field, so it gets its own small tokenizer.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use thiserror::Error;

/// Errors produced while parsing a `Signature` header
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("missing {0} parameter")]
    MissingParameter(&'static str),

    #[error("empty {0} parameter")]
    EmptyParameter(String),

    #[error("duplicate {0} parameter")]
    DuplicateParameter(String),

    #[error("malformed parameter list at byte {0}")]
    Malformed(usize),

    #[error("{0} parameter must be quoted")]
    Unquoted(String),

    #[error("invalid {0} timestamp")]
    InvalidTimestamp(&'static str),

    #[error("signature is not valid base64")]
    InvalidEncoding,
}

/// Parsed Signature header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSignature {
    /// Key ID (URL to public key)
    pub key_id: String,
    /// Declared algorithm, e.g. `rsa-sha256` or `hs2019`
    pub algorithm: String,
    /// Signed header names, lower-cased, in declaration order
    pub headers: Vec<String>,
    /// Decoded signature bytes
    pub signature: Vec<u8>,
    /// `created` parameter (unix seconds)
    pub created: Option<i64>,
    /// `expires` parameter (unix seconds)
    pub expires: Option<i64>,
}

impl ParsedSignature {
    /// Whether `name` is among the signed headers
    pub fn covers(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h.eq_ignore_ascii_case(name))
    }
}

/// Parse Signature header value
pub fn parse_signature_header(header: &str) -> Result<ParsedSignature, ParseError> {
    let mut key_id = None;
    let mut algorithm = None;
    let mut headers = None;
    let mut signature = None;
    let mut created = None;
    let mut expires = None;

    let mut seen: Vec<String> = Vec::new();

    for pair in Tokenizer::new(header) {
        let (key, value) = pair?;
        if seen.iter().any(|k| k == key) {
            return Err(ParseError::DuplicateParameter(key.to_string()));
        }
        seen.push(key.to_string());

        if value.is_empty() {
            return Err(ParseError::EmptyParameter(key.to_string()));
        }

        match (key, value) {
            ("keyId", Value::Quoted(v)) => key_id = Some(v.to_string()),
            ("algorithm", Value::Quoted(v)) => algorithm = Some(v.to_string()),
            ("headers", Value::Quoted(v)) => {
                headers = Some(
                    v.split_whitespace()
                        .map(|s| s.to_ascii_lowercase())
                        .collect::<Vec<_>>(),
                )
            }
            ("signature", Value::Quoted(v)) => {
                signature = Some(BASE64.decode(v).map_err(|_| ParseError::InvalidEncoding)?)
            }
            ("created", v) => created = Some(parse_timestamp(v, "created")?),
            ("expires", v) => expires = Some(parse_timestamp(v, "expires")?),
            ("keyId" | "algorithm" | "headers" | "signature", Value::Bare(_)) => {
                return Err(ParseError::Unquoted(key.to_string()));
            }
            _ => {} // Ignore unknown fields
        }
    }

    let headers = headers.ok_or(ParseError::MissingParameter("headers"))?;
    if headers.is_empty() {
        return Err(ParseError::EmptyParameter("headers".to_string()));
    }

    Ok(ParsedSignature {
        key_id: key_id.ok_or(ParseError::MissingParameter("keyId"))?,
        algorithm: algorithm.ok_or(ParseError::MissingParameter("algorithm"))?,
        headers,
        signature: signature.ok_or(ParseError::MissingParameter("signature"))?,
        created,
        expires,
    })
}

fn parse_timestamp(value: Value<'_>, name: &'static str) -> Result<i64, ParseError> {
    let raw = match value {
        Value::Quoted(v) | Value::Bare(v) => v,
    };
    raw.parse().map_err(|_| ParseError::InvalidTimestamp(name))
}

#[derive(Debug, Clone, Copy)]
enum Value<'a> {
    Quoted(&'a str),
    /// Unquoted decimal integer, only meaningful for `created`/`expires`
    Bare(&'a str),
}

impl Value<'_> {
    fn is_empty(&self) -> bool {
        match self {
            Value::Quoted(v) | Value::Bare(v) => v.trim().is_empty(),
        }
    }
}

/// Splits `key="value", key="value"` into pairs.
///
/// Yields a single `Err` and then stops when the input is malformed.
struct Tokenizer<'a> {
    input: &'a str,
    pos: usize,
    done: bool,
}

impl<'a> Tokenizer<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            done: false,
        }
    }

    fn skip_whitespace(&mut self) {
        while let Some(b) = self.input.as_bytes().get(self.pos) {
            if *b == b' ' || *b == b'\t' {
                self.pos += 1;
            } else {
                break;
            }
        }
    }

    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    fn take_while(&mut self, pred: impl Fn(u8) -> bool) -> &'a str {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if !pred(b) {
                break;
            }
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    fn next_pair(&mut self) -> Result<Option<(&'a str, Value<'a>)>, ParseError> {
        self.skip_whitespace();
        if self.pos >= self.input.len() {
            return Ok(None);
        }

        let key = self.take_while(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if key.is_empty() {
            return Err(ParseError::Malformed(self.pos));
        }

        self.skip_whitespace();
        if self.peek() != Some(b'=') {
            return Err(ParseError::Malformed(self.pos));
        }
        self.pos += 1;
        self.skip_whitespace();

        let value = if self.peek() == Some(b'"') {
            self.pos += 1;
            let value = self.take_while(|b| b != b'"');
            if self.peek() != Some(b'"') {
                return Err(ParseError::Malformed(self.pos));
            }
            self.pos += 1;
            Value::Quoted(value)
        } else {
            let value = self.take_while(|b| b.is_ascii_digit());
            if value.is_empty() {
                return Err(ParseError::Malformed(self.pos));
            }
            Value::Bare(value)
        };

        self.skip_whitespace();
        match self.peek() {
            None => {}
            Some(b',') => self.pos += 1,
            Some(_) => return Err(ParseError::Malformed(self.pos)),
        }

        Ok(Some((key, value)))
    }
}

impl<'a> Iterator for Tokenizer<'a> {
    type Item = Result<(&'a str, Value<'a>), ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let next = self.next_pair().transpose();
        if matches!(next, None | Some(Err(_))) {
            self.done = true;
        }
        next
    }
}
