//! Signing string reconstruction
//!
//! Rebuilds the bytes the remote signer produced: the draft-cavage signing
//! string from the `headers` list of the Signature header, or the RFC 9421
//! signature base from the covered components of `Signature-Input`.

use http::HeaderMap;
use thiserror::Error;

use super::input::ParsedMessageSignature;

/// Pseudo-header carrying the method and target of the request
pub const REQUEST_TARGET: &str = "(request-target)";
/// Pseudo-header carrying the `created` signature parameter
pub const CREATED: &str = "(created)";
/// Pseudo-header carrying the `expires` signature parameter
pub const EXPIRES: &str = "(expires)";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("Header {0} is declared as signed but missing from the request")]
    MissingHeader(String),

    #[error("unsupported component {0}")]
    UnsupportedComponent(String),
}

/// How `(request-target)` is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTarget {
    /// `<method> <path>?<query>`, exactly as received
    Full,
    /// `<method> <path>`, for signers that leave the query out
    PathOnly,
}

/// Read-only projection of an inbound request
#[derive(Debug, Clone)]
pub struct CanonicalRequestView<'a> {
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    headers: &'a HeaderMap,
    created: Option<i64>,
    expires: Option<i64>,
    scheme: &'a str,
    authority: Option<&'a str>,
}

impl<'a> CanonicalRequestView<'a> {
    pub fn new(
        method: &'a str,
        path: &'a str,
        query: Option<&'a str>,
        headers: &'a HeaderMap,
    ) -> Self {
        Self {
            method,
            path,
            query: query.filter(|q| !q.is_empty()),
            headers,
            created: None,
            expires: None,
            scheme: "https",
            authority: None,
        }
    }

    /// Attach the `created`/`expires` signature parameters
    pub fn with_signature_params(mut self, created: Option<i64>, expires: Option<i64>) -> Self {
        self.created = created;
        self.expires = expires;
        self
    }

    /// Scheme and authority the request was received under.
    ///
    /// Without an explicit authority the `Host` header is used.
    pub fn with_origin(mut self, scheme: &'a str, authority: Option<&'a str>) -> Self {
        self.scheme = scheme;
        self.authority = authority;
        self
    }

    pub fn has_query(&self) -> bool {
        self.query.is_some()
    }

    /// Header value as transmitted, byte for byte.
    ///
    /// Repeated field lines are joined with `", "`. Names are case-insensitive.
    pub fn header(&self, name: &str) -> Option<Vec<u8>> {
        let mut values = self.headers.get_all(name).iter().peekable();
        values.peek()?;
        let joined = values
            .map(|v| v.as_bytes())
            .collect::<Vec<_>>()
            .join(&b", "[..]);
        Some(joined)
    }

    /// Field value for a message signature: each field line trimmed, then
    /// joined with `", "`.
    pub fn field(&self, name: &str) -> Option<Vec<u8>> {
        let mut values = self.headers.get_all(name).iter().peekable();
        values.peek()?;
        let joined = values
            .map(|v| v.as_bytes().trim_ascii())
            .collect::<Vec<_>>()
            .join(&b", "[..]);
        Some(joined)
    }

    fn request_target(&self, target: RequestTarget) -> String {
        let method = self.method.to_ascii_lowercase();
        match (target, self.query) {
            (RequestTarget::Full, Some(query)) => {
                format!("{} {}?{}", method, self.path, query)
            }
            _ => format!("{} {}", method, self.path),
        }
    }

    fn authority(&self) -> Result<String, BuildError> {
        let authority = match self.authority {
            Some(authority) => authority,
            None => self
                .headers
                .get(http::header::HOST)
                .and_then(|v| v.to_str().ok())
                .ok_or_else(|| BuildError::MissingHeader("host".to_string()))?,
        };
        Ok(authority.to_ascii_lowercase())
    }

    fn path(&self) -> &str {
        if self.path.is_empty() { "/" } else { self.path }
    }

    fn path_and_query(&self) -> String {
        match self.query {
            Some(query) => format!("{}?{}", self.path(), query),
            None => self.path().to_string(),
        }
    }

    fn component(&self, name: &str) -> Result<Vec<u8>, BuildError> {
        let value = match name {
            "@method" => self.method.to_string(),
            "@target-uri" => format!(
                "{}://{}{}",
                self.scheme.to_ascii_lowercase(),
                self.authority()?,
                self.path_and_query()
            ),
            "@authority" => self.authority()?,
            "@scheme" => self.scheme.to_ascii_lowercase(),
            "@request-target" => self.path_and_query(),
            "@path" => self.path().to_string(),
            "@query" => format!("?{}", self.query.unwrap_or_default()),
            derived if derived.starts_with('@') => {
                return Err(BuildError::UnsupportedComponent(derived.to_string()));
            }
            field => {
                return self
                    .field(field)
                    .ok_or_else(|| BuildError::MissingHeader(field.to_string()));
            }
        };
        Ok(value.into_bytes())
    }
}

/// Build the signing string for `covered` headers in declaration order.
///
/// The result is raw bytes: header values are copied without decoding.
pub fn build_signing_string(
    covered: &[String],
    view: &CanonicalRequestView<'_>,
    target: RequestTarget,
) -> Result<Vec<u8>, BuildError> {
    let mut lines = Vec::with_capacity(covered.len());

    for name in covered {
        let name = name.to_ascii_lowercase();
        let value = match name.as_str() {
            REQUEST_TARGET => view.request_target(target).into_bytes(),
            CREATED => view
                .created
                .map(|v| v.to_string().into_bytes())
                .ok_or_else(|| BuildError::MissingHeader(name.clone()))?,
            EXPIRES => view
                .expires
                .map(|v| v.to_string().into_bytes())
                .ok_or_else(|| BuildError::MissingHeader(name.clone()))?,
            _ => view
                .header(&name)
                .ok_or_else(|| BuildError::MissingHeader(name.clone()))?,
        };

        let mut line = name.into_bytes();
        line.extend_from_slice(b": ");
        line.extend_from_slice(&value);
        lines.push(line);
    }

    Ok(lines.join(&b'\n'))
}

/// Build the RFC 9421 signature base for `signature`
///
/// One `"<component>": <value>` line per covered component, then the
/// `@signature-params` line.
pub fn build_signature_base(
    signature: &ParsedMessageSignature,
    view: &CanonicalRequestView<'_>,
) -> Result<Vec<u8>, BuildError> {
    let mut base = Vec::new();

    for component in &signature.components {
        let value = view.component(component)?;
        base.push(b'"');
        base.extend_from_slice(component.as_bytes());
        base.extend_from_slice(b"\": ");
        base.extend_from_slice(&value);
        base.push(b'\n');
    }

    base.extend_from_slice(b"\"@signature-params\": ");
    base.extend_from_slice(signature.params.as_bytes());
    Ok(base)
}
