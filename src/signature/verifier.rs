//! Verification orchestrator
//!
//! Runs the checks in a fixed order and turns the first failure into a
//! `VerificationOutcome`. Requests carrying `Signature-Input` are verified as
//! RFC 9421 message signatures, everything else as draft-cavage. The key
//! resolver is the only suspension point.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use http::{HeaderMap, Method, Uri};

use super::canonical::{
    CREATED, CanonicalRequestView, REQUEST_TARGET, RequestTarget, build_signature_base,
    build_signing_string,
};
use super::crypto::{PublicKey, verify_signature};
use super::digest::{CONTENT_DIGEST, validate_content_digest, validate_digest};
use super::freshness::{DateError, FreshnessGuard};
use super::header::{ParsedSignature, parse_signature_header};
use super::input::{ParsedMessageSignature, parse_message_signature};
use super::outcome::{VerificationFailure, VerificationOutcome};
use crate::config::SignatureConfig;
use crate::error::AppError;
use crate::federation::{KeyResolver, ResolvedKey};
use crate::metrics::{
    SIGNATURE_QUERY_FALLBACK_TOTAL, SIGNATURE_VERIFICATION_DURATION_SECONDS,
    SIGNATURE_VERIFICATIONS_TOTAL,
};

const SIGNATURE_INPUT: &str = "signature-input";

/// Acceptance rules for signatures
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationPolicy {
    /// Maximum distance between the signing time and now
    pub window: Duration,
    /// Headers every draft-cavage signature must cover, lower-case
    pub required_headers: Vec<String>,
    /// Components every RFC 9421 signature must cover
    pub required_components: Vec<String>,
    /// Scheme used to rebuild `@target-uri` and `@scheme`
    pub target_scheme: String,
    /// Retry with a path-only request target when the query breaks the signature
    pub query_fallback: bool,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            window: Duration::days(1),
            required_headers: vec![REQUEST_TARGET.to_string()],
            required_components: vec!["@method".to_string(), "@target-uri".to_string()],
            target_scheme: "https".to_string(),
            query_fallback: true,
        }
    }
}

impl TryFrom<&SignatureConfig> for VerificationPolicy {
    type Error = AppError;

    fn try_from(config: &SignatureConfig) -> Result<Self, Self::Error> {
        let window = i64::try_from(config.window_seconds)
            .ok()
            .and_then(Duration::try_seconds)
            .ok_or_else(|| {
                AppError::Config(format!(
                    "signature.window_seconds out of range: {}",
                    config.window_seconds
                ))
            })?;

        Ok(Self {
            window,
            required_headers: config.required_headers.clone(),
            required_components: config.required_components.clone(),
            target_scheme: config.target_uri_scheme.clone(),
            query_fallback: config.query_fallback,
        })
    }
}

/// The parts of an inbound request verification looks at
#[derive(Debug, Clone, Copy)]
pub struct InboundRequest<'a> {
    pub method: &'a Method,
    /// Authority from an absolute-form or HTTP/2 request target
    pub authority: Option<&'a str>,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
    pub body: &'a [u8],
}

impl<'a> InboundRequest<'a> {
    pub fn new(method: &'a Method, uri: &'a Uri, headers: &'a HeaderMap, body: &'a [u8]) -> Self {
        Self {
            method,
            authority: uri.authority().map(|a| a.as_str()),
            path: uri.path(),
            query: uri.query(),
            headers,
            body,
        }
    }

    fn view<'s>(&'s self, scheme: &'s str) -> CanonicalRequestView<'s> {
        CanonicalRequestView::new(self.method.as_str(), self.path, self.query, self.headers)
            .with_origin(scheme, self.authority)
    }
}

/// Verifies HTTP signatures on inbound requests
pub struct SignatureVerifier {
    resolver: Arc<dyn KeyResolver>,
    policy: VerificationPolicy,
    freshness: FreshnessGuard,
}

impl SignatureVerifier {
    pub fn new(resolver: Arc<dyn KeyResolver>, policy: VerificationPolicy) -> Self {
        let freshness = FreshnessGuard::new(policy.window);
        Self {
            resolver,
            policy,
            freshness,
        }
    }

    /// Verify `request` as of `now`
    pub async fn verify(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
    ) -> VerificationOutcome {
        let timer = SIGNATURE_VERIFICATION_DURATION_SECONDS.start_timer();

        let outcome = match self.run(request, now).await {
            Ok(None) => VerificationOutcome::NotSigned,
            Ok(Some((actor_id, key_id))) => {
                tracing::info!(%actor_id, %key_id, "Signature verified");
                VerificationOutcome::Verified { actor_id, key_id }
            }
            Err(reason) => {
                tracing::warn!(
                    method = %request.method,
                    path = request.path,
                    kind = reason.kind(),
                    reason = %reason,
                    "Signature verification failed"
                );
                VerificationOutcome::Failed { reason }
            }
        };

        timer.observe_duration();
        SIGNATURE_VERIFICATIONS_TOTAL
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    async fn run(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<Option<(String, String)>, VerificationFailure> {
        // 1. Unsigned requests are not an error here
        let Some(raw) = request.headers.get("signature") else {
            tracing::debug!(path = request.path, "Request not signed");
            return Ok(None);
        };

        if request.headers.contains_key(SIGNATURE_INPUT) {
            return self.run_message_signature(request, now).await.map(Some);
        }

        let raw = raw.to_str().map_err(|_| {
            VerificationFailure::InvalidSignatureHeader(
                "Invalid Signature header: not valid ASCII".to_string(),
            )
        })?;

        // 2. Parse and enforce coverage
        let signature = parse_signature_header(raw)?;
        tracing::debug!(
            key_id = %signature.key_id,
            algorithm = %signature.algorithm,
            headers = ?signature.headers,
            "Parsed Signature header"
        );
        self.check_coverage(&signature)?;

        // 3. Freshness
        self.check_freshness(&signature, request.headers, now)?;

        // 4. Key resolution
        let resolved = self.resolve(&signature.key_id).await?;

        // 5 and 6. Canonical string and crypto
        let view = request
            .view(&self.policy.target_scheme)
            .with_signature_params(signature.created, signature.expires);
        self.check_signature(&signature, &resolved.public_key, &view)?;

        // 7. Body binding
        let digest_header = request.headers.get("digest").map(|value| value.as_bytes());
        validate_digest(
            request.method,
            &signature.headers,
            request.body,
            digest_header,
        )?;

        Ok(Some((resolved.actor_id, signature.key_id)))
    }

    /// RFC 9421 path: `Signature-Input` plus a `Signature` dictionary
    async fn run_message_signature(
        &self,
        request: &InboundRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<(String, String), VerificationFailure> {
        let view = request.view(&self.policy.target_scheme);

        // 2. Parse and enforce coverage
        let input = view.header(SIGNATURE_INPUT).unwrap_or_default();
        let raw = view.header("signature").unwrap_or_default();
        let signature = parse_message_signature(&input, &raw)?;
        tracing::debug!(
            label = %signature.label,
            key_id = %signature.key_id,
            components = ?signature.components,
            "Parsed Signature-Input header"
        );
        self.check_components(&signature)?;

        // 3. Freshness
        self.freshness
            .check_created(signature.created, signature.expires, now)?;

        // 4. Body binding, before any key fetch
        validate_content_digest(
            request.method,
            signature.covers(CONTENT_DIGEST),
            request.body,
            view.field(CONTENT_DIGEST).as_deref(),
        )?;

        // 5. Key resolution
        let resolved = self.resolve(&signature.key_id).await?;

        // 6. Signature base and crypto
        let base = build_signature_base(&signature, &view)?;
        verify_signature(
            &resolved.public_key,
            signature.algorithm.as_deref(),
            &base,
            &signature.signature,
        )
        .map_err(|error| {
            tracing::debug!(key_id = %signature.key_id, %error, "Message signature failed");
            VerificationFailure::BadSignature {
                key_id: signature.key_id.clone(),
            }
        })?;

        Ok((resolved.actor_id, signature.key_id))
    }

    async fn resolve(&self, key_id: &str) -> Result<ResolvedKey, VerificationFailure> {
        self.resolver.resolve(key_id).await.map_err(|error| {
            tracing::debug!(key_id, %error, "Key resolution failed");
            VerificationFailure::KeyUnreachable {
                key_id: key_id.to_string(),
            }
        })
    }

    fn check_coverage(&self, signature: &ParsedSignature) -> Result<(), VerificationFailure> {
        if let Some(missing) = self
            .policy
            .required_headers
            .iter()
            .find(|name| !signature.covers(name))
        {
            return Err(VerificationFailure::InvalidSignatureHeader(format!(
                "Signed headers must include: {}",
                missing
            )));
        }

        if !signature.covers("date") && !signature.covers(CREATED) {
            return Err(VerificationFailure::InvalidSignatureHeader(
                "Signed headers must include: date or (created)".to_string(),
            ));
        }

        Ok(())
    }

    fn check_components(
        &self,
        signature: &ParsedMessageSignature,
    ) -> Result<(), VerificationFailure> {
        match self
            .policy
            .required_components
            .iter()
            .find(|name| !signature.covers(name))
        {
            Some(missing) => Err(VerificationFailure::InvalidSignatureHeader(format!(
                "Signed components must include: {}",
                missing
            ))),
            None => Ok(()),
        }
    }

    fn check_freshness(
        &self,
        signature: &ParsedSignature,
        headers: &HeaderMap,
        now: DateTime<Utc>,
    ) -> Result<(), VerificationFailure> {
        if signature.covers(CREATED) {
            let created = signature.created.ok_or_else(|| {
                VerificationFailure::InvalidSignatureHeader(
                    "Invalid Signature header: (created) is signed but has no created parameter"
                        .to_string(),
                )
            })?;
            self.freshness.check_created(created, signature.expires, now)?;
        }

        if signature.covers("date") {
            let date = headers
                .get(http::header::DATE)
                .map(|value| value.to_str().map_err(|_| DateError::NotAscii))
                .transpose()?;
            self.freshness.check(date, now)?;
        }

        Ok(())
    }

    fn check_signature(
        &self,
        signature: &ParsedSignature,
        key: &PublicKey,
        view: &CanonicalRequestView<'_>,
    ) -> Result<(), VerificationFailure> {
        let attempts: &[RequestTarget] =
            if self.policy.query_fallback && view.has_query() && signature.covers(REQUEST_TARGET) {
                &[RequestTarget::Full, RequestTarget::PathOnly]
            } else {
                &[RequestTarget::Full]
            };

        for (attempt, target) in attempts.iter().enumerate() {
            let signing_string = build_signing_string(&signature.headers, view, *target)?;

            match verify_signature(
                key,
                Some(signature.algorithm.as_str()),
                &signing_string,
                &signature.signature,
            ) {
                Ok(()) => {
                    if attempt > 0 {
                        SIGNATURE_QUERY_FALLBACK_TOTAL.inc();
                        tracing::debug!(
                            key_id = %signature.key_id,
                            "Signature verified without query string"
                        );
                    }
                    return Ok(());
                }
                Err(error) => {
                    tracing::debug!(
                        key_id = %signature.key_id,
                        ?target,
                        %error,
                        "Signature attempt failed"
                    );
                }
            }
        }

        Err(VerificationFailure::BadSignature {
            key_id: signature.key_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::federation::{KeyResolveError, MockKeyResolver, StaticKeyResolver};
    use crate::signature::signing::{PrivateKey, signature_header};
    use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
    use http::HeaderValue;
    use http::header::HeaderName;

    const ACTOR_KEY_PEM: &str = include_str!("../../tests/fixtures/remote_actor_key.pem");
    const BOB_KEY_ID: &str = "https://remote.domain/users/bob#main-key";
    const BOB_ACTOR_ID: &str = "https://remote.domain/users/bob";
    const ALICE_KEY_ID: &str = "https://remote.example/users/alice#ed25519-key";
    const ALICE_ACTOR_ID: &str = "https://remote.example/users/alice";
    const DATE: &str = "Wed, 20 Dec 2023 10:00:00 GMT";
    const HELLO_DIGEST: &str = "ZOyIygCyaOW6GjVnihtTFtIS9PNmskdyMlNKiuyjfzw=";
    const HELLO_BANG_DIGEST: &str = "wFNeS+K3n/2TKRMFQ2v4iTFOSj+uwF7P/Lt98xrZ5Ro=";

    fn now() -> DateTime<Utc> {
        "2023-12-20T10:00:00Z".parse().unwrap()
    }

    fn bob_key() -> PrivateKey {
        PrivateKey::from_pem(ACTOR_KEY_PEM).expect("fixture key")
    }

    fn alice_key() -> PrivateKey {
        PrivateKey::Ed25519(ed25519_dalek::SigningKey::from_bytes(&[4u8; 32]))
    }

    fn verifier() -> SignatureVerifier {
        let resolver = StaticKeyResolver::new()
            .with_key(BOB_KEY_ID, BOB_ACTOR_ID, bob_key().public_key())
            .with_key(ALICE_KEY_ID, ALICE_ACTOR_ID, alice_key().public_key());
        SignatureVerifier::new(Arc::new(resolver), VerificationPolicy::default())
    }

    fn headers(pairs: &[(&str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(
                HeaderName::from_bytes(name.as_bytes()).unwrap(),
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    async fn verify_with(
        verifier: &SignatureVerifier,
        method: Method,
        uri: &str,
        headers: &HeaderMap,
        body: &[u8],
    ) -> VerificationOutcome {
        let uri: Uri = uri.parse().unwrap();
        verifier
            .verify(&InboundRequest::new(&method, &uri, headers, body), now())
            .await
    }

    fn signed_get(target: &str) -> HeaderMap {
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[
                ("date", DATE),
                ("host", "www.example.com"),
                ("(request-target)", target),
            ],
        );
        headers(&[
            ("date", DATE),
            ("host", "www.example.com"),
            ("signature", signature.as_str()),
        ])
    }

    /// `Signature-Input` and `Signature` values for alice signing `components`
    fn sign_message(components: &[(&str, &str)], extra_params: &str) -> (String, String) {
        let names = components
            .iter()
            .map(|(name, _)| format!("\"{}\"", name))
            .collect::<Vec<_>>()
            .join(" ");
        let params = format!(
            "({});created={};keyid=\"{}\"{}",
            names,
            now().timestamp(),
            ALICE_KEY_ID,
            extra_params
        );

        let mut base = String::new();
        for (name, value) in components {
            base.push_str(&format!("\"{}\": {}\n", name, value));
        }
        base.push_str(&format!("\"@signature-params\": {}", params));

        let signature = BASE64.encode(alice_key().sign(base.as_bytes()));
        (format!("sig1={}", params), format!("sig1=:{}:", signature))
    }

    fn message_headers(input: &str, signature: &str, extra: &[(&str, &str)]) -> HeaderMap {
        let mut map = headers(&[
            ("host", "www.example.com"),
            ("signature-input", input),
            ("signature", signature),
        ]);
        map.extend(headers(extra));
        map
    }

    fn failure(outcome: VerificationOutcome) -> VerificationFailure {
        match outcome {
            VerificationOutcome::Failed { reason } => reason,
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unsigned_request_is_not_signed() {
        let headers = headers(&[("host", "www.example.com")]);
        let outcome = verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await;
        assert_eq!(outcome, VerificationOutcome::NotSigned);
    }

    #[tokio::test]
    async fn valid_get_signature_is_verified() {
        let outcome = verify_with(
            &verifier(),
            Method::GET,
            "/activitypub/success",
            &signed_get("get /activitypub/success"),
            b"",
        )
        .await;

        assert_eq!(
            outcome,
            VerificationOutcome::Verified {
                actor_id: BOB_ACTOR_ID.to_string(),
                key_id: BOB_KEY_ID.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn tampered_path_is_bad_signature() {
        let outcome = verify_with(
            &verifier(),
            Method::GET,
            "/activitypub/alternative-path",
            &signed_get("get /activitypub/success"),
            b"",
        )
        .await;

        assert_eq!(
            failure(outcome),
            VerificationFailure::BadSignature {
                key_id: BOB_KEY_ID.to_string()
            }
        );
    }

    #[tokio::test]
    async fn path_only_signature_passes_with_query_via_fallback() {
        let outcome = verify_with(
            &verifier(),
            Method::GET,
            "/activitypub/success?foo=42",
            &signed_get("get /activitypub/success"),
            b"",
        )
        .await;
        assert!(outcome.is_verified());
    }

    #[tokio::test]
    async fn fallback_can_be_disabled() {
        let resolver =
            StaticKeyResolver::new().with_key(BOB_KEY_ID, BOB_ACTOR_ID, bob_key().public_key());
        let verifier = SignatureVerifier::new(
            Arc::new(resolver),
            VerificationPolicy {
                query_fallback: false,
                ..VerificationPolicy::default()
            },
        );

        let outcome = verify_with(
            &verifier,
            Method::GET,
            "/activitypub/success?foo=42",
            &signed_get("get /activitypub/success"),
            b"",
        )
        .await;
        assert!(matches!(failure(outcome), VerificationFailure::BadSignature { .. }));
    }

    #[tokio::test]
    async fn signature_over_other_query_fails() {
        let outcome = verify_with(
            &verifier(),
            Method::GET,
            "/activitypub/success?foo=43",
            &signed_get("get /activitypub/success?foo=42"),
            b"",
        )
        .await;
        assert!(matches!(failure(outcome), VerificationFailure::BadSignature { .. }));
    }

    #[tokio::test]
    async fn missing_required_coverage_is_rejected() {
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[("date", DATE), ("host", "www.example.com")],
        );
        let headers = headers(&[
            ("date", DATE),
            ("host", "www.example.com"),
            ("signature", signature.as_str()),
        ]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(
            reason,
            VerificationFailure::InvalidSignatureHeader(
                "Signed headers must include: (request-target)".to_string()
            )
        );
    }

    #[tokio::test]
    async fn date_or_created_must_be_covered() {
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[("host", "www.example.com"), ("(request-target)", "get /inbox")],
        );
        let headers = headers(&[
            ("date", DATE),
            ("host", "www.example.com"),
            ("signature", signature.as_str()),
        ]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason.kind(), "invalid_signature_header");
    }

    #[tokio::test]
    async fn stale_date_is_out_of_window() {
        let stale = "Mon, 18 Dec 2023 10:00:00 GMT";
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[
                ("date", stale),
                ("host", "www.example.com"),
                ("(request-target)", "get /inbox"),
            ],
        );
        let headers = headers(&[
            ("date", stale),
            ("host", "www.example.com"),
            ("signature", signature.as_str()),
        ]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason, VerificationFailure::DateOutOfWindow);
    }

    #[tokio::test]
    async fn non_ascii_date_is_invalid() {
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[("date", DATE), ("(request-target)", "get /inbox")],
        );
        let mut headers = headers(&[("signature", signature.as_str())]);
        headers.insert(
            http::header::DATE,
            HeaderValue::from_bytes(b"Wed, 20 Dec 2023 10:00:00 GMT\xA0").unwrap(),
        );

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(
            reason,
            VerificationFailure::InvalidDate("not valid ASCII".to_string())
        );
    }

    #[tokio::test]
    async fn covered_header_with_non_utf8_bytes_is_verified_exactly() {
        let name: &[u8] = b"caf\xE9";
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[
                ("date", DATE.as_bytes()),
                ("x-name", name),
                ("(request-target)", b"get /inbox".as_slice()),
            ],
        );
        let mut request = headers(&[("date", DATE), ("signature", signature.as_str())]);
        request.insert("x-name", HeaderValue::from_bytes(name).unwrap());

        let outcome = verify_with(&verifier(), Method::GET, "/inbox", &request, b"").await;
        assert!(outcome.is_verified());

        // A different byte that decodes to the same replacement character
        // must not verify.
        request.insert("x-name", HeaderValue::from_bytes(b"caf\xE8").unwrap());
        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &request, b"").await);
        assert!(matches!(reason, VerificationFailure::BadSignature { .. }));
    }

    #[tokio::test]
    async fn covered_header_missing_from_request() {
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[
                ("date", DATE),
                ("host", "www.example.com"),
                ("(request-target)", "get /inbox"),
                ("accept", "application/activity+json"),
            ],
        );
        let headers = headers(&[
            ("date", DATE),
            ("host", "www.example.com"),
            ("signature", signature.as_str()),
        ]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason, VerificationFailure::MissingSignedHeader("accept".to_string()));
    }

    #[tokio::test]
    async fn post_needs_signed_digest_and_matching_body() {
        let digest = format!("SHA-256={}", HELLO_DIGEST);
        let signature = signature_header(
            &bob_key(),
            BOB_KEY_ID,
            &[
                ("host", "www.example.com"),
                ("date", DATE),
                ("digest", digest.as_str()),
                ("(request-target)", "post /inbox"),
            ],
        );
        let headers = headers(&[
            ("host", "www.example.com"),
            ("date", DATE),
            ("digest", digest.as_str()),
            ("signature", signature.as_str()),
        ]);

        let ok = verify_with(&verifier(), Method::POST, "/inbox", &headers, b"Hello world").await;
        assert!(ok.is_verified());

        let tampered =
            verify_with(&verifier(), Method::POST, "/inbox", &headers, b"Hello world!").await;
        assert_eq!(
            failure(tampered),
            VerificationFailure::DigestMismatch {
                computed: HELLO_BANG_DIGEST.to_string(),
                given: HELLO_DIGEST.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn created_parameter_can_replace_date() {
        let created = now().timestamp().to_string();
        let header = signature_header(
            &alice_key(),
            ALICE_KEY_ID,
            &[("(request-target)", "get /inbox"), ("(created)", created.as_str())],
        );
        let header = format!("{},created={}", header, created);
        let headers = headers(&[("signature", header.as_str())]);

        let outcome = verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await;
        assert_eq!(outcome.actor_id(), Some(ALICE_ACTOR_ID));
    }

    #[tokio::test]
    async fn resolver_failure_is_key_unreachable_and_not_retried() {
        let mut resolver = MockKeyResolver::new();
        resolver
            .expect_resolve()
            .withf(|key_id| key_id == BOB_KEY_ID)
            .times(1)
            .returning(|_| Err(KeyResolveError::Unreachable("connection refused".to_string())));
        let verifier = SignatureVerifier::new(Arc::new(resolver), VerificationPolicy::default());

        let reason = failure(
            verify_with(
                &verifier,
                Method::GET,
                "/activitypub/success?foo=42",
                &signed_get("get /activitypub/success"),
                b"",
            )
            .await,
        );
        assert_eq!(
            reason.to_string(),
            "Unable to fetch key JSON at https://remote.domain/users/bob#main-key"
        );
    }

    #[tokio::test]
    async fn garbage_signature_header_is_invalid() {
        let headers = headers(&[("date", DATE), ("signature", "this is not a signature")]);
        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason.kind(), "invalid_signature_header");
    }

    #[tokio::test]
    async fn message_signature_is_verified() {
        let (input, signature) = sign_message(
            &[
                ("@method", "GET"),
                ("@target-uri", "https://www.example.com/inbox?page=1"),
            ],
            "",
        );
        let headers = message_headers(&input, &signature, &[]);

        let outcome =
            verify_with(&verifier(), Method::GET, "/inbox?page=1", &headers, b"").await;
        assert_eq!(
            outcome,
            VerificationOutcome::Verified {
                actor_id: ALICE_ACTOR_ID.to_string(),
                key_id: ALICE_KEY_ID.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn message_signature_has_no_query_fallback() {
        let (input, signature) = sign_message(
            &[("@method", "GET"), ("@target-uri", "https://www.example.com/inbox")],
            "",
        );
        let headers = message_headers(&input, &signature, &[]);

        let reason = failure(
            verify_with(&verifier(), Method::GET, "/inbox?page=1", &headers, b"").await,
        );
        assert!(matches!(reason, VerificationFailure::BadSignature { .. }));
    }

    #[tokio::test]
    async fn message_signature_must_cover_target_uri() {
        let (input, signature) = sign_message(&[("@method", "GET")], "");
        let headers = message_headers(&input, &signature, &[]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(
            reason,
            VerificationFailure::InvalidSignatureHeader(
                "Signed components must include: @target-uri".to_string()
            )
        );
    }

    #[tokio::test]
    async fn message_signature_binds_content_digest() {
        let content_digest = format!("sha-256=:{}:", HELLO_DIGEST);
        let (input, signature) = sign_message(
            &[
                ("@method", "POST"),
                ("@target-uri", "https://www.example.com/inbox"),
                ("content-digest", content_digest.as_str()),
            ],
            "",
        );
        let headers = message_headers(
            &input,
            &signature,
            &[("content-digest", content_digest.as_str())],
        );

        let ok = verify_with(&verifier(), Method::POST, "/inbox", &headers, b"Hello world").await;
        assert!(ok.is_verified());

        let tampered =
            verify_with(&verifier(), Method::POST, "/inbox", &headers, b"Hello world!").await;
        assert_eq!(
            failure(tampered),
            VerificationFailure::DigestMismatch {
                computed: HELLO_BANG_DIGEST.to_string(),
                given: HELLO_DIGEST.to_string(),
            }
        );
    }

    #[tokio::test]
    async fn unsigned_content_digest_fails_before_key_fetch() {
        let mut resolver = MockKeyResolver::new();
        resolver.expect_resolve().never();
        let verifier = SignatureVerifier::new(Arc::new(resolver), VerificationPolicy::default());

        let content_digest = format!("sha-256=:{}:", HELLO_DIGEST);
        let (input, signature) = sign_message(
            &[("@method", "POST"), ("@target-uri", "https://www.example.com/inbox")],
            "",
        );
        let headers = message_headers(
            &input,
            &signature,
            &[("content-digest", content_digest.as_str())],
        );

        let outcome =
            verify_with(&verifier, Method::POST, "/inbox", &headers, b"Hello world").await;
        let reason = failure(outcome);
        assert_eq!(
            reason.to_string(),
            "The Content-Digest header must be signed when doing a POST request"
        );
    }

    #[tokio::test]
    async fn unparseable_content_digest_is_a_bad_request() {
        let content_digest = format!("SHA-256=:{}:", HELLO_DIGEST);
        let (input, signature) = sign_message(
            &[
                ("@method", "POST"),
                ("@target-uri", "https://www.example.com/inbox"),
                ("content-digest", content_digest.as_str()),
            ],
            "",
        );
        let headers = message_headers(
            &input,
            &signature,
            &[("content-digest", content_digest.as_str())],
        );

        let outcome =
            verify_with(&verifier(), Method::POST, "/inbox", &headers, b"Hello world").await;
        let reason = failure(outcome);
        assert!(reason.is_bad_request());
        assert_eq!(reason.kind(), "malformed_digest");
    }

    #[tokio::test]
    async fn expired_message_signature_is_out_of_window() {
        let expires = format!(";expires={}", now().timestamp() - 10);
        let (input, signature) = sign_message(
            &[("@method", "GET"), ("@target-uri", "https://www.example.com/inbox")],
            &expires,
        );
        let headers = message_headers(&input, &signature, &[]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason, VerificationFailure::DateOutOfWindow);
    }

    #[tokio::test]
    async fn declared_algorithm_must_match_the_key() {
        let (input, signature) = sign_message(
            &[("@method", "GET"), ("@target-uri", "https://www.example.com/inbox")],
            ";alg=\"rsa-v1_5-sha256\"",
        );
        let headers = message_headers(&input, &signature, &[]);

        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert!(matches!(reason, VerificationFailure::BadSignature { .. }));
    }

    #[tokio::test]
    async fn garbage_signature_input_is_invalid() {
        let headers = message_headers("sig1=(((", "sig1=:aGVsbG8=:", &[]);
        let reason = failure(verify_with(&verifier(), Method::GET, "/inbox", &headers, b"").await);
        assert_eq!(reason.kind(), "invalid_signature_header");
    }

    #[test]
    fn policy_rejects_windows_that_overflow() {
        for window_seconds in [10_000_000_000_000_000, u64::MAX] {
            let config = SignatureConfig {
                window_seconds,
                ..SignatureConfig::default()
            };
            assert!(VerificationPolicy::try_from(&config).is_err());
        }
    }

    #[test]
    fn policy_follows_config() {
        let config = SignatureConfig {
            window_seconds: 300,
            query_fallback: false,
            ..SignatureConfig::default()
        };
        let policy = VerificationPolicy::try_from(&config).unwrap();

        assert_eq!(policy.window, Duration::seconds(300));
        assert!(!policy.query_fallback);
        assert_eq!(policy.target_scheme, "https");
    }
}
