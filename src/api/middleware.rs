//! Signature middleware
//!
//! Verifies HTTP signatures on every request and exposes the outcome to
//! handlers. Routes that must be signed use `require_signature` or the
//! `SignedActor` extractor.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRef, FromRequestParts, State},
    http::{Request, request::Parts},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::config::SignatureConfig;
use crate::error::AppError;
use crate::signature::{InboundRequest, VerificationOutcome};

/// Middleware running signature verification on every request
///
/// Buffers the body (up to `server.max_body_bytes`) so the digest can be
/// checked, then hands the request on with the `VerificationOutcome` in its
/// extensions. Never rejects on its own.
///
/// # Usage
/// ```ignore
/// let app = Router::new()
///     .route("/inbox", post(inbox))
///     .layer(middleware::from_fn_with_state(state, verify_signatures));
/// ```
pub async fn verify_signatures(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let (mut parts, body) = request.into_parts();

    let bytes = axum::body::to_bytes(body, state.config.server.max_body_bytes)
        .await
        .map_err(|e| {
            tracing::debug!(error = %e, path = %parts.uri.path(), "Failed to buffer request body");
            AppError::PayloadTooLarge
        })?;

    let now = state.clock.now();
    let outcome = {
        let inbound = InboundRequest::new(&parts.method, &parts.uri, &parts.headers, &bytes);
        state.verifier.verify(&inbound, now).await
    };
    parts.extensions.insert(outcome);

    let request = Request::from_parts(parts, Body::from(bytes));
    Ok(next.run(request).await)
}

/// Middleware rejecting requests without a verified signature (401)
///
/// Must run inside `verify_signatures`.
pub async fn require_signature(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let outcome = outcome_from_extensions(request.extensions())?;
    if !outcome.is_verified() {
        return Err(rejection(&state.config.signature, outcome));
    }

    Ok(next.run(request).await)
}

fn outcome_from_extensions(
    extensions: &axum::http::Extensions,
) -> Result<&VerificationOutcome, AppError> {
    extensions.get::<VerificationOutcome>().ok_or_else(|| {
        AppError::Internal(anyhow::anyhow!(
            "signature verification middleware is not installed"
        ))
    })
}

/// Client-facing message for an outcome, honoring `expose_failure_reason`
pub fn public_failure_message(
    config: &SignatureConfig,
    outcome: &VerificationOutcome,
) -> Option<String> {
    match outcome {
        VerificationOutcome::Verified { .. } => None,
        VerificationOutcome::NotSigned => outcome.error_message(),
        VerificationOutcome::Failed { reason } if config.expose_failure_reason => {
            Some(reason.to_string())
        }
        VerificationOutcome::Failed { .. } => Some("Invalid signature".to_string()),
    }
}

/// Malformed body digests are the client's syntax error and always answered
/// with 400 and the parse message; everything else is a 401.
fn rejection(config: &SignatureConfig, outcome: &VerificationOutcome) -> AppError {
    if let Some(reason) = outcome.failure().filter(|reason| reason.is_bad_request()) {
        return AppError::Validation(reason.to_string());
    }

    let message =
        public_failure_message(config, outcome).unwrap_or_else(|| "Invalid signature".to_string());
    AppError::SignatureRequired(message)
}

/// Outcome of signature verification for the current request
///
/// For endpoints where a signature is optional.
///
/// # Usage
/// ```ignore
/// async fn handler(SignatureOutcome(outcome): SignatureOutcome) -> impl IntoResponse {
///     format!("signed: {}", outcome.is_signed())
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SignatureOutcome(pub VerificationOutcome);

#[async_trait]
impl<S> FromRequestParts<S> for SignatureOutcome
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        outcome_from_extensions(&parts.extensions).map(|outcome| SignatureOutcome(outcome.clone()))
    }
}

/// Actor that signed the current request
///
/// Rejects with 401 unless the signature verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedActor {
    pub actor_id: String,
    pub key_id: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for SignedActor
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let outcome = outcome_from_extensions(&parts.extensions)?;
        match outcome {
            VerificationOutcome::Verified { actor_id, key_id } => Ok(SignedActor {
                actor_id: actor_id.clone(),
                key_id: key_id.clone(),
            }),
            other => {
                let state = AppState::from_ref(state);
                Err(rejection(&state.config.signature, other))
            }
        }
    }
}
