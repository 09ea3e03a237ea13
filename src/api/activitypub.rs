//! ActivityPub endpoints
//!
//! Inbox delivery (signature required) and a signature diagnostic endpoint.

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::{Method, StatusCode},
    routing::{get, post},
};
use serde::Serialize;

use super::middleware::{SignatureOutcome, SignedActor, public_failure_message};
use crate::AppState;
use crate::error::AppError;
use crate::metrics::{HTTP_REQUEST_DURATION_SECONDS, HTTP_REQUESTS_TOTAL};

/// Create ActivityPub router
pub fn activitypub_router() -> Router<AppState> {
    Router::new()
        .route("/inbox", post(inbox))
        .route("/signature", get(signature_status).post(signature_status))
}

/// POST /inbox
///
/// Accepts an activity from a verified remote actor. The activity's `actor`
/// must be the signer.
async fn inbox(
    SignedActor { actor_id, key_id }: SignedActor,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let _timer = HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&["POST", "/inbox"])
        .start_timer();

    let activity: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| AppError::Validation(format!("Invalid JSON: {}", e)))?;

    let activity_actor = activity
        .get("actor")
        .and_then(|a| a.as_str())
        .ok_or_else(|| AppError::Validation("Missing actor field".to_string()))?;

    if activity_actor != actor_id {
        HTTP_REQUESTS_TOTAL
            .with_label_values(&["POST", "/inbox", "400"])
            .inc();
        return Err(AppError::Validation(
            "Signature keyId actor mismatch".to_string(),
        ));
    }

    let activity_type = activity
        .get("type")
        .and_then(|t| t.as_str())
        .unwrap_or("Unknown");
    tracing::info!(
        actor = %actor_id,
        key_id = %key_id,
        activity_type,
        "Accepted signed activity"
    );

    HTTP_REQUESTS_TOTAL
        .with_label_values(&["POST", "/inbox", "202"])
        .inc();
    Ok(StatusCode::ACCEPTED)
}

/// Signature diagnostic response
#[derive(Debug, Serialize)]
pub struct SignatureStatus {
    pub signed_request: bool,
    pub signature_actor_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// GET|POST /signature
///
/// Reports how the request's signature was judged. Always 200.
pub async fn signature_status(
    State(state): State<AppState>,
    method: Method,
    SignatureOutcome(outcome): SignatureOutcome,
) -> Json<SignatureStatus> {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), "/signature", "200"])
        .inc();

    Json(SignatureStatus {
        signed_request: outcome.is_signed(),
        signature_actor_id: outcome.actor_id().map(ToOwned::to_owned),
        error: public_failure_message(&state.config.signature, &outcome),
    })
}
