//! API layer
//!
//! HTTP handlers for:
//! - ActivityPub (for federation)
//! - Signature verification middleware and extractors
//! - Metrics (Prometheus)

mod activitypub;
pub mod metrics;
pub mod middleware;

pub use activitypub::{SignatureStatus, activitypub_router, signature_status};
pub use metrics::metrics_router;
pub use middleware::{SignatureOutcome, SignedActor, require_signature, verify_signatures};
