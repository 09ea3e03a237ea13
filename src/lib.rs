//! fedsig - HTTP Signature verification for federated (ActivityPub) requests
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      API Layer (Axum)                        │
//! │  - verify_signatures middleware                             │
//! │  - SignedActor / SignatureOutcome extractors                │
//! │  - /inbox, /signature, /metrics                             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Signature Core                            │
//! │  - header parsing, signing string, digest, freshness        │
//! │  - RSA / Ed25519 verification                               │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Key Resolution                             │
//! │  - known actors (config)                                    │
//! │  - TTL cache                                                │
//! │  - HTTP fetch of actor documents                            │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - `api`: HTTP middleware, extractors and handlers
//! - `signature`: Signature verification and signing
//! - `federation`: Key resolvers
//! - `config`: Configuration management
//! - `error`: Error types

pub mod api;
pub mod config;
pub mod error;
pub mod federation;
pub mod metrics;
pub mod signature;

use std::sync::Arc;
use std::time::Duration;

use federation::{CachingKeyResolver, HttpKeyResolver, KeyResolver, StaticKeyResolver};
use signature::{Clock, SignatureVerifier, SystemClock, VerificationPolicy};

/// Application state shared across all handlers
///
/// This struct is cloned for each request and contains
/// shared resources like the verifier and key cache.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<config::AppConfig>,

    /// Signature verifier
    pub verifier: Arc<SignatureVerifier>,

    /// Time source for freshness checks
    pub clock: Arc<dyn Clock>,

    /// Remote key cache, when keys are fetched over HTTP
    pub key_cache: Option<Arc<CachingKeyResolver>>,
}

impl AppState {
    /// Initialize application state
    ///
    /// # Steps
    /// 1. Build the HTTP key resolver
    /// 2. Wrap it in the key cache
    /// 3. Put configured known actors in front
    ///
    /// # Errors
    /// Returns error if any initialization step fails
    pub fn new(config: config::AppConfig) -> Result<Self, error::AppError> {
        tracing::info!("Initializing application state...");

        let http_resolver = HttpKeyResolver::from_config(&config.federation)?;
        let key_cache = Arc::new(CachingKeyResolver::new(
            Arc::new(http_resolver),
            Some(Duration::from_secs(config.federation.key_cache_ttl_seconds)),
        ));

        let known = StaticKeyResolver::from_config(&config.federation.known_actors)?
            .with_fallback(key_cache.clone());
        tracing::info!(known_actors = known.len(), "Key resolvers initialized");

        let mut state = Self::with_resolver(config, Arc::new(known), Arc::new(SystemClock))?;
        state.key_cache = Some(key_cache);

        tracing::info!("Application state initialized successfully");
        Ok(state)
    }

    /// Build state around an explicit resolver and clock
    ///
    /// # Errors
    /// Returns error if the signature policy cannot be built from `config`
    pub fn with_resolver(
        config: config::AppConfig,
        resolver: Arc<dyn KeyResolver>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, error::AppError> {
        let policy = VerificationPolicy::try_from(&config.signature)?;
        Ok(Self {
            config: Arc::new(config),
            verifier: Arc::new(SignatureVerifier::new(resolver, policy)),
            clock,
            key_cache: None,
        })
    }
}

/// Build the Axum router with all routes.
///
/// This is shared by the binary and integration tests to keep route
/// composition consistent across environments.
pub fn build_router(state: AppState) -> axum::Router {
    let routes = axum::Router::new()
        .route("/health", axum::routing::get(health_check))
        .merge(api::activitypub_router())
        .fallback(not_found);

    with_signature_verification(routes, state.clone()).merge(api::metrics_router(state))
}

/// Run signature verification in front of `routes` and attach state.
pub fn with_signature_verification(
    routes: axum::Router<AppState>,
    state: AppState,
) -> axum::Router {
    use axum::middleware;
    use tower_http::trace::TraceLayer;

    routes
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api::verify_signatures,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}

async fn not_found() -> error::AppError {
    error::AppError::NotFound
}
