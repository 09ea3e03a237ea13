//! Common test utilities for E2E tests
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    middleware,
    routing::get,
};
use chrono::{DateTime, TimeZone, Utc};
use fedsig::{
    AppState,
    api::{require_signature, signature_status},
    config::AppConfig,
    federation::{KeyResolver, StaticKeyResolver},
    signature::{FixedClock, PrivateKey},
};
use tokio::net::TcpListener;
use tower::ServiceExt;

pub const ACTOR_KEY_PEM: &str = include_str!("../fixtures/remote_actor_key.pem");
pub const BOB_KEY_ID: &str = "https://remote.domain/users/bob#main-key";
pub const BOB_ACTOR_ID: &str = "https://remote.domain/users/bob";
pub const ALICE_KEY_ID: &str = "https://remote.domain/users/alice#main-key";

pub const HOST: &str = "www.example.com";
pub const DATE: &str = "Wed, 20 Dec 2023 10:00:00 GMT";

/// The instant recorded requests were signed at
pub fn signing_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 12, 20, 10, 0, 0).unwrap()
}

pub fn actor_key() -> PrivateKey {
    PrivateKey::from_pem(ACTOR_KEY_PEM).expect("fixture key must parse")
}

/// Resolver knowing only bob's key
pub fn bob_resolver() -> StaticKeyResolver {
    StaticKeyResolver::new().with_key(BOB_KEY_ID, BOB_ACTOR_ID, actor_key().public_key())
}

/// Configuration used by tests: defaults with failure reasons exposed
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.signature.expose_failure_reason = true;
    config
}

/// In-process application with a pinned clock
pub struct TestApp {
    pub state: AppState,
    pub router: Router,
}

impl TestApp {
    /// Diagnostic routes behind signature verification
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let state = state_with(config, Arc::new(bob_resolver()));
        let router = fedsig::with_signature_verification(diagnostic_routes(&state), state.clone());
        Self { state, router }
    }

    /// The production router with test state
    pub fn full() -> Self {
        let state = state_with(test_config(), Arc::new(bob_resolver()));
        let router = fedsig::build_router(state.clone());
        Self { state, router }
    }

    /// Send a request and decode the JSON body (Null when empty or not JSON)
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    /// Send a request and return the raw body text
    pub async fn send_text(&self, request: Request<Body>) -> (StatusCode, String) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }
}

pub fn state_with(config: AppConfig, resolver: Arc<dyn KeyResolver>) -> AppState {
    AppState::with_resolver(config, resolver, Arc::new(FixedClock(signing_time())))
        .expect("valid test config")
}

/// Routes mirroring a federated server's signature test endpoints
fn diagnostic_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/activitypub/success",
            get(signature_status).post(signature_status),
        )
        .route(
            "/activitypub/alternative-path",
            get(signature_status).post(signature_status),
        )
        .route(
            "/activitypub/signature_required",
            get(signature_status)
                .post(signature_status)
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    require_signature,
                )),
        )
}

/// Build a request carrying the given headers
pub fn request(method: &str, uri: &str, headers: &[(&str, &str)], body: &str) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    for (name, value) in headers {
        builder = builder.header(*name, *value);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

/// Test server bound to a random local port
pub struct TestServer {
    pub addr: String,
    pub state: AppState,
    pub client: reqwest::Client,
}

impl TestServer {
    /// Start the production router using the system clock
    pub async fn new() -> Self {
        let state = AppState::with_resolver(
            test_config(),
            Arc::new(bob_resolver()),
            Arc::new(fedsig::signature::SystemClock),
        )
        .expect("valid test config");

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let addr_str = format!("http://{}", addr);

        let app = fedsig::build_router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        Self {
            addr: addr_str,
            state,
            client,
        }
    }

    /// Get base URL for requests
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.addr, path)
    }
}
