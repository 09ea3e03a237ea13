//! Prometheus metrics registry and instruments.
//!
//! This module is framework-agnostic and can be used from any layer.

use lazy_static::lazy_static;
use prometheus::{Gauge, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};

lazy_static! {
    /// Global Prometheus registry
    pub static ref REGISTRY: Registry = Registry::new();

    // HTTP Metrics
    pub static ref HTTP_REQUESTS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedsig_http_requests_total", "Total number of HTTP requests"),
        &["method", "endpoint", "status"]
    ).expect("metric can be created");
    pub static ref HTTP_REQUEST_DURATION_SECONDS: prometheus::HistogramVec = prometheus::HistogramVec::new(
        HistogramOpts::new(
            "fedsig_http_request_duration_seconds",
            "HTTP request duration in seconds"
        ).buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
        &["method", "endpoint"]
    ).expect("metric can be created");

    // Signature Metrics
    pub static ref SIGNATURE_VERIFICATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedsig_signature_verifications_total", "Total number of signature verifications by outcome"),
        &["outcome"]
    ).expect("metric can be created");
    pub static ref SIGNATURE_VERIFICATION_DURATION_SECONDS: prometheus::Histogram = prometheus::Histogram::with_opts(
        HistogramOpts::new(
            "fedsig_signature_verification_duration_seconds",
            "Signature verification duration in seconds, key resolution included"
        ).buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).expect("metric can be created");
    pub static ref SIGNATURE_QUERY_FALLBACK_TOTAL: IntCounter = IntCounter::new(
        "fedsig_signature_query_fallback_total",
        "Signatures that only verified with a path-only request target"
    ).expect("metric can be created");

    // Federation Metrics
    pub static ref KEY_FETCHES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedsig_key_fetches_total", "Total number of remote key fetches"),
        &["status"]
    ).expect("metric can be created");

    // Cache Metrics
    pub static ref KEY_CACHE_HITS_TOTAL: IntCounter = IntCounter::new(
        "fedsig_key_cache_hits_total",
        "Total number of key cache hits"
    ).expect("metric can be created");
    pub static ref KEY_CACHE_MISSES_TOTAL: IntCounter = IntCounter::new(
        "fedsig_key_cache_misses_total",
        "Total number of key cache misses"
    ).expect("metric can be created");
    pub static ref KEY_CACHE_ENTRIES: IntGauge = IntGauge::new(
        "fedsig_key_cache_entries",
        "Current number of cached keys"
    ).expect("metric can be created");

    // Application Metrics
    pub static ref APP_UPTIME_SECONDS: Gauge = Gauge::new(
        "fedsig_app_uptime_seconds",
        "Application uptime in seconds"
    ).expect("metric can be created");

    // Error Metrics
    pub static ref ERRORS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("fedsig_errors_total", "Total number of errors"),
        &["error_type", "endpoint"]
    ).expect("metric can be created");
}

/// Initialize metrics registry.
pub fn init_metrics() {
    REGISTRY
        .register(Box::new(HTTP_REQUESTS_TOTAL.clone()))
        .expect("HTTP_REQUESTS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()))
        .expect("HTTP_REQUEST_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(SIGNATURE_VERIFICATIONS_TOTAL.clone()))
        .expect("SIGNATURE_VERIFICATIONS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(SIGNATURE_VERIFICATION_DURATION_SECONDS.clone()))
        .expect("SIGNATURE_VERIFICATION_DURATION_SECONDS can be registered");
    REGISTRY
        .register(Box::new(SIGNATURE_QUERY_FALLBACK_TOTAL.clone()))
        .expect("SIGNATURE_QUERY_FALLBACK_TOTAL can be registered");
    REGISTRY
        .register(Box::new(KEY_FETCHES_TOTAL.clone()))
        .expect("KEY_FETCHES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(KEY_CACHE_HITS_TOTAL.clone()))
        .expect("KEY_CACHE_HITS_TOTAL can be registered");
    REGISTRY
        .register(Box::new(KEY_CACHE_MISSES_TOTAL.clone()))
        .expect("KEY_CACHE_MISSES_TOTAL can be registered");
    REGISTRY
        .register(Box::new(KEY_CACHE_ENTRIES.clone()))
        .expect("KEY_CACHE_ENTRIES can be registered");
    REGISTRY
        .register(Box::new(APP_UPTIME_SECONDS.clone()))
        .expect("APP_UPTIME_SECONDS can be registered");
    REGISTRY
        .register(Box::new(ERRORS_TOTAL.clone()))
        .expect("ERRORS_TOTAL can be registered");

    tracing::info!("Metrics registry initialized");
}
