//! fedsig binary entry point

use fedsig::{AppState, config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Application entry point
///
/// # Setup
/// 1. Load configuration from file and environment
/// 2. Initialize tracing/logging
/// 3. Initialize AppState
/// 4. Build Axum router
/// 5. Start background tasks (key cache pruning)
/// 6. Start HTTP server
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration
    let config = config::AppConfig::load()?;

    // 2. Initialize tracing/logging
    let default_filter = format!("fedsig={},tower_http=debug", config.logging.level);
    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| default_filter.clone().into()),
            )
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }

    tracing::info!("Starting fedsig...");
    tracing::info!(
        window_seconds = config.signature.window_seconds,
        required_headers = ?config.signature.required_headers,
        query_fallback = config.signature.query_fallback,
        "Configuration loaded"
    );

    fedsig::metrics::init_metrics();

    // 3. Initialize application state
    let state = AppState::new(config.clone())?;

    // 4. Build Axum router
    let app = fedsig::build_router(state.clone());

    // 5. Start background tasks
    spawn_key_cache_prune_task(state.clone());
    spawn_uptime_task();

    // 6. Start HTTP server
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

/// Spawn background key cache pruning task
fn spawn_key_cache_prune_task(state: AppState) {
    let Some(cache) = state.key_cache.clone() else {
        tracing::debug!("No key cache configured; skipping prune task");
        return;
    };

    tokio::spawn(async move {
        let interval_secs = state.config.federation.key_cache_ttl_seconds.max(1);
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(interval_secs));

        // Consume the immediate first tick; the cache starts empty.
        interval.tick().await;

        loop {
            interval.tick().await;
            let removed = cache.prune_expired().await;
            tracing::debug!(removed, "Key cache pruned");
        }
    });

    tracing::info!("Key cache prune task spawned");
}

/// Spawn background uptime gauge task
fn spawn_uptime_task() {
    let started = std::time::Instant::now();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(15));
        loop {
            interval.tick().await;
            fedsig::metrics::APP_UPTIME_SECONDS.set(started.elapsed().as_secs_f64());
        }
    });
}
