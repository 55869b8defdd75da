mod config;
mod janitor;
mod middleware;
mod routes;
mod store;
mod upstream;

use std::net::SocketAddr;

use anyhow::Context;
use axum::routing::{get, MethodRouter};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::config::ProxyConfig;
use crate::middleware::rate_limit::{limit_by_ip, RateLimiter};
use crate::store::ThoughtsStore;
use crate::upstream::{AnthropicConsoleClient, OpenRouterClient};

/// Shared application state passed to all route handlers via Axum's State extractor.
#[derive(Clone)]
pub struct AppState {
    pub anthropic: AnthropicConsoleClient,
    pub openrouter: OpenRouterClient,
    pub thoughts: ThoughtsStore,
    pub rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            anthropic: AnthropicConsoleClient::new(config),
            openrouter: OpenRouterClient::new(config),
            thoughts: ThoughtsStore::new(config),
            rate_limiter: RateLimiter::new(
                config.max_requests_per_ip_per_minute,
                config.trust_forwarded_for,
            ),
        }
    }
}

fn read_only(route: MethodRouter<AppState>) -> MethodRouter<AppState> {
    route.fallback(routes::method_not_allowed)
}

fn router(state: AppState) -> Router {
    // Browser dashboards on any origin read from here
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", read_only(get(routes::health::health)))
        .route("/api/anthropic-usage", read_only(get(routes::usage::anthropic_usage)))
        .route("/api/openrouter-usage", read_only(get(routes::usage::openrouter_usage)))
        .route("/api/thoughts", read_only(get(routes::thoughts::get_thoughts)))
        .layer(axum::middleware::from_fn_with_state(state.clone(), limit_by_ip))
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (ignored in production where env vars are set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = ProxyConfig::from_env()?;
    info!("Configuration loaded (port={})", config.port);

    let state = AppState::new(&config);

    let janitor_limiter = state.rate_limiter.clone();
    let janitor_interval = config.janitor_interval_secs;
    tokio::spawn(async move {
        janitor::run_janitor(janitor_limiter, janitor_interval).await;
    });

    let app = router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("Vega Proxy v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);
    info!("Routes:");
    info!("  GET  /api/health");
    info!("  GET  /api/anthropic-usage?starting_on=&ending_before=");
    info!("  GET  /api/openrouter-usage");
    info!("  GET  /api/thoughts");
    info!(
        "Rate limit: {} requests/minute per IP",
        config.max_requests_per_ip_per_minute
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
