use crate::config::ServiceConfig;
use crate::http::{self, AppState, EmbedMetrics};
use crate::provider::HttpEmbedTokenProvider;
use pbi_embed_core::{validate, CacheSlot, EmbedService, EmbedTokenProvider};
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(config: ServiceConfig) -> anyhow::Result<()> {
    info!("Starting pbi-embed v{}", env!("CARGO_PKG_VERSION"));
    info!("HTTP: {}", config.http_addr);
    info!("Provider: {}", config.provider.base_url);

    if config.auth_token.is_some() {
        info!("Bearer token auth: enabled");
    } else {
        warn!(
            "Auth disabled: embed tokens are served to anyone who can reach {}",
            config.http_addr
        );
    }

    let validated = validate(config.workspace_id.as_deref(), config.report_id.as_deref());
    match &validated.error {
        Some(err) => warn!("Configuration error, embed requests will fail: {}", err),
        None => info!(
            "Workspace {} (default report {})",
            validated.settings.workspace_id, validated.settings.default_report_id
        ),
    }

    let provider: Arc<dyn EmbedTokenProvider> =
        Arc::new(HttpEmbedTokenProvider::new(&config.provider)?);
    let cache_slot = Arc::new(CacheSlot::with_margin(config.expiry_margin));
    let service = Arc::new(EmbedService::new(provider, validated, cache_slot));

    let app_state = AppState {
        service,
        metrics: Arc::new(EmbedMetrics::new()),
        start_time: std::time::Instant::now(),
    };
    let app = http::with_auth(http::create_router(app_state), config.auth_token.clone());

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    info!("pbi-embed ready on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received, terminating...");
}
