use super::{AppResult, AppState};
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use pbi_embed_core::{
    DashboardEmbedConfig, EmbedError, ReportEmbedConfig, TileEmbedConfig,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tower_http::trace::TraceLayer;

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .route("/embed/report", get(embed_report))
        .route("/embed/dashboard", get(embed_dashboard))
        .route("/embed/tile", get(embed_tile))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IndexResponse {
    service: &'static str,
    version: &'static str,
}

async fn index() -> Json<IndexResponse> {
    Json(IndexResponse {
        service: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    healthy: bool,
    configured: bool,
    version: String,
    uptime_seconds: u64,
    cached_reports: usize,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let cached_reports = state
        .service
        .report_cache()
        .map(|cache| cache.len())
        .unwrap_or(0);

    Json(HealthResponse {
        healthy: true,
        configured: state.service.config_error().is_none(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        cached_reports,
    })
}

async fn metrics(State(state): State<AppState>) -> Response {
    state
        .metrics
        .uptime_seconds
        .set(state.start_time.elapsed().as_secs() as i64);
    if let Some(cache) = state.service.report_cache() {
        state.metrics.set_cache_stats(cache.stats());
    }

    match state.metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to encode metrics: {}", e),
        )
            .into_response(),
    }
}

#[derive(Deserialize)]
struct EmbedReportQuery {
    #[serde(rename = "reportId", alias = "report_id")]
    report_id: Option<String>,
}

async fn embed_report(
    State(state): State<AppState>,
    Query(query): Query<EmbedReportQuery>,
) -> AppResult<Json<ReportEmbedConfig>> {
    let started = Instant::now();
    let result = state.service.embed_report(query.report_id.as_deref()).await;
    record(&state, "report", &result, started);

    let config = result?;
    Ok(Json(ReportEmbedConfig::clone(&config)))
}

async fn embed_dashboard(State(state): State<AppState>) -> AppResult<Json<DashboardEmbedConfig>> {
    let started = Instant::now();
    let result = state.service.embed_dashboard().await;
    record(&state, "dashboard", &result, started);

    Ok(Json(result?))
}

async fn embed_tile(State(state): State<AppState>) -> AppResult<Json<TileEmbedConfig>> {
    let started = Instant::now();
    let result = state.service.embed_tile().await;
    record(&state, "tile", &result, started);

    Ok(Json(result?))
}

fn record<T>(state: &AppState, kind: &str, result: &Result<T, EmbedError>, started: Instant) {
    let outcome = match result {
        Ok(_) => "ok",
        Err(EmbedError::Config(_)) => "config_error",
        Err(EmbedError::InvalidReportId(_)) => "bad_request",
        Err(EmbedError::Provider(_)) => "provider_error",
    };
    state
        .metrics
        .observe(kind, outcome, started.elapsed().as_secs_f64());
}
