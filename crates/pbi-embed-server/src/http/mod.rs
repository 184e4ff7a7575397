pub mod auth;
pub mod metrics;
mod routes;

pub use metrics::EmbedMetrics;
pub use routes::create_router;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use pbi_embed_core::{EmbedError, EmbedService, EmbedTokenProvider};
use std::sync::Arc;

/// Embed service as shared by handlers. The provider is erased so the
/// router does not need to be generic.
pub type HttpEmbedService = EmbedService<Arc<dyn EmbedTokenProvider>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<HttpEmbedService>,
    pub metrics: Arc<EmbedMetrics>,
    pub start_time: std::time::Instant,
}

/// Handler error carrying an embed failure to the client as `{ errorMessage }`.
pub struct AppError(EmbedError);

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EmbedError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
            EmbedError::InvalidReportId(_) => StatusCode::BAD_REQUEST,
            EmbedError::Provider(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.0.to_payload())).into_response()
    }
}

impl From<EmbedError> for AppError {
    fn from(err: EmbedError) -> Self {
        Self(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// Wrap `router` in the bearer-token guard. A `None` token leaves it open.
pub fn with_auth(router: axum::Router, token: Option<String>) -> axum::Router {
    router.layer(axum::middleware::from_fn(
        move |req: axum::extract::Request, next: axum::middleware::Next| {
            let tok = token.clone();
            async move { auth::check(req, next, tok).await }
        },
    ))
}
