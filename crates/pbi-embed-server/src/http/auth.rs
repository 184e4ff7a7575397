use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Json, Response},
};
use pbi_embed_core::ErrorPayload;

/// Paths reachable without a token.
const OPEN_PATHS: [&str; 2] = ["/health", "/metrics"];

/// Bearer token auth middleware. Skips `/health` and `/metrics`. Passes
/// everything through when no token is configured.
pub async fn check(req: Request, next: Next, token: Option<String>) -> Response {
    let expected = match token.as_deref() {
        Some(t) => t,
        None => return next.run(req).await,
    };

    if OPEN_PATHS.contains(&req.uri().path()) {
        return next.run(req).await;
    }

    match req.headers().get("authorization") {
        Some(value) => {
            let value = value.to_str().unwrap_or("");
            match value.strip_prefix("Bearer ") {
                Some(presented) if presented == expected => next.run(req).await,
                _ => (
                    StatusCode::UNAUTHORIZED,
                    Json(ErrorPayload::new("Invalid token")),
                )
                    .into_response(),
            }
        }
        None => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorPayload::new("Missing Authorization header")),
        )
            .into_response(),
    }
}
