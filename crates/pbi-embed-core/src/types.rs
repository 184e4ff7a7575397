use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Everything a browser needs to embed one report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReportEmbedConfig {
    /// String form of the report's UUID.
    pub report_id: String,

    /// Display name, when the provider returns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report_name: Option<String>,

    /// Opaque URL handed to the client-side embedding library.
    pub embed_url: String,

    /// Embed token. Treat as a secret.
    pub access_token: String,

    /// When `access_token` stops being accepted.
    pub token_expiration: DateTime<Utc>,
}

/// Embed parameters for the first dashboard in the workspace.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DashboardEmbedConfig {
    pub dashboard_id: String,
    pub embed_url: String,
    pub access_token: String,
    pub token_expiration: DateTime<Utc>,
}

/// Embed parameters for a single dashboard tile.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TileEmbedConfig {
    pub tile_id: String,
    pub dashboard_id: String,
    pub embed_url: String,
    pub access_token: String,
    pub token_expiration: DateTime<Utc>,
}

/// Uniform body returned for every failed embed operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    pub error_message: String,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error_message: message.into(),
        }
    }
}
