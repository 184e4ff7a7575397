use crate::config::ProviderConfig;
use async_trait::async_trait;
use pbi_embed_core::{
    DashboardEmbedConfig, EmbedTokenProvider, ProviderError, ProviderResult, ReportEmbedConfig,
    TileEmbedConfig,
};
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use tracing::debug;
use uuid::Uuid;

/// Correlation headers checked, in order, on failed responses.
const REQUEST_ID_HEADERS: [&str; 2] = ["RequestId", "x-ms-request-id"];

/// Talks to an embed token provider service over HTTP.
pub struct HttpEmbedTokenProvider {
    client: reqwest::Client,
    base_url: reqwest::Url,
    token: Option<String>,
}

impl HttpEmbedTokenProvider {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("pbi-embed/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.clone(),
            token: config.token.clone(),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> ProviderResult<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| ProviderError::generic(format!("Invalid provider path '{}': {}", path, e)))?;

        debug!("GET {}", url);
        let mut request = self.client.get(url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::generic(format!("Embed token provider unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let request_id = request_id(response.headers());
            let body = match response.text().await {
                Ok(body) => body,
                Err(e) => {
                    debug!("Failed to read error body from embed token provider: {}", e);
                    String::new()
                }
            };
            return Err(ProviderError::Api {
                status,
                body,
                request_id,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::generic(format!("Invalid embed token provider response: {}", e)))
    }
}

fn request_id(headers: &HeaderMap) -> Option<String> {
    REQUEST_ID_HEADERS
        .iter()
        .filter_map(|name| headers.get(*name))
        .find_map(|value| value.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl EmbedTokenProvider for HttpEmbedTokenProvider {
    fn name(&self) -> &str {
        "http-provider"
    }

    async fn fetch_report_embed_config(
        &self,
        workspace_id: Uuid,
        report_id: Uuid,
    ) -> ProviderResult<ReportEmbedConfig> {
        self.get_json(&format!(
            "workspaces/{}/reports/{}/embed",
            workspace_id, report_id
        ))
        .await
    }

    async fn fetch_dashboard_embed_config(
        &self,
        workspace_id: Uuid,
    ) -> ProviderResult<DashboardEmbedConfig> {
        self.get_json(&format!("workspaces/{}/dashboards/embed", workspace_id))
            .await
    }

    async fn fetch_tile_embed_config(&self, workspace_id: Uuid) -> ProviderResult<TileEmbedConfig> {
        self.get_json(&format!("workspaces/{}/tiles/embed", workspace_id))
            .await
    }
}
