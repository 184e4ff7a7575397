use crate::error::ProviderError;
use crate::types::{DashboardEmbedConfig, ReportEmbedConfig, TileEmbedConfig};
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

pub type ProviderResult<T> = std::result::Result<T, ProviderError>;

/// Issues embed tokens for workspace content.
///
/// Implementations perform the authenticated remote calls; they own any
/// timeout or retry policy.
#[async_trait]
pub trait EmbedTokenProvider: Send + Sync + 'static {
    /// Provider name (used in tracing).
    fn name(&self) -> &str;

    async fn fetch_report_embed_config(
        &self,
        workspace_id: Uuid,
        report_id: Uuid,
    ) -> ProviderResult<ReportEmbedConfig>;

    async fn fetch_dashboard_embed_config(
        &self,
        workspace_id: Uuid,
    ) -> ProviderResult<DashboardEmbedConfig>;

    async fn fetch_tile_embed_config(&self, workspace_id: Uuid) -> ProviderResult<TileEmbedConfig>;
}

#[async_trait]
impl<P: EmbedTokenProvider + ?Sized> EmbedTokenProvider for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn fetch_report_embed_config(
        &self,
        workspace_id: Uuid,
        report_id: Uuid,
    ) -> ProviderResult<ReportEmbedConfig> {
        (**self).fetch_report_embed_config(workspace_id, report_id).await
    }

    async fn fetch_dashboard_embed_config(
        &self,
        workspace_id: Uuid,
    ) -> ProviderResult<DashboardEmbedConfig> {
        (**self).fetch_dashboard_embed_config(workspace_id).await
    }

    async fn fetch_tile_embed_config(&self, workspace_id: Uuid) -> ProviderResult<TileEmbedConfig> {
        (**self).fetch_tile_embed_config(workspace_id).await
    }
}
