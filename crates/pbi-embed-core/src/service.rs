use crate::cache::{CacheSlot, EmbedConfigCache};
use crate::error::{EmbedError, Result};
use crate::provider::EmbedTokenProvider;
use crate::settings::{EmbedSettings, ValidatedSettings};
use crate::types::{DashboardEmbedConfig, ReportEmbedConfig, TileEmbedConfig};
use log::warn;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves embed parameters for the three embeddable content types.
///
/// Report configs go through the shared cache; dashboards and tiles are
/// fetched on every call.
pub struct EmbedService<P> {
    provider: P,
    settings: EmbedSettings,
    config_error: Option<String>,
    cache: Arc<CacheSlot>,
}

impl<P: EmbedTokenProvider> EmbedService<P> {
    pub fn new(provider: P, validated: ValidatedSettings, cache: Arc<CacheSlot>) -> Self {
        Self {
            provider,
            settings: validated.settings,
            config_error: validated.error,
            cache,
        }
    }

    pub fn config_error(&self) -> Option<&str> {
        self.config_error.as_deref()
    }

    /// The report cache, if a report request has created it yet.
    pub fn report_cache(&self) -> Option<Arc<EmbedConfigCache>> {
        self.cache.get()
    }

    /// Embed parameters for `report_id`, or for the configured default
    /// report when none (or a blank one) is given.
    pub async fn embed_report(&self, report_id: Option<&str>) -> Result<Arc<ReportEmbedConfig>> {
        self.check_config()?;

        let report_id = match report_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(raw) => {
                Uuid::parse_str(raw).map_err(|_| EmbedError::InvalidReportId(raw.to_string()))?
            }
            None => self.settings.default_report_id,
        };

        let workspace_id = self.settings.workspace_id;
        let key = report_id.to_string();
        let cache = self.cache.get_or_init();

        let result = cache
            .get_or_fetch(&key, |_| async move {
                self.provider
                    .fetch_report_embed_config(workspace_id, report_id)
                    .await
            })
            .await;

        result.map_err(|e| {
            warn!(
                "{} failed to embed report {}: {}",
                self.provider.name(),
                report_id,
                e
            );
            EmbedError::from(e)
        })
    }

    pub async fn embed_dashboard(&self) -> Result<DashboardEmbedConfig> {
        self.check_config()?;

        self.provider
            .fetch_dashboard_embed_config(self.settings.workspace_id)
            .await
            .map_err(|e| {
                warn!("{} failed to embed dashboard: {}", self.provider.name(), e);
                EmbedError::from(e)
            })
    }

    pub async fn embed_tile(&self) -> Result<TileEmbedConfig> {
        self.check_config()?;

        self.provider
            .fetch_tile_embed_config(self.settings.workspace_id)
            .await
            .map_err(|e| {
                warn!("{} failed to embed tile: {}", self.provider.name(), e);
                EmbedError::from(e)
            })
    }

    fn check_config(&self) -> Result<()> {
        match &self.config_error {
            Some(err) => Err(EmbedError::Config(err.clone())),
            None => Ok(()),
        }
    }
}
