use anyhow::Context;
use clap::Parser;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

const DEFAULT_HTTP_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_PROVIDER_URL: &str = "http://localhost:8700/";
const DEFAULT_PROVIDER_TIMEOUT_SECS: u64 = 30;
const DEFAULT_EXPIRY_MARGIN_SECS: i64 = 300;
const MAX_EXPIRY_MARGIN_SECS: i64 = 24 * 60 * 60;

/// Command-line / environment settings. Anything left unset falls back to
/// the TOML file, then to built-in defaults.
#[derive(Parser, Debug, Clone, Default)]
#[command(name = "pbi-embed")]
#[command(version, about = "Power BI embed token service")]
pub struct Config {
    /// Path to pbi-embed.toml
    #[arg(long, env = "PBI_EMBED_CONFIG")]
    pub config: Option<PathBuf>,

    /// HTTP listen address
    #[arg(long, env = "PBI_EMBED_HTTP_ADDR")]
    pub http_addr: Option<SocketAddr>,

    /// Power BI workspace (group) id
    #[arg(long, env = "PBI_EMBED_WORKSPACE_ID")]
    pub workspace_id: Option<String>,

    /// Report embedded when a request names none
    #[arg(long, env = "PBI_EMBED_REPORT_ID")]
    pub report_id: Option<String>,

    /// Base URL of the embed token provider
    #[arg(long, env = "PBI_EMBED_PROVIDER_URL")]
    pub provider_url: Option<String>,

    /// Bearer credential sent to the provider
    #[arg(long, env = "PBI_EMBED_PROVIDER_TOKEN", hide_env_values = true)]
    pub provider_token: Option<String>,

    /// Provider request timeout in seconds
    #[arg(long, env = "PBI_EMBED_PROVIDER_TIMEOUT")]
    pub provider_timeout: Option<u64>,

    /// Seconds of validity a cached report token must have left to be served
    #[arg(long, env = "PBI_EMBED_EXPIRY_MARGIN")]
    pub expiry_margin: Option<i64>,

    /// Require `Authorization: Bearer <token>` on embed routes
    #[arg(long, env = "PBI_EMBED_AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: Option<String>,
}

/// On-disk layout of pbi-embed.toml.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub embed: EmbedSection,
    pub provider: ProviderSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub http_addr: Option<SocketAddr>,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedSection {
    pub workspace_id: Option<String>,
    pub report_id: Option<String>,
    pub expiry_margin_secs: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProviderSection {
    pub url: Option<String>,
    pub token: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config file {}", path.display()))
    }
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: reqwest::Url,
    pub token: Option<String>,
    pub timeout: Duration,
}

/// Fully resolved settings the server runs with.
///
/// `workspace_id` and `report_id` stay raw: their validity is reported per
/// request rather than refusing to start.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub http_addr: SocketAddr,
    pub workspace_id: Option<String>,
    pub report_id: Option<String>,
    pub expiry_margin: chrono::Duration,
    pub auth_token: Option<String>,
    pub provider: ProviderConfig,
}

impl Config {
    /// Merge CLI/env over the optional config file over defaults.
    pub fn resolve(self) -> anyhow::Result<ServiceConfig> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        self.merge(file)
    }

    pub fn merge(self, file: FileConfig) -> anyhow::Result<ServiceConfig> {
        let http_addr = match self.http_addr.or(file.server.http_addr) {
            Some(addr) => addr,
            None => DEFAULT_HTTP_ADDR.parse()?,
        };

        let provider_url = self
            .provider_url
            .or(file.provider.url)
            .unwrap_or_else(|| DEFAULT_PROVIDER_URL.to_string());
        let base_url = parse_base_url(&provider_url)?;

        let timeout_secs = self
            .provider_timeout
            .or(file.provider.timeout_secs)
            .unwrap_or(DEFAULT_PROVIDER_TIMEOUT_SECS);
        if timeout_secs == 0 {
            anyhow::bail!("Provider timeout must be at least 1 second");
        }

        let margin_secs = self
            .expiry_margin
            .or(file.embed.expiry_margin_secs)
            .unwrap_or(DEFAULT_EXPIRY_MARGIN_SECS);
        if !(0..=MAX_EXPIRY_MARGIN_SECS).contains(&margin_secs) {
            anyhow::bail!(
                "Expiry margin must be between 0 and {}s (got {}s)",
                MAX_EXPIRY_MARGIN_SECS,
                margin_secs
            );
        }
        let expiry_margin = chrono::Duration::try_seconds(margin_secs)
            .with_context(|| format!("Expiry margin {}s is out of range", margin_secs))?;

        Ok(ServiceConfig {
            http_addr,
            workspace_id: self.workspace_id.or(file.embed.workspace_id),
            report_id: self.report_id.or(file.embed.report_id),
            expiry_margin,
            auth_token: non_empty(self.auth_token.or(file.server.auth_token)),
            provider: ProviderConfig {
                base_url,
                token: non_empty(self.provider_token.or(file.provider.token)),
                timeout: Duration::from_secs(timeout_secs),
            },
        })
    }
}

/// Parse the provider URL, forcing a trailing slash so relative joins keep
/// the full base path.
fn parse_base_url(raw: &str) -> anyhow::Result<reqwest::Url> {
    let mut url = reqwest::Url::parse(raw.trim())
        .with_context(|| format!("Invalid provider URL '{}'", raw))?;
    if !matches!(url.scheme(), "http" | "https") {
        anyhow::bail!("Provider URL must use http or https (got '{}')", raw);
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
