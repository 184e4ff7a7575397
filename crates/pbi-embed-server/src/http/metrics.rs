use pbi_embed_core::CacheStats;
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::metrics::histogram::Histogram;
use prometheus_client::registry::Registry;

// ── Label types ────────────────────────────────────────────────────────────────

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct EmbedLabel {
    pub kind: String,
    pub outcome: String,
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct KindLabel {
    pub kind: String,
}

// ── Metrics registry ───────────────────────────────────────────────────────────

pub struct EmbedMetrics {
    pub registry: Registry,

    // Requests by content kind × outcome (ok / config_error / bad_request / provider_error)
    pub embed_requests: Family<EmbedLabel, Counter>,
    pub embed_duration: Family<KindLabel, Histogram>,

    // Report cache gauges, copied from cache stats at scrape time
    pub cache_entries: Gauge,
    pub cache_hits: Gauge,
    pub cache_misses: Gauge,
    pub cache_fetch_failures: Gauge,

    // Uptime (set on each scrape)
    pub uptime_seconds: Gauge,
}

impl EmbedMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let embed_requests: Family<EmbedLabel, Counter> = Family::default();
        registry.register(
            "pbi_embed_requests",
            "Embed requests by content kind and outcome",
            embed_requests.clone(),
        );

        let embed_duration: Family<KindLabel, Histogram> = Family::new_with_constructor(|| {
            Histogram::new([0.005_f64, 0.05, 0.25, 1.0, 5.0].into_iter())
        });
        registry.register(
            "pbi_embed_request_duration_seconds",
            "Embed request duration in seconds, provider call included",
            embed_duration.clone(),
        );

        let cache_entries: Gauge = Gauge::default();
        registry.register(
            "pbi_embed_cache_entries",
            "Report embed configs currently cached",
            cache_entries.clone(),
        );

        let cache_hits: Gauge = Gauge::default();
        registry.register(
            "pbi_embed_cache_hits",
            "Report requests served from cache since start",
            cache_hits.clone(),
        );

        let cache_misses: Gauge = Gauge::default();
        registry.register(
            "pbi_embed_cache_misses",
            "Report requests that called the provider since start",
            cache_misses.clone(),
        );

        let cache_fetch_failures: Gauge = Gauge::default();
        registry.register(
            "pbi_embed_cache_fetch_failures",
            "Provider calls for reports that failed since start",
            cache_fetch_failures.clone(),
        );

        let uptime_seconds: Gauge = Gauge::default();
        registry.register(
            "pbi_embed_uptime_seconds",
            "Server uptime in seconds",
            uptime_seconds.clone(),
        );

        Self {
            registry,
            embed_requests,
            embed_duration,
            cache_entries,
            cache_hits,
            cache_misses,
            cache_fetch_failures,
            uptime_seconds,
        }
    }

    pub fn observe(&self, kind: &str, outcome: &str, seconds: f64) {
        self.embed_requests
            .get_or_create(&EmbedLabel {
                kind: kind.to_string(),
                outcome: outcome.to_string(),
            })
            .inc();
        self.embed_duration
            .get_or_create(&KindLabel {
                kind: kind.to_string(),
            })
            .observe(seconds);
    }

    pub fn set_cache_stats(&self, stats: CacheStats) {
        self.cache_entries.set(stats.entries as i64);
        self.cache_hits.set(stats.hits as i64);
        self.cache_misses.set(stats.misses as i64);
        self.cache_fetch_failures.set(stats.fetch_failures as i64);
    }

    /// OpenMetrics text exposition of the registry.
    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::new();
        encode(&mut out, &self.registry)?;
        Ok(out)
    }
}

impl Default for EmbedMetrics {
    fn default() -> Self {
        Self::new()
    }
}
