use crate::types::ReportEmbedConfig;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use log::{debug, info};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A cached token must outlive `now` by at least this much to be served.
pub const DEFAULT_EXPIRY_MARGIN: Duration = Duration::minutes(5);

const INITIAL_CAPACITY: usize = 101;

/// Source of "now" for freshness checks.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Point-in-time counters, read by the metrics endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub fetch_failures: u64,
    pub entries: usize,
}

/// Report embed configs keyed by report id.
///
/// Entries are only replaced, never evicted. Concurrent misses on the same
/// key may each call the provider; whichever insert lands last wins.
pub struct EmbedConfigCache {
    entries: DashMap<String, Arc<ReportEmbedConfig>>,
    margin: Duration,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    fetch_failures: AtomicU64,
}

impl EmbedConfigCache {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_EXPIRY_MARGIN, Arc::new(SystemClock))
    }

    pub fn with_clock(margin: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::with_capacity(INITIAL_CAPACITY),
            margin,
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            fetch_failures: AtomicU64::new(0),
        }
    }

    /// Return the cached config for `report_id` if its token is still safely
    /// valid, otherwise run `fetch`, store its result and return it.
    ///
    /// A failed fetch is returned as-is and leaves the existing entry (stale
    /// or absent) in place.
    pub async fn get_or_fetch<F, Fut, E>(
        &self,
        report_id: &str,
        fetch: F,
    ) -> std::result::Result<Arc<ReportEmbedConfig>, E>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = std::result::Result<ReportEmbedConfig, E>>,
    {
        if let Some(cached) = self.fresh(report_id) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            debug!(
                "embed config cache hit for {} (expires {})",
                report_id, cached.token_expiration
            );
            return Ok(cached);
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("embed config cache miss for {}, fetching", report_id);

        let fetched = match fetch(report_id.to_string()).await {
            Ok(config) => Arc::new(config),
            Err(e) => {
                self.fetch_failures.fetch_add(1, Ordering::Relaxed);
                return Err(e);
            }
        };

        self.entries.insert(report_id.to_string(), fetched.clone());
        Ok(fetched)
    }

    /// Whether `config` may still be handed to a client. A margin reaching
    /// past the representable range counts as stale.
    pub fn is_usable(&self, config: &ReportEmbedConfig) -> bool {
        match self.clock.now().checked_add_signed(self.margin) {
            Some(deadline) => config.token_expiration > deadline,
            None => false,
        }
    }

    /// Raw lookup, ignoring expiry.
    pub fn get(&self, report_id: &str) -> Option<Arc<ReportEmbedConfig>> {
        self.entries.get(report_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn margin(&self) -> Duration {
        self.margin
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            fetch_failures: self.fetch_failures.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    fn fresh(&self, report_id: &str) -> Option<Arc<ReportEmbedConfig>> {
        // Clone out of the shard guard before the caller awaits anything.
        let cached = self.get(report_id)?;
        self.is_usable(&cached).then_some(cached)
    }
}

impl Default for EmbedConfigCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide home of the embed config cache.
///
/// The cache is built on first use and published exactly once, so racing
/// first requests all end up sharing the same map.
pub struct CacheSlot {
    cell: OnceLock<Arc<EmbedConfigCache>>,
    margin: Duration,
    clock: Arc<dyn Clock>,
}

impl CacheSlot {
    pub fn new() -> Self {
        Self::with_clock(DEFAULT_EXPIRY_MARGIN, Arc::new(SystemClock))
    }

    pub fn with_margin(margin: Duration) -> Self {
        Self::with_clock(margin, Arc::new(SystemClock))
    }

    pub fn with_clock(margin: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            cell: OnceLock::new(),
            margin,
            clock,
        }
    }

    pub fn get_or_init(&self) -> Arc<EmbedConfigCache> {
        self.cell
            .get_or_init(|| {
                info!(
                    "Initializing embed config cache (expiry margin {}s)",
                    self.margin.num_seconds()
                );
                Arc::new(EmbedConfigCache::with_clock(self.margin, self.clock.clone()))
            })
            .clone()
    }

    /// The installed cache, if any request has needed it yet.
    pub fn get(&self) -> Option<Arc<EmbedConfigCache>> {
        self.cell.get().cloned()
    }
}

impl Default for CacheSlot {
    fn default() -> Self {
        Self::new()
    }
}
