use crate::*;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const WS: &str = "be8908da-da25-452e-b220-163f52476cdd";
const DEFAULT_REPORT: &str = "697de4b3-c2a0-4a49-b1f0-0ab0e1b0e4a5";

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Clock the tests move by hand.
struct ManualClock(Mutex<DateTime<Utc>>);

impl ManualClock {
    fn at(now: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }

    fn advance(&self, by: Duration) {
        let mut now = self.0.lock().unwrap();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.0.lock().unwrap()
    }
}

fn report(id: &str, token: &str, expires: DateTime<Utc>) -> ReportEmbedConfig {
    ReportEmbedConfig {
        report_id: id.to_string(),
        report_name: Some(format!("Report {id}")),
        embed_url: format!("https://app.powerbi.com/reportEmbed?reportId={id}"),
        access_token: token.to_string(),
        token_expiration: expires,
    }
}

fn cache_at(clock: Arc<ManualClock>) -> EmbedConfigCache {
    EmbedConfigCache::with_clock(DEFAULT_EXPIRY_MARGIN, clock)
}

// ── Cache freshness ───────────────────────────────────────────────────────────

#[tokio::test]
async fn test_miss_fetches_then_hit_serves_cached() {
    init_logging();
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock.clone());
    let calls = AtomicUsize::new(0);

    let first = cache
        .get_or_fetch("A", |id| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ProviderError>(report(&id, "tok-1", t0() + Duration::minutes(60))) }
        })
        .await
        .unwrap();
    assert_eq!(first.access_token, "tok-1");
    assert_eq!(first.report_id, "A");
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    clock.advance(Duration::minutes(1));
    let second = cache
        .get_or_fetch("A", |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<ReportEmbedConfig, _>(ProviderError::generic("should not be called")) }
        })
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refetches_inside_safety_window() {
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock.clone());
    let calls = AtomicUsize::new(0);

    let fetch = |token: &'static str| {
        let calls = &calls;
        move |id: String| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, ProviderError>(report(&id, token, t0() + Duration::minutes(60))) }
        }
    };

    cache.get_or_fetch("A", fetch("tok-1")).await.unwrap();

    // 56 minutes in, the 60-minute token has less than 5 minutes left.
    clock.advance(Duration::minutes(56));
    let refreshed = cache.get_or_fetch("A", fetch("tok-2")).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(refreshed.access_token, "tok-2");
}

#[tokio::test]
async fn test_expiry_exactly_at_margin_is_stale() {
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock.clone());

    cache
        .get_or_fetch("A", |id| async move {
            Ok::<_, ProviderError>(report(&id, "tok-1", t0() + Duration::minutes(5)))
        })
        .await
        .unwrap();

    let entry = cache.get("A").unwrap();
    assert!(!cache.is_usable(&entry));
}

#[tokio::test]
async fn test_idempotent_read_makes_no_calls() {
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock);
    cache
        .get_or_fetch("A", |id| async move {
            Ok::<_, ProviderError>(report(&id, "tok-1", t0() + Duration::hours(1)))
        })
        .await
        .unwrap();

    let calls = AtomicUsize::new(0);
    let mut seen = Vec::new();
    for _ in 0..2 {
        let entry = cache
            .get_or_fetch("A", |id| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<_, ProviderError>(report(&id, "tok-x", t0() + Duration::hours(1))) }
            })
            .await
            .unwrap();
        seen.push(entry);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(Arc::ptr_eq(&seen[0], &seen[1]));
    assert_eq!(cache.stats().hits, 2);
}

#[tokio::test]
async fn test_refresh_replaces_whole_entry() {
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock.clone());

    cache
        .get_or_fetch("A", |id| async move {
            Ok::<_, ProviderError>(report(&id, "tok-1", t0() + Duration::minutes(10)))
        })
        .await
        .unwrap();

    clock.advance(Duration::minutes(6));
    let fresh = ReportEmbedConfig {
        report_id: "A".to_string(),
        report_name: None,
        embed_url: "https://app.powerbi.com/reportEmbed?reportId=A&v=2".to_string(),
        access_token: "tok-2".to_string(),
        token_expiration: t0() + Duration::hours(2),
    };
    let expected = fresh.clone();

    cache
        .get_or_fetch("A", move |_| async move { Ok::<_, ProviderError>(fresh) })
        .await
        .unwrap();

    assert_eq!(*cache.get("A").unwrap(), expected);
    assert_eq!(cache.len(), 1);
}

#[tokio::test]
async fn test_fetch_failure_leaves_stale_entry() {
    let clock = ManualClock::at(t0());
    let cache = cache_at(clock.clone());

    cache
        .get_or_fetch("A", |id| async move {
            Ok::<_, ProviderError>(report(&id, "tok-1", t0() + Duration::minutes(10)))
        })
        .await
        .unwrap();
    let before = cache.get("A").unwrap();

    clock.advance(Duration::minutes(30));
    let err = cache
        .get_or_fetch("A", |_| async {
            Err::<ReportEmbedConfig, _>(ProviderError::Api {
                status: http::StatusCode::SERVICE_UNAVAILABLE,
                body: "busy".to_string(),
                request_id: Some("req-1".to_string()),
            })
        })
        .await
        .unwrap_err();

    assert!(matches!(err, ProviderError::Api { .. }));
    assert!(Arc::ptr_eq(&before, &cache.get("A").unwrap()));
    assert_eq!(cache.stats().fetch_failures, 1);
}

#[tokio::test]
async fn test_fetch_failure_on_empty_cache_stores_nothing() {
    let cache = EmbedConfigCache::new();
    let result = cache
        .get_or_fetch("A", |_| async {
            Err::<ReportEmbedConfig, _>(ProviderError::generic("timeout"))
        })
        .await;

    assert_eq!(result.unwrap_err(), ProviderError::generic("timeout"));
    assert!(cache.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_access_keeps_every_entry() {
    let cache = Arc::new(EmbedConfigCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    let expires = Utc::now() + Duration::hours(1);

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let cache = cache.clone();
            let calls = calls.clone();
            tokio::spawn(async move {
                let id = format!("report-{i}");
                cache
                    .get_or_fetch(&id, |id| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        tokio::task::yield_now().await;
                        Ok::<_, ProviderError>(report(&id, &format!("tok-{id}"), expires))
                    })
                    .await
            })
        })
        .collect();

    for task in futures::future::join_all(tasks).await {
        task.unwrap().unwrap();
    }

    assert_eq!(cache.len(), 32);
    assert_eq!(calls.load(Ordering::SeqCst), 32);
    for i in 0..32 {
        let entry = cache.get(&format!("report-{i}")).unwrap();
        assert_eq!(entry.access_token, format!("tok-report-{i}"));
    }
}

#[tokio::test]
async fn test_unrepresentable_margin_treats_everything_as_stale() {
    let clock = ManualClock::at(t0());
    let cache = EmbedConfigCache::with_clock(Duration::seconds(100_000_000_000_000), clock);
    let entry = report("A", "tok", t0() + Duration::days(365));

    assert!(!cache.is_usable(&entry));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_racing_misses_on_one_key_keep_a_single_entry() {
    let cache = Arc::new(EmbedConfigCache::new());
    let calls = Arc::new(AtomicUsize::new(0));
    // Both fetches must be in flight before either can store its result.
    let gate = Arc::new(tokio::sync::Barrier::new(2));
    let expires = Utc::now() + Duration::hours(1);

    let tasks: Vec<_> = ["tok-a", "tok-b"]
        .into_iter()
        .map(|token| {
            let cache = cache.clone();
            let calls = calls.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                cache
                    .get_or_fetch("A", |id| async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        gate.wait().await;
                        Ok::<_, ProviderError>(report(&id, token, expires))
                    })
                    .await
            })
        })
        .collect();

    let mut returned = Vec::new();
    for task in futures::future::join_all(tasks).await {
        returned.push(task.unwrap().unwrap().access_token.clone());
    }
    returned.sort();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(returned, vec!["tok-a", "tok-b"]);
    assert_eq!(cache.len(), 1);
    let stored = cache.get("A").unwrap();
    assert!(stored.access_token == "tok-a" || stored.access_token == "tok-b");
}

proptest! {
    #[test]
    fn prop_fetch_iff_inside_margin(remaining_secs in -3600i64..7200, elapsed_secs in 0i64..3600) {
        let clock = ManualClock::at(t0());
        let cache = cache_at(clock.clone());
        let expires = t0() + Duration::seconds(remaining_secs);

        futures::executor::block_on(cache.get_or_fetch("A", |id| async move {
            Ok::<_, ProviderError>(report(&id, "seed", expires))
        }))
        .unwrap();

        clock.advance(Duration::seconds(elapsed_secs));
        let now = t0() + Duration::seconds(elapsed_secs);

        let called = AtomicBool::new(false);
        futures::executor::block_on(cache.get_or_fetch("A", |id| {
            called.store(true, Ordering::SeqCst);
            async move { Ok::<_, ProviderError>(report(&id, "next", now + Duration::hours(1))) }
        }))
        .unwrap();

        let should_fetch = now >= expires - DEFAULT_EXPIRY_MARGIN;
        prop_assert_eq!(called.load(Ordering::SeqCst), should_fetch);
    }
}

// ── Embed service ─────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakeProvider {
    report_calls: AtomicUsize,
    dashboard_calls: AtomicUsize,
    fail: AtomicBool,
    last_report: Mutex<Option<(Uuid, Uuid)>>,
}

#[async_trait]
impl EmbedTokenProvider for FakeProvider {
    fn name(&self) -> &str {
        "fake"
    }

    async fn fetch_report_embed_config(
        &self,
        workspace_id: Uuid,
        report_id: Uuid,
    ) -> ProviderResult<ReportEmbedConfig> {
        self.report_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_report.lock().unwrap() = Some((workspace_id, report_id));
        if self.fail.load(Ordering::SeqCst) {
            return Err(ProviderError::generic("provider down"));
        }
        Ok(report(
            &report_id.to_string(),
            "tok",
            Utc::now() + Duration::hours(1),
        ))
    }

    async fn fetch_dashboard_embed_config(
        &self,
        workspace_id: Uuid,
    ) -> ProviderResult<DashboardEmbedConfig> {
        self.dashboard_calls.fetch_add(1, Ordering::SeqCst);
        Ok(DashboardEmbedConfig {
            dashboard_id: "d1".to_string(),
            embed_url: format!("https://app.powerbi.com/dashboardEmbed?groupId={workspace_id}"),
            access_token: "dash-tok".to_string(),
            token_expiration: Utc::now() + Duration::hours(1),
        })
    }

    async fn fetch_tile_embed_config(&self, _workspace_id: Uuid) -> ProviderResult<TileEmbedConfig> {
        Err(ProviderError::Api {
            status: http::StatusCode::NOT_FOUND,
            body: "no tiles".to_string(),
            request_id: None,
        })
    }
}

fn service(provider: Arc<FakeProvider>) -> EmbedService<Arc<FakeProvider>> {
    EmbedService::new(
        provider,
        validate(Some(WS), Some(DEFAULT_REPORT)),
        Arc::new(CacheSlot::new()),
    )
}

#[tokio::test]
async fn test_service_defaults_missing_or_blank_report_id() {
    let provider = Arc::new(FakeProvider::default());
    let svc = service(provider.clone());

    let config = svc.embed_report(None).await.unwrap();
    assert_eq!(config.report_id, DEFAULT_REPORT);

    let again = svc.embed_report(Some("  ")).await.unwrap();
    assert!(Arc::ptr_eq(&config, &again));
    assert_eq!(provider.report_calls.load(Ordering::SeqCst), 1);

    let (ws, _) = provider.last_report.lock().unwrap().unwrap();
    assert_eq!(ws.to_string(), WS);
}

#[tokio::test]
async fn test_service_normalises_cache_key() {
    let provider = Arc::new(FakeProvider::default());
    let svc = service(provider.clone());

    let upper = DEFAULT_REPORT.to_uppercase();
    svc.embed_report(Some(upper.as_str())).await.unwrap();
    svc.embed_report(Some(DEFAULT_REPORT)).await.unwrap();

    assert_eq!(provider.report_calls.load(Ordering::SeqCst), 1);
    assert!(svc.report_cache().unwrap().get(DEFAULT_REPORT).is_some());
}

#[tokio::test]
async fn test_service_rejects_malformed_report_id() {
    let provider = Arc::new(FakeProvider::default());
    let svc = service(provider.clone());

    let err = svc.embed_report(Some("not-a-guid")).await.unwrap_err();
    assert_eq!(err, EmbedError::InvalidReportId("not-a-guid".to_string()));
    assert_eq!(provider.report_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_config_error_short_circuits_everything() {
    let provider = Arc::new(FakeProvider::default());
    let slot = Arc::new(CacheSlot::new());
    let svc = EmbedService::new(provider.clone(), validate(None, Some(DEFAULT_REPORT)), slot.clone());

    assert!(matches!(svc.embed_report(None).await, Err(EmbedError::Config(_))));
    assert!(matches!(svc.embed_dashboard().await, Err(EmbedError::Config(_))));
    assert!(matches!(svc.embed_tile().await, Err(EmbedError::Config(_))));

    assert_eq!(provider.report_calls.load(Ordering::SeqCst), 0);
    assert_eq!(provider.dashboard_calls.load(Ordering::SeqCst), 0);
    assert!(slot.get().is_none(), "cache must not be created");
}

#[tokio::test]
async fn test_service_provider_failure_is_not_cached() {
    let provider = Arc::new(FakeProvider::default());
    let svc = service(provider.clone());

    provider.fail.store(true, Ordering::SeqCst);
    let err = svc.embed_report(None).await.unwrap_err();
    assert_eq!(err.to_payload().error_message, "provider down");
    assert!(svc.report_cache().unwrap().is_empty());

    provider.fail.store(false, Ordering::SeqCst);
    svc.embed_report(None).await.unwrap();
    assert_eq!(provider.report_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_dashboard_and_tile_are_not_cached() {
    let provider = Arc::new(FakeProvider::default());
    let svc = service(provider.clone());

    svc.embed_dashboard().await.unwrap();
    svc.embed_dashboard().await.unwrap();
    assert_eq!(provider.dashboard_calls.load(Ordering::SeqCst), 2);

    let err = svc.embed_tile().await.unwrap_err();
    assert!(err.to_string().starts_with("Status: Not Found (404)"));
}
