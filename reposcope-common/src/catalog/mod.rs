//! Catalog fetching with a TTL cache and in-flight request coalescing.
//!
//! [`CatalogCache::ensure_catalog`] is the single entry point. Concurrent
//! callers share one paginated fetch; a forced refresh supersedes it by
//! bumping the generation, and a superseded fetch never overwrites the
//! newer result.

pub mod store;

pub use store::{
    CACHE_SCHEMA_VERSION, CATALOG_CACHE_ID, CacheEntry, CacheStore, DisabledCacheStore,
    FileCacheStore, MemoryCacheStore, catalog_cache_key,
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{CatalogConfig, DEFAULT_CACHE_TTL_MS};
use crate::errors::ScopeError;
use crate::events::{CATALOG_FAILED, CATALOG_LOADED, CATALOG_PROGRESS, CatalogProgress, EventBus};
use crate::types::{CatalogPage, CatalogSnapshot, ProjectRecord};

// ── Ports ──────────────────────────────────────────────────────────────────

/// Source of catalog pages.
///
/// Implementations must not be stateful between pages; the cache drives
/// `start` and `limit` itself.
pub trait CatalogProvider: Send + Sync + 'static {
    fn fetch_page(
        &self,
        start: usize,
        limit: usize,
    ) -> impl Future<Output = Result<CatalogPage, ScopeError>> + Send;
}

/// Wall clock used for TTL checks and snapshot timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(start)),
        }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        if let Ok(delta) = chrono::Duration::from_std(by) {
            *now += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

// ── Settings ───────────────────────────────────────────────────────────────

/// Pagination and freshness knobs for one cache instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchSettings {
    pub page_size: usize,
    pub ttl: Duration,
    pub max_pages: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            page_size: 200,
            ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            max_pages: 1000,
        }
    }
}

impl From<&CatalogConfig> for FetchSettings {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            page_size: config.effective_page_size(),
            ttl: config.ttl(),
            max_pages: config.max_pages.max(1),
        }
    }
}

// ── Cache ──────────────────────────────────────────────────────────────────

type FetchResult = Result<Arc<CatalogSnapshot>, ScopeError>;
type SharedFetch = Shared<BoxFuture<'static, FetchResult>>;

enum Lookup {
    Hit(Arc<CatalogSnapshot>),
    Pending(u64, SharedFetch),
}

#[derive(Default)]
struct FetchState {
    generation: u64,
    in_flight: Option<(u64, SharedFetch)>,
}

/// TTL cache over a [`CatalogProvider`].
pub struct CatalogCache<P> {
    provider: Arc<P>,
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    events: EventBus,
    settings: FetchSettings,
    state: Arc<Mutex<FetchState>>,
}

impl<P> Clone for CatalogCache<P> {
    fn clone(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            events: self.events.clone(),
            settings: self.settings,
            state: Arc::clone(&self.state),
        }
    }
}

impl<P: CatalogProvider> CatalogCache<P> {
    /// In-memory cache on the system clock.
    pub fn new(provider: P, settings: FetchSettings) -> Self {
        Self::with_parts(
            Arc::new(provider),
            Arc::new(MemoryCacheStore::new()),
            Arc::new(SystemClock),
            EventBus::default(),
            settings,
        )
    }

    pub fn with_parts(
        provider: Arc<P>,
        store: Arc<dyn CacheStore>,
        clock: Arc<dyn Clock>,
        events: EventBus,
        settings: FetchSettings,
    ) -> Self {
        Self {
            provider,
            store,
            clock,
            events,
            settings,
            state: Arc::new(Mutex::new(FetchState::default())),
        }
    }

    pub fn settings(&self) -> FetchSettings {
        self.settings
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Generation of the most recently started fetch.
    pub fn generation(&self) -> u64 {
        self.lock_state().generation
    }

    pub fn is_fetching(&self) -> bool {
        self.lock_state().in_flight.is_some()
    }

    /// Valid cached snapshot, if any, without fetching.
    pub fn cached(&self) -> Option<Arc<CatalogSnapshot>> {
        let key = catalog_cache_key();
        let entry = match self.store.get(&key) {
            Ok(entry) => entry?,
            Err(e) => {
                warn!("Ignoring catalog cache entry: {}", e);
                return None;
            }
        };
        let now = self.clock.now();
        if self.store.is_valid(&entry, now, self.settings.ttl) {
            Some(Arc::new(entry.snapshot))
        } else {
            debug!("Cached catalog from {} is stale", entry.stored_at);
            None
        }
    }

    /// Drop the cached snapshot; the next call fetches.
    pub fn invalidate(&self) {
        self.store.remove(&catalog_cache_key());
    }

    /// Return a catalog snapshot, fetching when the cache is empty or stale.
    ///
    /// Without `force_refresh` a valid cached snapshot is returned without a
    /// provider call, even while a forced refresh runs; failing that, a fetch
    /// already in flight is joined. With
    /// `force_refresh` a new fetch always starts and any in-flight one is
    /// superseded. A failed fetch caches nothing.
    pub async fn ensure_catalog(&self, force_refresh: bool) -> FetchResult {
        let mut force = force_refresh;
        loop {
            let (generation, fetch) = match self.join_or_start(force) {
                Lookup::Hit(snapshot) => return Ok(snapshot),
                Lookup::Pending(generation, fetch) => (generation, fetch),
            };
            let result = fetch.await;
            if self.generation() == generation {
                return result;
            }
            // Superseded while waiting: take whatever is current instead.
            debug!("Catalog fetch generation {} was superseded", generation);
            force = false;
        }
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, FetchState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn join_or_start(&self, force: bool) -> Lookup {
        let mut state = self.lock_state();
        if !force {
            // A valid entry wins even over a forced refresh still running.
            if let Some(snapshot) = self.cached() {
                return Lookup::Hit(snapshot);
            }
            if let Some((generation, fetch)) = &state.in_flight {
                debug!("Joining in-flight catalog fetch {}", generation);
                return Lookup::Pending(*generation, fetch.clone());
            }
        }

        state.generation += 1;
        let generation = state.generation;
        let fetch = self.spawn_fetch(generation);
        state.in_flight = Some((generation, fetch.clone()));
        info!("Starting catalog fetch generation {}", generation);
        Lookup::Pending(generation, fetch)
    }

    fn spawn_fetch(&self, generation: u64) -> SharedFetch {
        let this = self.clone();
        async move {
            let result = paginate(this.provider.as_ref(), this.settings, &this.events)
                .await
                .map(|projects| Arc::new(CatalogSnapshot::new(this.clock.now(), projects)));
            this.complete(generation, &result);
            result
        }
        .boxed()
        .shared()
    }

    fn complete(&self, generation: u64, result: &FetchResult) {
        let current = {
            let mut state = self.lock_state();
            let current = state.generation == generation;
            if current {
                state.in_flight = None;
            }
            current
        };

        match result {
            Ok(snapshot) if current => {
                let entry = CacheEntry::new(snapshot.as_ref().clone());
                if let Err(e) = self.store.set(&catalog_cache_key(), entry) {
                    warn!("Failed to cache catalog snapshot: {}", e);
                }
                info!(
                    "Catalog loaded: {} projects, {} repositories",
                    snapshot.projects.len(),
                    snapshot.repository_count()
                );
                self.events.emit(
                    CATALOG_LOADED,
                    &serde_json::json!({
                        "generation": generation,
                        "projects": snapshot.projects.len(),
                        "repositories": snapshot.repository_count(),
                    }),
                );
            }
            Ok(_) => debug!("Discarding superseded catalog fetch {}", generation),
            Err(e) => {
                warn!("Catalog fetch {} failed: {}", generation, e);
                self.events.emit(
                    CATALOG_FAILED,
                    &serde_json::json!({
                        "generation": generation,
                        "code": e.code().code_string(),
                        "error": e.to_string(),
                    }),
                );
            }
        }
    }
}

/// Walk every page from `start = 0` until a short or empty page, or until
/// the advisory total is reached.
async fn paginate<P: CatalogProvider>(
    provider: &P,
    settings: FetchSettings,
    events: &EventBus,
) -> Result<Vec<ProjectRecord>, ScopeError> {
    let limit = settings.page_size.max(1);
    let mut projects = Vec::new();
    let mut start = 0usize;
    let mut pages = 0usize;

    loop {
        if pages >= settings.max_pages {
            return Err(ScopeError::catalog_unavailable(format!(
                "catalog did not end within {} pages",
                settings.max_pages
            )));
        }

        let page = provider
            .fetch_page(start, limit)
            .await
            .map_err(|e| page_error(e, start))?;
        pages += 1;

        let received = page.projects.len();
        projects.extend(page.projects);
        let progress = CatalogProgress {
            loaded: projects.len(),
            total: page.total,
            pages,
        };
        debug!("Catalog page {}: {}", pages, progress);
        events.emit(CATALOG_PROGRESS, &progress);

        let total_reached = page.total.is_some_and(|total| projects.len() >= total);
        if received == 0 || received < limit || total_reached {
            break;
        }
        start += received;
    }

    Ok(projects)
}

fn page_error(error: ScopeError, start: usize) -> ScopeError {
    match error {
        ScopeError::CatalogUnavailable { cause } => {
            ScopeError::catalog_unavailable(format!("page at start={start}: {cause}"))
        }
        other => ScopeError::catalog_unavailable(format!("page at start={start}: {other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Serves `count` single-repository projects, `limit` at a time.
    struct Numbered {
        count: usize,
        report_total: bool,
        calls: AtomicUsize,
    }

    impl Numbered {
        fn new(count: usize) -> Self {
            Self {
                count,
                report_total: true,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl CatalogProvider for Numbered {
        async fn fetch_page(&self, start: usize, limit: usize) -> Result<CatalogPage, ScopeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let end = (start + limit).min(self.count);
            let projects = (start..end)
                .map(|i| {
                    ProjectRecord::new(format!("P{i}"), format!("Project {i}"))
                        .with_repository("r", "r")
                })
                .collect();
            Ok(CatalogPage {
                projects,
                total: self.report_total.then_some(self.count),
                start: Some(start),
                limit: Some(limit),
            })
        }
    }

    fn settings(page_size: usize) -> FetchSettings {
        FetchSettings {
            page_size,
            ..FetchSettings::default()
        }
    }

    #[tokio::test]
    async fn stops_when_total_is_reached() {
        let cache = CatalogCache::new(Numbered::new(250), settings(200));
        let snapshot = cache.ensure_catalog(false).await.unwrap();
        assert_eq!(snapshot.projects.len(), 250);
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exact_multiple_without_total_needs_a_trailing_empty_page() {
        let provider = Numbered {
            report_total: false,
            ..Numbered::new(400)
        };
        let cache = CatalogCache::new(provider, settings(200));
        let snapshot = cache.ensure_catalog(false).await.unwrap();
        assert_eq!(snapshot.projects.len(), 400);
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_catalog_is_one_call() {
        let cache = CatalogCache::new(Numbered::new(0), settings(50));
        let snapshot = cache.ensure_catalog(false).await.unwrap();
        assert!(snapshot.projects.is_empty());
        assert_eq!(cache.provider.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn page_guard_fails_runaway_catalogs() {
        let provider = Numbered {
            report_total: false,
            ..Numbered::new(1_000)
        };
        let cache = CatalogCache::new(
            provider,
            FetchSettings {
                page_size: 10,
                max_pages: 3,
                ..FetchSettings::default()
            },
        );
        let err = cache.ensure_catalog(false).await.unwrap_err();
        assert!(matches!(err, ScopeError::CatalogUnavailable { .. }));
        assert!(cache.cached().is_none());
    }

    #[tokio::test]
    async fn progress_is_reported_per_page() {
        let cache = CatalogCache::new(Numbered::new(250), settings(200));
        let mut rx = cache.events().subscribe();
        cache.ensure_catalog(false).await.unwrap();

        let mut progress = Vec::new();
        while let Ok(line) = rx.try_recv() {
            let value: serde_json::Value = serde_json::from_str(&line).unwrap();
            if value["event"] == CATALOG_PROGRESS {
                progress.push(value["data"]["loaded"].as_u64().unwrap());
            }
        }
        assert_eq!(progress, vec![200, 250]);
    }

    #[test]
    fn manual_clock_advances() {
        let start = Utc.timestamp_millis_opt(0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.now().timestamp_millis(), 1500);
        clock.set(start);
        assert_eq!(clock.now(), start);
    }

    #[test]
    fn settings_follow_config() {
        let config = CatalogConfig {
            page_size: 9_999,
            max_pages: 0,
            ..CatalogConfig::default()
        };
        let settings = FetchSettings::from(&config);
        assert_eq!(settings.page_size, 500);
        assert_eq!(settings.max_pages, 1);
        assert_eq!(settings.ttl, Duration::from_secs(300));
    }
}
