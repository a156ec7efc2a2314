#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use reposcope_common::catalog::{
    CacheStore, CatalogCache, CatalogProvider, FetchSettings, ManualClock,
};
use reposcope_common::engine::ScopePersistence;
use reposcope_common::events::EventBus;
use reposcope_common::types::{
    CatalogPage, OverrideRecord, ProjectRecord, RepoKey, SavePayload, ScopeMode, ScopeResponse,
};
use reposcope_common::ScopeError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Semaphore;
use tracing_subscriber::{EnvFilter, fmt};

pub fn init_test_logging() {
    let _ = fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("reposcope_common=debug"))
        .try_init();
}

pub fn key(raw: &str) -> RepoKey {
    RepoKey::parse(raw).unwrap()
}

pub fn at_ms(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).unwrap()
}

/// `count` org projects `P000..`, each with one repository `repo`.
pub fn numbered_projects(count: usize) -> Vec<ProjectRecord> {
    (0..count)
        .map(|i| {
            ProjectRecord::new(format!("P{i:03}"), format!("Project {i}"))
                .with_repository("repo", "Repo")
        })
        .collect()
}

/// Small mixed catalog used by the engine tests.
pub fn sample_catalog() -> Vec<ProjectRecord> {
    vec![
        ProjectRecord::new("P1", "Payments")
            .with_repository("r1", "Ledger")
            .with_repository("r2", "Gateway"),
        ProjectRecord::new("P2", "Platform").with_repository("infra", "Infra"),
        ProjectRecord::new("~ALICE", "Alice")
            .personal()
            .with_repository("dots", "dotfiles"),
    ]
}

pub fn override_record(raw: &str, inherit_global: bool) -> OverrideRecord {
    let k = key(raw);
    OverrideRecord {
        project_key: k.project_key().to_string(),
        repository_slug: k.repository_slug().to_string(),
        inherit_global,
        modified_at: Some(1_700_000_000_000),
        modified_by: Some("admin".to_string()),
        overrides: None,
    }
}

// ── Catalog provider ───────────────────────────────────────────────────────

/// Serves a mutable catalog page by page and records every call.
///
/// Each call slices the catalog as it is when the call starts, so the test
/// can swap the catalog while an earlier call is parked on its gate.
#[derive(Default)]
pub struct ScriptedProvider {
    projects: Mutex<Vec<ProjectRecord>>,
    report_total: AtomicBool,
    fail: AtomicBool,
    calls: Mutex<Vec<(usize, usize)>>,
    completed: AtomicUsize,
    gates: Mutex<HashMap<usize, Arc<Semaphore>>>,
}

impl ScriptedProvider {
    pub fn new(projects: Vec<ProjectRecord>) -> Self {
        let provider = Self::default();
        provider.set_catalog(projects);
        provider.report_total.store(true, Ordering::SeqCst);
        provider
    }

    pub fn without_total(self) -> Self {
        self.report_total.store(false, Ordering::SeqCst);
        self
    }

    pub fn set_catalog(&self, projects: Vec<ProjectRecord>) {
        *self.projects.lock().unwrap() = projects;
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Park call number `call` (0-based) until the returned semaphore gets
    /// a permit.
    pub fn gate(&self, call: usize) -> Arc<Semaphore> {
        let gate = Arc::new(Semaphore::new(0));
        self.gates.lock().unwrap().insert(call, Arc::clone(&gate));
        gate
    }

    pub fn calls(&self) -> Vec<(usize, usize)> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Calls that have returned, successfully or not.
    pub fn completed_count(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

impl CatalogProvider for ScriptedProvider {
    async fn fetch_page(&self, start: usize, limit: usize) -> Result<CatalogPage, ScopeError> {
        let (call, gate) = {
            let mut calls = self.calls.lock().unwrap();
            calls.push((start, limit));
            let call = calls.len() - 1;
            (call, self.gates.lock().unwrap().get(&call).cloned())
        };
        let (page, total) = {
            let projects = self.projects.lock().unwrap();
            let end = (start + limit).min(projects.len());
            let page: Vec<ProjectRecord> = projects.get(start..end).unwrap_or_default().to_vec();
            (page, projects.len())
        };

        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        tokio::task::yield_now().await;
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.fail.load(Ordering::SeqCst) {
            return Err(ScopeError::catalog_unavailable(format!(
                "HTTP 503 on call {call}"
            )));
        }
        Ok(CatalogPage {
            projects: page,
            total: self.report_total.load(Ordering::SeqCst).then_some(total),
            start: Some(start),
            limit: Some(limit),
        })
    }
}

pub struct CacheHarness {
    pub provider: Arc<ScriptedProvider>,
    pub clock: ManualClock,
    pub cache: CatalogCache<ScriptedProvider>,
}

pub fn harness(
    provider: ScriptedProvider,
    store: Arc<dyn CacheStore>,
    settings: FetchSettings,
) -> CacheHarness {
    let provider = Arc::new(provider);
    let clock = ManualClock::new(at_ms(1_000_000));
    let cache = CatalogCache::with_parts(
        Arc::clone(&provider),
        store,
        Arc::new(clock.clone()),
        EventBus::default(),
        settings,
    );
    CacheHarness {
        provider,
        clock,
        cache,
    }
}

/// Yield until `cond` holds, giving spawned tasks room to run.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition not reached");
}

// ── Persistence ────────────────────────────────────────────────────────────

/// In-memory stand-in for the persistence service.
///
/// A scoped save keeps existing records for repositories that stay selected,
/// creates inheriting records for new ones and drops the rest; a global
/// save drops every record.
pub struct RecordingPersistence {
    current: Mutex<ScopeResponse>,
    saves: Mutex<Vec<SavePayload>>,
    fail_save: AtomicBool,
    fail_load: AtomicBool,
}

impl RecordingPersistence {
    pub fn new(mode: ScopeMode, overrides: Vec<OverrideRecord>) -> Self {
        Self {
            current: Mutex::new(ScopeResponse {
                mode,
                repository_overrides: overrides,
            }),
            saves: Mutex::new(Vec::new()),
            fail_save: AtomicBool::new(false),
            fail_load: AtomicBool::new(false),
        }
    }

    pub fn set_failing_save(&self, fail: bool) {
        self.fail_save.store(fail, Ordering::SeqCst);
    }

    pub fn set_failing_load(&self, fail: bool) {
        self.fail_load.store(fail, Ordering::SeqCst);
    }

    pub fn saves(&self) -> Vec<SavePayload> {
        self.saves.lock().unwrap().clone()
    }

    pub fn current(&self) -> ScopeResponse {
        self.current.lock().unwrap().clone()
    }
}

impl ScopePersistence for RecordingPersistence {
    async fn load_current(&self) -> Result<ScopeResponse, ScopeError> {
        if self.fail_load.load(Ordering::SeqCst) {
            return Err(ScopeError::scope_unavailable("HTTP 500"));
        }
        Ok(self.current())
    }

    async fn save(&self, payload: &SavePayload) -> Result<ScopeResponse, ScopeError> {
        self.saves.lock().unwrap().push(payload.clone());
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(ScopeError::catalog_unavailable("connection reset"));
        }

        let mut current = self.current.lock().unwrap();
        let existing: HashMap<String, OverrideRecord> = current
            .repository_overrides
            .iter()
            .map(|o| (format!("{}/{}", o.project_key, o.repository_slug), o.clone()))
            .collect();
        let overrides = payload
            .repositories
            .iter()
            .map(|r| {
                let id = format!("{}/{}", r.project_key, r.repository_slug);
                existing.get(&id).cloned().unwrap_or_else(|| OverrideRecord {
                    project_key: r.project_key.clone(),
                    repository_slug: r.repository_slug.clone(),
                    inherit_global: true,
                    modified_at: Some(1_800_000_000_000),
                    modified_by: Some("server".to_string()),
                    overrides: None,
                })
            })
            .collect();
        *current = ScopeResponse {
            mode: payload.mode,
            repository_overrides: overrides,
        };
        Ok(current.clone())
    }
}
