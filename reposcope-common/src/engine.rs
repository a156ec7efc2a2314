//! Per-session scope engine.
//!
//! One [`ScopeEngine`] per admin session owns the catalog cache, the derived
//! index and tree, the selection state and the persistence port. Nothing is
//! process-global, so two sessions never see each other's selection.

use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::catalog::{CatalogCache, CatalogProvider};
use crate::config::TreeLabels;
use crate::errors::ScopeError;
use crate::events::{EventBus, SCOPE_SAVED};
use crate::index::CatalogIndex;
use crate::reconcile::{self, DiffSummary, RepoDiffRow};
use crate::state::ScopeState;
use crate::tree::{GroupKind, ScopeTree};
use crate::tristate::{self, TriStateMap};
use crate::types::{CatalogSnapshot, RepoKey, SavePayload, ScopeResponse};

/// The scope persistence service.
pub trait ScopePersistence: Send + Sync + 'static {
    /// Current mode and override list.
    fn load_current(&self) -> impl Future<Output = Result<ScopeResponse, ScopeError>> + Send;

    /// Write a scope and return the canonical state the service now holds.
    fn save(
        &self,
        payload: &SavePayload,
    ) -> impl Future<Output = Result<ScopeResponse, ScopeError>> + Send;
}

pub struct ScopeEngine<P, S> {
    cache: CatalogCache<P>,
    persistence: S,
    labels: TreeLabels,
    snapshot: Option<Arc<CatalogSnapshot>>,
    index: CatalogIndex,
    tree: ScopeTree,
    state: ScopeState,
    last_error: Option<ScopeError>,
}

impl<P: CatalogProvider, S: ScopePersistence> ScopeEngine<P, S> {
    pub fn new(cache: CatalogCache<P>, persistence: S, labels: TreeLabels) -> Self {
        let tree = ScopeTree {
            label: labels.all.clone(),
            groups: Vec::new(),
        };
        Self {
            cache,
            persistence,
            labels,
            snapshot: None,
            index: CatalogIndex::default(),
            tree,
            state: ScopeState::new(),
            last_error: None,
        }
    }

    pub fn cache(&self) -> &CatalogCache<P> {
        &self.cache
    }

    pub fn events(&self) -> &EventBus {
        self.cache.events()
    }

    pub fn persistence(&self) -> &S {
        &self.persistence
    }

    pub fn snapshot(&self) -> Option<&Arc<CatalogSnapshot>> {
        self.snapshot.as_ref()
    }

    pub fn index(&self) -> &CatalogIndex {
        &self.index
    }

    pub fn tree(&self) -> &ScopeTree {
        &self.tree
    }

    pub fn state(&self) -> &ScopeState {
        &self.state
    }

    /// The most recent catalog, scope read or save failure, cleared by the
    /// next success of the same action.
    pub fn last_error(&self) -> Option<&ScopeError> {
        self.last_error.as_ref()
    }

    // ── Loading ──

    /// Load (or refresh) the catalog and rebuild the index and tree.
    ///
    /// On failure the previous tree stays in place.
    pub async fn load_catalog(&mut self, force_refresh: bool) -> Result<&ScopeTree, ScopeError> {
        match self.cache.ensure_catalog(force_refresh).await {
            Ok(snapshot) => {
                self.install_snapshot(snapshot);
                self.last_error = None;
                Ok(&self.tree)
            }
            Err(e) => {
                warn!("Keeping previous catalog: {}", e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Use an already fetched snapshot, e.g. one read from a file.
    pub fn install_snapshot(&mut self, snapshot: Arc<CatalogSnapshot>) {
        self.index = CatalogIndex::build(&snapshot);
        self.tree = ScopeTree::build(&snapshot, &self.labels);
        debug!(
            "Indexed {} repositories in {} projects ({} records skipped)",
            self.index.total_repository_count(),
            self.index.project_count(),
            self.index.skipped().len()
        );
        self.snapshot = Some(snapshot);
    }

    /// Read the persisted scope and start the selection from it.
    pub async fn load_scope(&mut self) -> Result<&ScopeState, ScopeError> {
        match self.persistence.load_current().await {
            Ok(response) => {
                self.initialize(&response);
                self.last_error = None;
                Ok(&self.state)
            }
            Err(e) => {
                let e = match e {
                    ScopeError::ScopeUnavailable { .. } => e,
                    other => ScopeError::scope_unavailable(other),
                };
                warn!("Could not load saved scope: {}", e);
                self.last_error = Some(e.clone());
                Err(e)
            }
        }
    }

    /// Replace the selection with the given server state.
    pub fn initialize(&mut self, response: &ScopeResponse) {
        self.state = ScopeState::from_response(response);
        info!(
            "Scope is {} with {} persisted overrides",
            self.state.mode(),
            self.state.overrides().len()
        );
    }

    // ── Selection ──

    pub fn set_global(&mut self, global: bool) {
        self.state.set_global(global);
    }

    /// Check or uncheck one repository.
    ///
    /// Checking a repository the loaded catalog does not contain is refused;
    /// unchecking is always allowed so stale keys can be dropped.
    pub fn toggle_repository(&mut self, key: &RepoKey, checked: bool) -> Result<(), ScopeError> {
        if checked && self.snapshot.is_some() && !self.index.contains(key) {
            return Err(ScopeError::UnknownRepository {
                key: key.to_string(),
            });
        }
        self.state.toggle_repository(key, checked);
        Ok(())
    }

    pub fn toggle_project(&mut self, project_key: &str, checked: bool) -> Result<(), ScopeError> {
        if self.snapshot.is_some() && self.tree.project(project_key).is_none() {
            return Err(ScopeError::InvalidSelection {
                reason: format!("project '{project_key}' is not in the catalog"),
            });
        }
        self.state.toggle_project(&self.tree, project_key, checked);
        Ok(())
    }

    pub fn toggle_group(&mut self, kind: GroupKind, checked: bool) {
        self.state.toggle_group(&self.tree, kind, checked);
    }

    // ── Derived views ──

    pub fn tri_states(&self) -> TriStateMap {
        tristate::aggregate(&self.tree, &self.state)
    }

    pub fn diff(&self) -> Vec<RepoDiffRow> {
        reconcile::diff(&self.state, self.state.overrides(), Some(&self.index))
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_rows(&self.diff())
    }

    pub fn save_payload(&self) -> SavePayload {
        reconcile::build_save_payload(&self.state)
    }

    // ── Saving ──

    /// Validate and send the selection, then rebuild the state from the
    /// service's canonical answer.
    ///
    /// On any failure the selection is left exactly as it was.
    pub async fn save(&mut self) -> Result<Vec<RepoDiffRow>, ScopeError> {
        let payload = self.save_payload();
        reconcile::validate_payload(&payload)?;

        let response = match self.persistence.save(&payload).await {
            Ok(response) => response,
            Err(e) => {
                let e = match e {
                    ScopeError::SaveRejected { .. } => e,
                    other => ScopeError::save_rejected(other),
                };
                warn!("Scope save failed: {}", e);
                self.last_error = Some(e.clone());
                return Err(e);
            }
        };

        self.state = ScopeState::from_response(&response);
        self.last_error = None;
        info!(
            "Saved scope {} with {} repositories; server holds {} overrides",
            payload.mode,
            payload.repositories.len(),
            response.repository_overrides.len()
        );
        self.cache.events().emit(
            SCOPE_SAVED,
            &serde_json::json!({
                "mode": response.mode,
                "requested": payload.repositories.len(),
                "overrides": response.repository_overrides.len(),
            }),
        );
        Ok(self.diff())
    }
}
