//! Mutable selection model and its GLOBAL/SCOPED transitions.
//!
//! Every transition is synchronous and total. Toggling anything while
//! GLOBAL first moves to SCOPED by restoring the pre-GLOBAL selection, then
//! applies the toggle; "all minus one" is never computed.

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

use crate::tree::{GroupKind, ScopeTree};
use crate::types::{OverrideRecord, RepoKey, ScopeMode, ScopeResponse};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScopeState {
    mode: ScopeMode,
    selected: BTreeSet<RepoKey>,
    previous: BTreeSet<RepoKey>,
    overrides: BTreeMap<RepoKey, OverrideRecord>,
}

impl ScopeState {
    /// GLOBAL with no history and no overrides.
    pub fn new() -> Self {
        Self::default()
    }

    /// Initial state from the persisted mode and override list.
    ///
    /// SCOPED selects every overridden repository. GLOBAL selects nothing but
    /// keeps the overridden repositories as history, so leaving GLOBAL brings
    /// the persisted allow-list back.
    pub fn from_server(mode: ScopeMode, overrides: &[OverrideRecord]) -> Self {
        let mut by_key = BTreeMap::new();
        for record in overrides {
            match record.repo_key() {
                Some(key) => {
                    by_key.insert(key, record.clone());
                }
                None => warn!(
                    "Ignoring override with invalid key '{}/{}'",
                    record.project_key, record.repository_slug
                ),
            }
        }
        let keys: BTreeSet<RepoKey> = by_key.keys().cloned().collect();
        let selected = if mode.is_global() {
            BTreeSet::new()
        } else {
            keys.clone()
        };

        Self {
            mode,
            selected,
            previous: keys,
            overrides: by_key,
        }
    }

    pub fn from_response(response: &ScopeResponse) -> Self {
        Self::from_server(response.mode, &response.repository_overrides)
    }

    pub fn mode(&self) -> ScopeMode {
        self.mode
    }

    pub fn is_global(&self) -> bool {
        self.mode.is_global()
    }

    /// Explicit selection. Empty while GLOBAL, which means "everything".
    pub fn selected(&self) -> &BTreeSet<RepoKey> {
        &self.selected
    }

    pub fn previous(&self) -> &BTreeSet<RepoKey> {
        &self.previous
    }

    pub fn overrides(&self) -> &BTreeMap<RepoKey, OverrideRecord> {
        &self.overrides
    }

    /// Whether `key` is in scope, counting GLOBAL as selecting everything.
    pub fn is_selected(&self, key: &RepoKey) -> bool {
        self.is_global() || self.selected.contains(key)
    }

    // ── Transitions ──

    /// Enter or leave GLOBAL.
    ///
    /// Entering stashes the scoped selection as history; leaving restores
    /// it. Repeating the current mode changes nothing, so history survives a
    /// double `set_global(true)`.
    pub fn set_global(&mut self, global: bool) {
        match (self.mode, global) {
            (ScopeMode::Scoped, true) => {
                self.previous = std::mem::take(&mut self.selected);
                self.mode = ScopeMode::Global;
                debug!("Scope is now global ({} stashed)", self.previous.len());
            }
            (ScopeMode::Global, false) => self.restore_scoped(),
            _ => {}
        }
    }

    pub fn toggle_repository(&mut self, key: &RepoKey, checked: bool) {
        self.toggle_keys(std::iter::once(key), checked);
    }

    /// Toggle every repository of a project. Unknown projects only cause
    /// the GLOBAL → SCOPED move.
    pub fn toggle_project(&mut self, tree: &ScopeTree, project_key: &str, checked: bool) {
        self.toggle_keys(&tree.project_keys(project_key), checked);
    }

    pub fn toggle_group(&mut self, tree: &ScopeTree, kind: GroupKind, checked: bool) {
        self.toggle_keys(&tree.group_keys(kind), checked);
    }

    /// Toggle an arbitrary set of repositories in one transition.
    pub fn toggle_keys<'a>(&mut self, keys: impl IntoIterator<Item = &'a RepoKey>, checked: bool) {
        if self.is_global() {
            self.restore_scoped();
        }
        for key in keys {
            if checked {
                self.selected.insert(key.clone());
            } else {
                self.selected.remove(key);
            }
        }
    }

    fn restore_scoped(&mut self) {
        self.mode = ScopeMode::Scoped;
        self.selected = self.previous.clone();
        debug!("Scope is now scoped ({} restored)", self.selected.len());
    }
}
