//! Pending-change classification and save payloads.
//!
//! The diff compares the live selection against the last persisted
//! overrides. Rows are keyed by [`RepoKey`] and come out in key order.

use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::OnceLock;

use crate::errors::ScopeError;
use crate::index::CatalogIndex;
use crate::state::ScopeState;
use crate::types::{OverrideRecord, RepoKey, SavePayload};

/// Largest allow-list the persistence service accepts.
pub const MAX_SCOPE_SELECTION: usize = 1000;

/// Personal projects carry a leading `~`.
const PROJECT_KEY_PATTERN: &str = r"^~?[A-Z0-9_\-]+$";
const REPOSITORY_SLUG_PATTERN: &str = r"^[A-Za-z0-9._\-]+$";

// ── Classification ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiffClassification {
    /// Selected and persisted, following the global configuration.
    InheritsGlobal,
    /// Selected and persisted with repository-specific values.
    OverrideActive,
    /// Selected, not yet persisted.
    WillAdd,
    /// Persisted (inheriting), no longer selected.
    WillRemove,
    /// Persisted with specific values, no longer selected.
    RemoveOverride,
}

impl DiffClassification {
    /// Classify one key. `None` when it is neither selected nor persisted.
    pub fn classify(selected: bool, persisted: Option<&OverrideRecord>) -> Option<Self> {
        match (selected, persisted) {
            (true, Some(o)) if o.inherit_global => Some(Self::InheritsGlobal),
            (true, Some(_)) => Some(Self::OverrideActive),
            (true, None) => Some(Self::WillAdd),
            (false, Some(o)) if o.inherit_global => Some(Self::WillRemove),
            (false, Some(_)) => Some(Self::RemoveOverride),
            (false, None) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InheritsGlobal => "INHERITS_GLOBAL",
            Self::OverrideActive => "OVERRIDE_ACTIVE",
            Self::WillAdd => "WILL_ADD",
            Self::WillRemove => "WILL_REMOVE",
            Self::RemoveOverride => "REMOVE_OVERRIDE",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::InheritsGlobal => "Inherits global",
            Self::OverrideActive => "Override active",
            Self::WillAdd => "Will add",
            Self::WillRemove => "Will remove",
            Self::RemoveOverride => "Remove override",
        }
    }

    /// Whether saving would change this repository.
    pub fn is_pending(self) -> bool {
        matches!(self, Self::WillAdd | Self::WillRemove | Self::RemoveOverride)
    }
}

impl fmt::Display for DiffClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the pending-changes table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RepoDiffRow {
    pub key: RepoKey,
    pub classification: DiffClassification,
    /// Catalog names, when the repository is in the current catalog.
    pub project_name: Option<String>,
    pub repository_name: Option<String>,
    pub modified_at: Option<i64>,
    pub modified_by: Option<String>,
}

/// Row counts per classification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffSummary {
    pub inherits_global: usize,
    pub override_active: usize,
    pub will_add: usize,
    pub will_remove: usize,
    pub remove_override: usize,
}

impl DiffSummary {
    pub fn from_rows(rows: &[RepoDiffRow]) -> Self {
        let mut summary = Self::default();
        for row in rows {
            match row.classification {
                DiffClassification::InheritsGlobal => summary.inherits_global += 1,
                DiffClassification::OverrideActive => summary.override_active += 1,
                DiffClassification::WillAdd => summary.will_add += 1,
                DiffClassification::WillRemove => summary.will_remove += 1,
                DiffClassification::RemoveOverride => summary.remove_override += 1,
            }
        }
        summary
    }

    pub fn pending(&self) -> usize {
        self.will_add + self.will_remove + self.remove_override
    }

    pub fn total(&self) -> usize {
        self.pending() + self.inherits_global + self.override_active
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to add, {} to remove, {} overrides to drop, {} unchanged",
            self.will_add,
            self.will_remove,
            self.remove_override,
            self.inherits_global + self.override_active
        )
    }
}

/// Classify every key that is selected or persisted.
///
/// The selection is taken literally: while GLOBAL it is empty, so every
/// persisted override shows as leaving, which is what a GLOBAL save does.
pub fn diff(
    state: &ScopeState,
    overrides: &BTreeMap<RepoKey, OverrideRecord>,
    index: Option<&CatalogIndex>,
) -> Vec<RepoDiffRow> {
    let keys: BTreeSet<&RepoKey> = state.selected().iter().chain(overrides.keys()).collect();

    keys.into_iter()
        .filter_map(|key| {
            let persisted = overrides.get(key);
            let classification =
                DiffClassification::classify(state.selected().contains(key), persisted)?;
            let indexed = index.and_then(|i| i.repository(key));
            Some(RepoDiffRow {
                key: key.clone(),
                classification,
                project_name: indexed.map(|r| r.project_name.clone()),
                repository_name: indexed.map(|r| r.repository_name.clone()),
                modified_at: persisted.and_then(|o| o.modified_at),
                modified_by: persisted.and_then(|o| o.modified_by.clone()),
            })
        })
        .collect()
}

// ── Save payload ───────────────────────────────────────────────────────────

/// Payload for the scope write. GLOBAL sends no repositories; SCOPED sends
/// the selection once per key, in key order.
pub fn build_save_payload(state: &ScopeState) -> SavePayload {
    let repositories = if state.is_global() {
        Vec::new()
    } else {
        state.selected().iter().map(RepoKey::to_ref).collect()
    };
    SavePayload {
        mode: state.mode(),
        repositories,
    }
}

struct KeySyntax {
    project: Regex,
    slug: Regex,
}

fn key_syntax() -> Result<&'static KeySyntax, ScopeError> {
    static SYNTAX: OnceLock<Result<KeySyntax, regex::Error>> = OnceLock::new();
    SYNTAX
        .get_or_init(|| {
            Ok(KeySyntax {
                project: Regex::new(PROJECT_KEY_PATTERN)?,
                slug: Regex::new(REPOSITORY_SLUG_PATTERN)?,
            })
        })
        .as_ref()
        .map_err(|e| ScopeError::InvalidSelection {
            reason: format!("key pattern failed to compile: {e}"),
        })
}

/// Reject payloads the persistence service would refuse.
pub fn validate_payload(payload: &SavePayload) -> Result<(), ScopeError> {
    if payload.repositories.len() > MAX_SCOPE_SELECTION {
        return Err(ScopeError::InvalidSelection {
            reason: format!(
                "{} repositories selected; at most {} can be scoped explicitly",
                payload.repositories.len(),
                MAX_SCOPE_SELECTION
            ),
        });
    }

    let syntax = key_syntax()?;
    let mut invalid = Vec::new();
    for repo in &payload.repositories {
        if !syntax.project.is_match(&repo.project_key)
            || !syntax.slug.is_match(&repo.repository_slug)
        {
            invalid.push(format!("{}/{}", repo.project_key, repo.repository_slug));
        }
    }
    if invalid.is_empty() {
        Ok(())
    } else {
        Err(ScopeError::InvalidSelection {
            reason: format!("invalid repository keys: {}", invalid.join(", ")),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ProjectRecord, RepositoryRef, ScopeMode};

    fn key(raw: &str) -> RepoKey {
        RepoKey::parse(raw).unwrap()
    }

    fn record(raw: &str, inherit_global: bool) -> OverrideRecord {
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

    fn scoped(raw: &[&str]) -> ScopeState {
        let mut state = ScopeState::new();
        state.set_global(false);
        for k in raw {
            state.toggle_repository(&key(k), true);
        }
        state
    }

    fn overrides(records: &[OverrideRecord]) -> BTreeMap<RepoKey, OverrideRecord> {
        records
            .iter()
            .map(|r| (r.repo_key().unwrap(), r.clone()))
            .collect()
    }

    #[test]
    fn classification_table() {
        let inherit = record("P/a", true);
        let explicit = record("P/a", false);
        use DiffClassification::*;
        assert_eq!(DiffClassification::classify(true, Some(&inherit)), Some(InheritsGlobal));
        assert_eq!(DiffClassification::classify(true, Some(&explicit)), Some(OverrideActive));
        assert_eq!(DiffClassification::classify(true, None), Some(WillAdd));
        assert_eq!(DiffClassification::classify(false, Some(&inherit)), Some(WillRemove));
        assert_eq!(DiffClassification::classify(false, Some(&explicit)), Some(RemoveOverride));
        assert_eq!(DiffClassification::classify(false, None), None);
    }

    #[test]
    fn diff_unions_selection_and_overrides_in_key_order() {
        let index = CatalogIndex::from_projects(&[ProjectRecord::new("P1", "One")
            .with_repository("r1", "Repo 1")
            .with_repository("r2", "Repo 2")]);
        let state = scoped(&["P1/r2"]);
        let persisted = overrides(&[record("P1/r1", false)]);

        let rows = diff(&state, &persisted, Some(&index));
        let view: Vec<(&str, DiffClassification)> =
            rows.iter().map(|r| (r.key.as_str(), r.classification)).collect();
        assert_eq!(
            view,
            vec![
                ("P1/r1", DiffClassification::RemoveOverride),
                ("P1/r2", DiffClassification::WillAdd),
            ]
        );
        assert_eq!(rows[0].modified_by.as_deref(), Some("admin"));
        assert_eq!(rows[1].repository_name.as_deref(), Some("Repo 2"));
        assert_eq!(rows[1].modified_at, None);
    }

    #[test]
    fn global_diff_marks_every_override_as_leaving() {
        let persisted = overrides(&[record("A/x", true), record("B/y", false)]);
        let rows = diff(&ScopeState::new(), &persisted, None);
        let summary = DiffSummary::from_rows(&rows);
        assert_eq!(summary.will_remove, 1);
        assert_eq!(summary.remove_override, 1);
        assert_eq!(summary.pending(), 2);
        assert!(rows.iter().all(|r| r.project_name.is_none()));
    }

    #[test]
    fn summary_counts_and_display() {
        let state = scoped(&["A/x", "B/y", "C/z"]);
        let persisted = overrides(&[record("A/x", true), record("B/y", false)]);
        let summary = DiffSummary::from_rows(&diff(&state, &persisted, None));
        assert_eq!(summary.inherits_global, 1);
        assert_eq!(summary.override_active, 1);
        assert_eq!(summary.will_add, 1);
        assert_eq!(summary.total(), 3);
        assert_eq!(
            summary.to_string(),
            "1 to add, 0 to remove, 0 overrides to drop, 2 unchanged"
        );
    }

    #[test]
    fn payload_for_scoped_selection_is_ordered() {
        let payload = build_save_payload(&scoped(&["B/y", "A/x"]));
        assert_eq!(payload.mode, ScopeMode::Scoped);
        assert_eq!(
            payload.repositories,
            vec![
                RepositoryRef {
                    project_key: "A".to_string(),
                    repository_slug: "x".to_string()
                },
                RepositoryRef {
                    project_key: "B".to_string(),
                    repository_slug: "y".to_string()
                },
            ]
        );
        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["mode"], "repositories");
        assert_eq!(json["repositories"][0]["projectKey"], "A");
        assert_eq!(json["repositories"][0]["repositorySlug"], "x");
    }

    #[test]
    fn payload_for_global_has_no_repositories() {
        let mut state = scoped(&["A/x"]);
        state.set_global(true);
        let payload = build_save_payload(&state);
        assert_eq!(payload.mode, ScopeMode::Global);
        assert!(payload.repositories.is_empty());
        validate_payload(&payload).unwrap();
    }

    #[test]
    fn validation_enforces_cap() {
        let keys: Vec<String> = (0..=MAX_SCOPE_SELECTION).map(|i| format!("P/r{i}")).collect();
        let refs: Vec<&str> = keys.iter().map(String::as_str).collect();
        let err = validate_payload(&build_save_payload(&scoped(&refs))).unwrap_err();
        assert!(matches!(err, ScopeError::InvalidSelection { .. }));

        let at_cap: Vec<&str> = refs[..MAX_SCOPE_SELECTION].to_vec();
        validate_payload(&build_save_payload(&scoped(&at_cap))).unwrap();
    }

    #[test]
    fn validation_enforces_key_syntax() {
        let valid = build_save_payload(&scoped(&["PRJ_1/my.repo-2", "~ALICE/dots"]));
        validate_payload(&valid).unwrap();

        let err = validate_payload(&build_save_payload(&scoped(&["lower/repo", "OK/sp ace"])))
            .unwrap_err();
        let ScopeError::InvalidSelection { reason } = err else {
            panic!("expected InvalidSelection");
        };
        assert!(reason.contains("lower/repo"));
        assert!(reason.contains("OK/sp ace"));
    }
}
