//! Catalog, selection and override types shared by every engine component.
//!
//! Wire field names follow the admin REST API (camelCase); Rust field names
//! are snake_case.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::errors::ScopeError;

// ── RepoKey ────────────────────────────────────────────────────────────────

/// Composite `projectKey/repositorySlug` identity.
///
/// The only key used for selection and override lookups. A `RepoKey` can
/// only be built from a non-empty project key and a non-empty slug, neither
/// of which contains `/`, so every key decodes back into exactly the two
/// segments it was built from. Ordering is the lexical order of the
/// composite string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoKey {
    key: String,
    split: usize,
}

impl RepoKey {
    /// Build a key, or `None` when either segment is empty or contains `/`.
    pub fn new(project_key: &str, repository_slug: &str) -> Option<Self> {
        if project_key.is_empty()
            || repository_slug.is_empty()
            || project_key.contains('/')
            || repository_slug.contains('/')
        {
            return None;
        }
        Some(Self {
            key: format!("{project_key}/{repository_slug}"),
            split: project_key.len(),
        })
    }

    /// Decode a composite key. Anything other than exactly two non-empty
    /// segments is rejected.
    pub fn parse(raw: &str) -> Option<Self> {
        let (project_key, repository_slug) = raw.split_once('/')?;
        Self::new(project_key, repository_slug)
    }

    pub fn project_key(&self) -> &str {
        &self.key[..self.split]
    }

    pub fn repository_slug(&self) -> &str {
        &self.key[self.split + 1..]
    }

    pub fn as_str(&self) -> &str {
        &self.key
    }

    /// Split back into a wire reference.
    pub fn to_ref(&self) -> RepositoryRef {
        RepositoryRef {
            project_key: self.project_key().to_string(),
            repository_slug: self.repository_slug().to_string(),
        }
    }
}

impl fmt::Display for RepoKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

impl FromStr for RepoKey {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| ScopeError::InvalidSelection {
            reason: format!("'{s}' is not a PROJECT/slug repository key"),
        })
    }
}

impl Serialize for RepoKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key)
    }
}

impl<'de> Deserialize<'de> for RepoKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        RepoKey::parse(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid repository key '{raw}'")))
    }
}

// ── Catalog records ────────────────────────────────────────────────────────

/// Treats JSON `null` the same as an absent field.
fn string_or_default<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

/// A repository as reported by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRecord {
    #[serde(default, deserialize_with = "string_or_default")]
    pub repository_slug: String,
    #[serde(default)]
    pub repository_name: Option<String>,
}

impl RepositoryRecord {
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            repository_slug: slug.into(),
            repository_name: Some(name.into()),
        }
    }

    /// Display name, falling back to the slug.
    pub fn display_name(&self) -> &str {
        match self.repository_name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => &self.repository_slug,
        }
    }
}

/// A project and its repositories as reported by the catalog provider.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectRecord {
    #[serde(default, deserialize_with = "string_or_default")]
    pub project_key: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub project_name: String,
    #[serde(default)]
    pub personal: bool,
    /// Server-side project type (`NORMAL`, `PERSONAL`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub repositories: Vec<RepositoryRecord>,
}

impl ProjectRecord {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            project_key: key.into(),
            project_name: name.into(),
            ..Self::default()
        }
    }

    pub fn with_repository(mut self, slug: &str, name: &str) -> Self {
        self.repositories.push(RepositoryRecord::new(slug, name));
        self
    }

    pub fn personal(mut self) -> Self {
        self.personal = true;
        self
    }

    /// Personal either by flag or by a `PERSONAL` project type.
    pub fn is_personal(&self) -> bool {
        self.personal
            || self
                .project_type
                .as_deref()
                .is_some_and(|t| t.eq_ignore_ascii_case("personal"))
    }
}

/// One complete, immutable catalog fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogSnapshot {
    pub fetched_at: DateTime<Utc>,
    pub projects: Vec<ProjectRecord>,
}

impl CatalogSnapshot {
    pub fn new(fetched_at: DateTime<Utc>, projects: Vec<ProjectRecord>) -> Self {
        Self {
            fetched_at,
            projects,
        }
    }

    /// Raw repository count, malformed records included.
    pub fn repository_count(&self) -> usize {
        self.projects.iter().map(|p| p.repositories.len()).sum()
    }
}

/// One page of the paginated catalog read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogPage {
    #[serde(default)]
    pub projects: Vec<ProjectRecord>,
    /// Advisory total number of projects across all pages.
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub start: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// ── Scope mode & overrides ─────────────────────────────────────────────────

/// Whether the review profile applies to every repository or an allow-list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ScopeMode {
    /// All repositories, present and future.
    #[default]
    #[serde(rename = "all")]
    Global,
    /// An explicit allow-list of repositories.
    #[serde(rename = "repositories")]
    Scoped,
}

impl ScopeMode {
    pub fn as_wire(self) -> &'static str {
        match self {
            Self::Global => "all",
            Self::Scoped => "repositories",
        }
    }

    pub fn is_global(self) -> bool {
        matches!(self, Self::Global)
    }
}

impl fmt::Display for ScopeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_wire())
    }
}

impl FromStr for ScopeMode {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" | "global" => Ok(Self::Global),
            "repositories" | "scoped" => Ok(Self::Scoped),
            other => Err(ScopeError::InvalidSelection {
                reason: format!("unknown scope mode '{other}' (expected 'all' or 'repositories')"),
            }),
        }
    }
}

/// Server-persisted per-repository record, mirrored locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideRecord {
    #[serde(default, deserialize_with = "string_or_default")]
    pub project_key: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub repository_slug: String,
    #[serde(default)]
    pub inherit_global: bool,
    /// Milliseconds since the Unix epoch.
    #[serde(default, alias = "modifiedDate")]
    pub modified_at: Option<i64>,
    #[serde(default)]
    pub modified_by: Option<String>,
    /// Repository-specific configuration values, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<serde_json::Value>,
}

impl OverrideRecord {
    pub fn repo_key(&self) -> Option<RepoKey> {
        RepoKey::new(&self.project_key, &self.repository_slug)
    }
}

/// `{projectKey, repositorySlug}` as sent in a save payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryRef {
    pub project_key: String,
    pub repository_slug: String,
}

/// Body of a scope write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavePayload {
    pub mode: ScopeMode,
    pub repositories: Vec<RepositoryRef>,
}

/// Canonical scope state as returned by the persistence service, both from
/// the configuration read and from a scope write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeResponse {
    #[serde(alias = "scopeMode", default)]
    pub mode: ScopeMode,
    #[serde(default)]
    pub repository_overrides: Vec<OverrideRecord>,
}
