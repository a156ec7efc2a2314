//! Where the catalog and the persisted scope come from.
//!
//! Either side can be the REST service or a local JSON file. The file-backed
//! persistence answers saves the way the service does, so a scope can be
//! edited offline and inspected with `diff`.

use reposcope_common::ScopeError;
use reposcope_common::catalog::CatalogProvider;
use reposcope_common::engine::ScopePersistence;
use reposcope_common::http::{RestCatalogProvider, RestScopePersistence};
use reposcope_common::types::{
    CatalogPage, OverrideRecord, ProjectRecord, SavePayload, ScopeMode, ScopeResponse,
};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

// ── Catalog ────────────────────────────────────────────────────────────────

/// A catalog file holds either a bare project list or one full page.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Projects(Vec<ProjectRecord>),
    Page(CatalogPage),
}

impl CatalogFile {
    fn into_projects(self) -> Vec<ProjectRecord> {
        match self {
            Self::Projects(projects) => projects,
            Self::Page(page) => page.projects,
        }
    }
}

/// Serves a JSON catalog file in pages.
#[derive(Debug, Clone)]
pub struct FileCatalogProvider {
    path: PathBuf,
}

impl FileCatalogProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    async fn read(&self) -> Result<Vec<ProjectRecord>, ScopeError> {
        let raw = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| ScopeError::catalog_unavailable(format!("{}: {e}", self.path.display())))?;
        serde_json::from_str::<CatalogFile>(&raw)
            .map(CatalogFile::into_projects)
            .map_err(|e| ScopeError::catalog_unavailable(format!("{}: {e}", self.path.display())))
    }
}

impl CatalogProvider for FileCatalogProvider {
    async fn fetch_page(&self, start: usize, limit: usize) -> Result<CatalogPage, ScopeError> {
        let projects = self.read().await?;
        let total = projects.len();
        debug!("Serving {}..{} of {} from {:?}", start, start + limit, total, self.path);
        Ok(CatalogPage {
            projects: projects.into_iter().skip(start).take(limit).collect(),
            total: Some(total),
            start: Some(start),
            limit: Some(limit),
        })
    }
}

pub enum CatalogSource {
    Rest(RestCatalogProvider),
    File(FileCatalogProvider),
}

impl CatalogProvider for CatalogSource {
    async fn fetch_page(&self, start: usize, limit: usize) -> Result<CatalogPage, ScopeError> {
        match self {
            Self::Rest(provider) => provider.fetch_page(start, limit).await,
            Self::File(provider) => provider.fetch_page(start, limit).await,
        }
    }
}

// ── Persisted scope ────────────────────────────────────────────────────────

/// Keeps the persisted scope in a JSON file shaped like the service's
/// configuration response.
#[derive(Debug, Clone)]
pub struct FileScopePersistence {
    path: PathBuf,
    author: Option<String>,
}

impl FileScopePersistence {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            author: None,
        }
    }

    /// Name recorded as `modifiedBy` on overrides created by a save.
    pub fn with_author(mut self, author: Option<String>) -> Self {
        self.author = author;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read(&self) -> Result<ScopeResponse, String> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => serde_json::from_str(&raw).map_err(|e| e.to_string()),
            // No file yet means nothing was ever saved.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ScopeResponse {
                mode: ScopeMode::Global,
                repository_overrides: Vec::new(),
            }),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn write(&self, response: &ScopeResponse) -> Result<(), String> {
        let body = serde_json::to_string_pretty(response).map_err(|e| e.to_string())?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await.map_err(|e| e.to_string())?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| e.to_string())
    }
}

/// The scope the service would hold after accepting `payload`.
///
/// GLOBAL drops every override. SCOPED keeps the records of repositories
/// that stay selected and creates inheriting records for new ones.
pub fn apply_save(
    current: &ScopeResponse,
    payload: &SavePayload,
    modified_at: i64,
    author: Option<&str>,
) -> ScopeResponse {
    if payload.mode.is_global() {
        return ScopeResponse {
            mode: ScopeMode::Global,
            repository_overrides: Vec::new(),
        };
    }

    let existing: HashMap<(&str, &str), &OverrideRecord> = current
        .repository_overrides
        .iter()
        .map(|o| ((o.project_key.as_str(), o.repository_slug.as_str()), o))
        .collect();
    let repository_overrides = payload
        .repositories
        .iter()
        .map(|r| {
            match existing.get(&(r.project_key.as_str(), r.repository_slug.as_str())) {
                Some(record) => (*record).clone(),
                None => OverrideRecord {
                    project_key: r.project_key.clone(),
                    repository_slug: r.repository_slug.clone(),
                    inherit_global: true,
                    modified_at: Some(modified_at),
                    modified_by: author.map(str::to_string),
                    overrides: None,
                },
            }
        })
        .collect();

    ScopeResponse {
        mode: ScopeMode::Scoped,
        repository_overrides,
    }
}

impl ScopePersistence for FileScopePersistence {
    async fn load_current(&self) -> Result<ScopeResponse, ScopeError> {
        self.read()
            .await
            .map_err(|e| ScopeError::scope_unavailable(format!("{}: {e}", self.path.display())))
    }

    async fn save(&self, payload: &SavePayload) -> Result<ScopeResponse, ScopeError> {
        let reject = |e: String| ScopeError::save_rejected(format!("{}: {e}", self.path.display()));
        let current = self.read().await.map_err(reject)?;
        let next = apply_save(
            &current,
            payload,
            chrono::Utc::now().timestamp_millis(),
            self.author.as_deref(),
        );
        self.write(&next).await.map_err(reject)?;
        Ok(next)
    }
}

pub enum ScopeSource {
    Rest(RestScopePersistence),
    File(FileScopePersistence),
}

impl ScopePersistence for ScopeSource {
    async fn load_current(&self) -> Result<ScopeResponse, ScopeError> {
        match self {
            Self::Rest(persistence) => persistence.load_current().await,
            Self::File(persistence) => persistence.load_current().await,
        }
    }

    async fn save(&self, payload: &SavePayload) -> Result<ScopeResponse, ScopeError> {
        match self {
            Self::Rest(persistence) => persistence.save(payload).await,
            Self::File(persistence) => persistence.save(payload).await,
        }
    }
}
