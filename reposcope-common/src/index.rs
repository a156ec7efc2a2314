//! Lookup tables derived from a catalog snapshot.
//!
//! Rebuilt whenever the snapshot changes. Malformed records are skipped and
//! counted, never fatal.

use std::collections::HashMap;
use tracing::warn;

use crate::errors::ScopeError;
use crate::types::{CatalogSnapshot, ProjectRecord, RepoKey, RepositoryRecord};

/// One repository with its owning project's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedRepository {
    pub project_key: String,
    pub project_name: String,
    pub repository_slug: String,
    pub repository_name: String,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogIndex {
    projects_by_key: HashMap<String, ProjectRecord>,
    repos_by_key: HashMap<RepoKey, IndexedRepository>,
    skipped: Vec<ScopeError>,
}

impl CatalogIndex {
    /// Index every well-formed record of `snapshot`.
    pub fn build(snapshot: &CatalogSnapshot) -> Self {
        Self::from_projects(&snapshot.projects)
    }

    pub fn from_projects(projects: &[ProjectRecord]) -> Self {
        let mut index = Self::default();

        for project in projects {
            if project.project_key.is_empty() {
                index.skip(format!(
                    "project '{}' has no project key",
                    project.project_name
                ));
                continue;
            }
            if index.projects_by_key.contains_key(&project.project_key) {
                index.skip(format!("duplicate project key '{}'", project.project_key));
                continue;
            }

            let mut kept: Vec<RepositoryRecord> = Vec::with_capacity(project.repositories.len());
            for repo in &project.repositories {
                let Some(key) = RepoKey::new(&project.project_key, &repo.repository_slug) else {
                    index.skip(format!(
                        "repository in project '{}' has an invalid slug '{}'",
                        project.project_key, repo.repository_slug
                    ));
                    continue;
                };
                if index.repos_by_key.contains_key(&key) {
                    index.skip(format!("duplicate repository '{key}'"));
                    continue;
                }
                index.repos_by_key.insert(
                    key,
                    IndexedRepository {
                        project_key: project.project_key.clone(),
                        project_name: project.project_name.clone(),
                        repository_slug: repo.repository_slug.clone(),
                        repository_name: repo.display_name().to_string(),
                    },
                );
                kept.push(repo.clone());
            }

            let mut indexed = project.clone();
            indexed.repositories = kept;
            index
                .projects_by_key
                .insert(project.project_key.clone(), indexed);
        }

        index
    }

    fn skip(&mut self, detail: String) {
        let error = ScopeError::MalformedCatalogRecord { detail };
        warn!("Skipping catalog record: {}", error);
        self.skipped.push(error);
    }

    pub fn project(&self, project_key: &str) -> Option<&ProjectRecord> {
        self.projects_by_key.get(project_key)
    }

    pub fn repository(&self, key: &RepoKey) -> Option<&IndexedRepository> {
        self.repos_by_key.get(key)
    }

    pub fn contains(&self, key: &RepoKey) -> bool {
        self.repos_by_key.contains_key(key)
    }

    pub fn total_repository_count(&self) -> usize {
        self.repos_by_key.len()
    }

    pub fn project_count(&self) -> usize {
        self.projects_by_key.len()
    }

    /// Records dropped while indexing.
    pub fn skipped(&self) -> &[ScopeError] {
        &self.skipped
    }

    pub fn repo_keys(&self) -> impl Iterator<Item = &RepoKey> {
        self.repos_by_key.keys()
    }
}
