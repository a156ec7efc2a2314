//! Read-only hierarchy: All → Group → Project → Repository.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::config::TreeLabels;
use crate::errors::ScopeError;
use crate::types::{CatalogSnapshot, ProjectRecord, RepoKey};

/// Which group a project belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Org,
    Personal,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Org => "org",
            Self::Personal => "personal",
        }
    }

    pub fn of(project: &ProjectRecord) -> Self {
        if project.is_personal() {
            Self::Personal
        } else {
            Self::Org
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupKind {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "org" | "project" | "projects" => Ok(Self::Org),
            "personal" => Ok(Self::Personal),
            other => Err(ScopeError::InvalidSelection {
                reason: format!("unknown group '{other}' (expected 'org' or 'personal')"),
            }),
        }
    }
}

/// Projects split by group, each sorted case-insensitively by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub org_projects: Vec<ProjectRecord>,
    pub personal_projects: Vec<ProjectRecord>,
}

/// Split a snapshot into org and personal projects.
///
/// Projects without a key are dropped, and only the first project with a
/// given key is kept, matching [`CatalogIndex`](crate::index::CatalogIndex).
pub fn partition(snapshot: &CatalogSnapshot) -> Partition {
    let mut seen = HashSet::new();
    let mut parts = Partition::default();

    for project in &snapshot.projects {
        if project.project_key.is_empty() || !seen.insert(project.project_key.as_str()) {
            continue;
        }
        match GroupKind::of(project) {
            GroupKind::Org => parts.org_projects.push(project.clone()),
            GroupKind::Personal => parts.personal_projects.push(project.clone()),
        }
    }

    let by_key = |a: &ProjectRecord, b: &ProjectRecord| {
        a.project_key
            .to_lowercase()
            .cmp(&b.project_key.to_lowercase())
            .then_with(|| a.project_key.cmp(&b.project_key))
    };
    parts.org_projects.sort_by(by_key);
    parts.personal_projects.sort_by(by_key);
    parts
}

// ── Nodes ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryNode {
    pub key: RepoKey,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectNode {
    pub project_key: String,
    pub project_name: String,
    pub label: String,
    pub group: GroupKind,
    pub repositories: Vec<RepositoryNode>,
}

impl ProjectNode {
    pub fn repository_count(&self) -> usize {
        self.repositories.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RepoKey> {
        self.repositories.iter().map(|r| &r.key)
    }

    fn from_record(project: &ProjectRecord, group: GroupKind) -> Self {
        let mut seen = HashSet::new();
        let mut repositories: Vec<RepositoryNode> = project
            .repositories
            .iter()
            .filter_map(|repo| {
                let key = RepoKey::new(&project.project_key, &repo.repository_slug)?;
                seen.insert(key.clone()).then(|| RepositoryNode {
                    key,
                    label: repo.display_name().to_string(),
                })
            })
            .collect();
        repositories.sort_by(|a, b| {
            let (sa, sb) = (a.key.repository_slug(), b.key.repository_slug());
            sa.to_lowercase().cmp(&sb.to_lowercase()).then_with(|| sa.cmp(sb))
        });

        Self {
            project_key: project.project_key.clone(),
            project_name: project.project_name.clone(),
            label: project_label(&project.project_key, &project.project_name),
            group,
            repositories,
        }
    }
}

/// `KEY · Name`, or just the key when the name adds nothing.
pub fn project_label(project_key: &str, project_name: &str) -> String {
    if project_name.is_empty() || project_name == project_key {
        project_key.to_string()
    } else {
        format!("{project_key} · {project_name}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupNode {
    pub kind: GroupKind,
    pub label: String,
    pub projects: Vec<ProjectNode>,
}

impl GroupNode {
    pub fn repository_count(&self) -> usize {
        self.projects.iter().map(ProjectNode::repository_count).sum()
    }

    pub fn keys(&self) -> impl Iterator<Item = &RepoKey> {
        self.projects.iter().flat_map(ProjectNode::keys)
    }
}

/// The whole tree. Groups without projects are omitted; org comes first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeTree {
    pub label: String,
    pub groups: Vec<GroupNode>,
}

impl ScopeTree {
    pub fn build(snapshot: &CatalogSnapshot, labels: &TreeLabels) -> Self {
        let parts = partition(snapshot);
        let mut groups = Vec::with_capacity(2);
        for (kind, projects, label) in [
            (GroupKind::Org, &parts.org_projects, &labels.org_group),
            (GroupKind::Personal, &parts.personal_projects, &labels.personal_group),
        ] {
            if projects.is_empty() {
                continue;
            }
            groups.push(GroupNode {
                kind,
                label: label.clone(),
                projects: projects
                    .iter()
                    .map(|p| ProjectNode::from_record(p, kind))
                    .collect(),
            });
        }

        Self {
            label: labels.all.clone(),
            groups,
        }
    }

    pub fn repository_count(&self) -> usize {
        self.groups.iter().map(GroupNode::repository_count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn group(&self, kind: GroupKind) -> Option<&GroupNode> {
        self.groups.iter().find(|g| g.kind == kind)
    }

    pub fn project(&self, project_key: &str) -> Option<&ProjectNode> {
        self.groups
            .iter()
            .flat_map(|g| g.projects.iter())
            .find(|p| p.project_key == project_key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &RepoKey> {
        self.groups.iter().flat_map(GroupNode::keys)
    }

    /// Repository keys under a group; empty when the group is absent.
    pub fn group_keys(&self, kind: GroupKind) -> Vec<RepoKey> {
        self.group(kind)
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Repository keys under a project; empty when the project is unknown.
    pub fn project_keys(&self, project_key: &str) -> Vec<RepoKey> {
        self.project(project_key)
            .map(|p| p.keys().cloned().collect())
            .unwrap_or_default()
    }
}
