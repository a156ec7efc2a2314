//! Tri-state checkbox aggregation over a tree and a selection.
//!
//! [`aggregate`] is pure: the result depends only on its two arguments, and
//! nothing it returns is stored back into the engine.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::state::ScopeState;
use crate::tree::{GroupKind, ProjectNode, ScopeTree};
use crate::types::RepoKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    Checked,
    Unchecked,
    Indeterminate,
}

impl TriState {
    /// All, none, or some of `total` leaves selected. Zero leaves is unchecked.
    pub fn from_counts(selected: usize, total: usize) -> Self {
        if total == 0 || selected == 0 {
            Self::Unchecked
        } else if selected >= total {
            Self::Checked
        } else {
            Self::Indeterminate
        }
    }

    /// Terminal rendering: `[x]`, `[ ]`, `[-]`.
    pub fn marker(self) -> &'static str {
        match self {
            Self::Checked => "[x]",
            Self::Unchecked => "[ ]",
            Self::Indeterminate => "[-]",
        }
    }
}

/// State of one non-leaf node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeState {
    pub state: TriState,
    /// Selected leaves below this node.
    pub selected: usize,
    pub total: usize,
}

/// Checkbox state for every node of a tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TriStateMap {
    /// GLOBAL renders every checkbox below All as checked and disabled.
    pub disabled: bool,
    pub all: NodeState,
    pub groups: BTreeMap<GroupKind, NodeState>,
    pub projects: BTreeMap<String, NodeState>,
    pub repositories: BTreeMap<RepoKey, bool>,
}

impl TriStateMap {
    pub fn project(&self, project_key: &str) -> Option<TriState> {
        self.projects.get(project_key).map(|n| n.state)
    }

    pub fn group(&self, kind: GroupKind) -> Option<TriState> {
        self.groups.get(&kind).map(|n| n.state)
    }

    pub fn repository(&self, key: &RepoKey) -> Option<bool> {
        self.repositories.get(key).copied()
    }
}

/// Compute the tri-state of every node.
pub fn aggregate(tree: &ScopeTree, state: &ScopeState) -> TriStateMap {
    let global = state.is_global();
    let mut groups = BTreeMap::new();
    let mut projects = BTreeMap::new();
    let mut repositories = BTreeMap::new();
    let mut all_selected = 0usize;

    for group in &tree.groups {
        let mut group_selected = 0usize;
        let mut project_states = Vec::with_capacity(group.projects.len());

        for project in &group.projects {
            let node = project_state(project, state, &mut repositories);
            group_selected += node.selected;
            project_states.push(node.state);
            projects.insert(project.project_key.clone(), node);
        }

        let group_state = if global {
            TriState::Checked
        } else {
            combine(&project_states)
        };
        groups.insert(
            group.kind,
            NodeState {
                state: group_state,
                selected: group_selected,
                total: group.repository_count(),
            },
        );
        all_selected += group_selected;
    }

    let total = tree.repository_count();
    let all_state = if global || all_selected >= total {
        TriState::Checked
    } else if all_selected == 0 {
        TriState::Unchecked
    } else {
        TriState::Indeterminate
    };

    TriStateMap {
        disabled: global,
        all: NodeState {
            state: all_state,
            selected: all_selected,
            total,
        },
        groups,
        projects,
        repositories,
    }
}

fn project_state(
    project: &ProjectNode,
    state: &ScopeState,
    leaves: &mut BTreeMap<RepoKey, bool>,
) -> NodeState {
    let mut selected = 0usize;
    for key in project.keys() {
        let checked = state.is_selected(key);
        if checked {
            selected += 1;
        }
        leaves.insert(key.clone(), checked);
    }
    let total = project.repository_count();
    let node_state = if state.is_global() {
        TriState::Checked
    } else {
        TriState::from_counts(selected, total)
    };
    NodeState {
        state: node_state,
        selected,
        total,
    }
}

/// Group rule: all children checked, all unchecked, or mixed.
fn combine(children: &[TriState]) -> TriState {
    if children.is_empty() {
        TriState::Unchecked
    } else if children.iter().all(|s| *s == TriState::Checked) {
        TriState::Checked
    } else if children.iter().all(|s| *s == TriState::Unchecked) {
        TriState::Unchecked
    } else {
        TriState::Indeterminate
    }
}
