//! Plain-text views of the tree and the pending changes.

use reposcope_common::tristate::NodeState;
use reposcope_common::{DiffSummary, RepoDiffRow, ScopeTree, TriState, TriStateMap};
use std::fmt::Write;

fn counts(node: &NodeState) -> String {
    format!("({}/{})", node.selected, node.total)
}

/// Indented checkbox tree, one node per line.
pub fn tree(tree: &ScopeTree, states: &TriStateMap) -> String {
    let mut out = String::new();
    let suffix = if states.disabled { "  [global]" } else { "" };
    let _ = writeln!(
        out,
        "{} {} {}{}",
        states.all.state.marker(),
        tree.label,
        counts(&states.all),
        suffix
    );

    for group in &tree.groups {
        let state = states.group(group.kind).unwrap_or(TriState::Unchecked);
        let total = group.repository_count();
        let _ = writeln!(out, "  {} {} ({})", state.marker(), group.label, total);

        for project in &group.projects {
            let node = states.projects.get(&project.project_key);
            let marker = node.map_or(TriState::Unchecked, |n| n.state).marker();
            let tally = node.map(counts).unwrap_or_default();
            let _ = writeln!(out, "    {} {} {}", marker, project.label, tally);

            for repo in &project.repositories {
                let checked = states.repository(&repo.key).unwrap_or(false);
                let marker = if checked {
                    TriState::Checked
                } else {
                    TriState::Unchecked
                }
                .marker();
                let _ = writeln!(out, "      {} {}  {}", marker, repo.label, repo.key);
            }
        }
    }
    out
}

/// Pending-changes table followed by the summary line. Rows a save would
/// change are flagged with `*`.
pub fn diff(rows: &[RepoDiffRow], summary: &DiffSummary) -> String {
    let mut out = String::new();
    if rows.is_empty() {
        let _ = writeln!(out, "No repository overrides.");
        return out;
    }

    let width = rows
        .iter()
        .map(|r| r.key.as_str().len())
        .max()
        .unwrap_or(0)
        .max("REPOSITORY".len());
    let _ = writeln!(out, "  {:<width$}  {:<32}  {}", "REPOSITORY", "STATUS", "MODIFIED BY");
    for row in rows {
        let flag = if row.classification.is_pending() { '*' } else { ' ' };
        let _ = writeln!(
            out,
            "{} {:<width$}  {:<32}  {}",
            flag,
            row.key.as_str(),
            row.classification.label(),
            row.modified_by.as_deref().unwrap_or("-"),
        );
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "{summary}");
    out
}
