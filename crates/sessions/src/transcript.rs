//! Branch resolution: folds a thread's message forest into a linear
//! transcript (or a navigable tree) under the active-branch policy.

use std::collections::{HashMap, HashSet};

use sa_domain::{CanonicalMessage, Error, Result, RunStatus};
use serde::Serialize;

/// Picks an explicit child at a named fork point; falls back to the
/// preference policy (prefer-committed, then latest-order) when no
/// selector is given for that fork.
#[derive(Debug, Clone, Default)]
pub struct BranchSelector {
    choices: HashMap<String, String>,
}

impl BranchSelector {
    pub fn new() -> Self {
        Self::default()
    }

    /// `fork_message_id -> chosen_child_id`. Values must be message ids;
    /// callers passing a non-string selector reject before constructing one.
    pub fn with_choice(mut self, fork_message_id: impl Into<String>, child_id: impl Into<String>) -> Self {
        self.choices.insert(fork_message_id.into(), child_id.into());
        self
    }

    fn choice_for(&self, fork_message_id: &str) -> Option<&str> {
        self.choices.get(fork_message_id).map(String::as_str)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForkPoint {
    pub fork_message_id: String,
    pub children: Vec<String>,
    pub active_child_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThreadTree {
    pub nodes: Vec<CanonicalMessage>,
    pub fork_points: Vec<ForkPoint>,
}

struct Forest<'a> {
    children_of: HashMap<Option<&'a str>, Vec<&'a CanonicalMessage>>,
    roots: Vec<&'a CanonicalMessage>,
}

fn build_forest(nodes: &[CanonicalMessage]) -> Forest<'_> {
    let known_ids: HashSet<&str> = nodes.iter().map(|m| m.id.as_str()).collect();
    let mut children_of: HashMap<Option<&str>, Vec<&CanonicalMessage>> = HashMap::new();
    for node in nodes {
        children_of
            .entry(node.parent_message_id.as_deref())
            .or_default()
            .push(node);
    }
    for children in children_of.values_mut() {
        children.sort_by_key(|m| m.order);
    }
    // A parent id that isn't any node's id (e.g. a fork anchor that was
    // never itself persisted) roots the forest the same as a null parent.
    let mut roots: Vec<&CanonicalMessage> = children_of.get(&None).cloned().unwrap_or_default();
    for node in nodes {
        if let Some(parent_id) = node.parent_message_id.as_deref() {
            if !known_ids.contains(parent_id) {
                roots.push(node);
            }
        }
    }
    roots.sort_by_key(|m| m.order);
    Forest { children_of, roots }
}

/// Chooses the active child among `candidates` (already sorted by `order`
/// ascending) for the fork rooted at `fork_key`.
fn pick_active_child<'a>(
    fork_key: &str,
    candidates: &[&'a CanonicalMessage],
    run_status: &HashMap<String, RunStatus>,
    branch: &BranchSelector,
) -> Result<&'a CanonicalMessage> {
    if let Some(chosen_id) = branch.choice_for(fork_key) {
        return candidates
            .iter()
            .find(|m| m.id == chosen_id)
            .copied()
            .ok_or_else(|| Error::structural(format!("branch selector names unknown child {chosen_id:?} at fork {fork_key}")));
    }

    let mut best_committed: Option<&CanonicalMessage> = None;
    for m in candidates {
        let status = run_status
            .get(&m.run_id)
            .ok_or_else(|| Error::structural(format!("message {} has run_id {} with no status", m.id, m.run_id)))?;
        if *status == RunStatus::Committed {
            match best_committed {
                Some(current) if current.order >= m.order => {}
                _ => best_committed = Some(m),
            }
        }
    }
    if let Some(m) = best_committed {
        return Ok(m);
    }

    candidates
        .iter()
        .max_by_key(|m| m.order)
        .copied()
        .ok_or_else(|| Error::structural(format!("fork {fork_key} has no candidate children")))
}

const ROOT_FORK_KEY: &str = "";

/// Returns the active linear transcript for a thread under `branch`.
///
/// Walks from the active root, following the single child at a straight
/// run and the policy-chosen child at a fork, until a leaf. A cycle (two
/// messages pointing at each other) is caught by the visited-set and ends
/// that walk without error rather than looping forever.
pub(crate) fn resolve_transcript(
    nodes: &[CanonicalMessage],
    run_status: &HashMap<String, RunStatus>,
    branch: &BranchSelector,
) -> Result<Vec<CanonicalMessage>> {
    let forest = build_forest(nodes);
    let active_root = match forest.roots.len() {
        0 => return Ok(vec![]),
        1 => forest.roots[0],
        _ => pick_active_child(ROOT_FORK_KEY, &forest.roots, run_status, branch)?,
    };

    let mut out = Vec::new();
    let mut visited = HashSet::new();
    let mut current = Some(active_root);
    while let Some(node) = current {
        if !visited.insert(node.id.clone()) {
            break;
        }
        out.push(node.clone());
        let children = forest
            .children_of
            .get(&Some(node.id.as_str()))
            .cloned()
            .unwrap_or_default();
        current = match children.len() {
            0 => None,
            1 => Some(children[0]),
            _ => Some(pick_active_child(&node.id, &children, run_status, branch)?),
        };
    }
    Ok(out)
}

/// Returns every message in the thread plus the fork points (including a
/// synthetic one for orphan-root siblings), each resolved to its active
/// child under the same policy `resolve_transcript` uses.
pub(crate) fn resolve_thread_tree(
    nodes: &[CanonicalMessage],
    run_status: &HashMap<String, RunStatus>,
    branch: &BranchSelector,
) -> Result<ThreadTree> {
    let forest = build_forest(nodes);
    let mut fork_points = Vec::new();

    if forest.roots.len() > 1 {
        let active = pick_active_child(ROOT_FORK_KEY, &forest.roots, run_status, branch)?;
        fork_points.push(ForkPoint {
            fork_message_id: ROOT_FORK_KEY.to_string(),
            children: forest.roots.iter().map(|m| m.id.clone()).collect(),
            active_child_id: active.id.clone(),
        });
    }

    let mut parent_keys: Vec<&str> = forest
        .children_of
        .keys()
        .filter_map(|k| k.as_deref())
        .collect();
    parent_keys.sort_unstable();
    for parent_id in parent_keys {
        let children = &forest.children_of[&Some(parent_id)];
        if children.len() < 2 {
            continue;
        }
        let active = pick_active_child(parent_id, children, run_status, branch)?;
        fork_points.push(ForkPoint {
            fork_message_id: parent_id.to_string(),
            children: children.iter().map(|m| m.id.clone()).collect(),
            active_child_id: active.id.clone(),
        });
    }

    let mut nodes_out = nodes.to_vec();
    nodes_out.sort_by_key(|m| m.order);
    Ok(ThreadTree {
        nodes: nodes_out,
        fork_points,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sa_domain::{CanonicalPart, Role};

    fn msg(id: &str, run_id: &str, parent: Option<&str>, order: u64) -> CanonicalMessage {
        CanonicalMessage {
            id: id.to_string(),
            run_id: run_id.to_string(),
            thread_id: "t1".to_string(),
            parent_message_id: parent.map(str::to_string),
            role: Role::Assistant,
            parts: vec![CanonicalPart::Text { text: id.to_string() }],
            created_at: Utc::now(),
            order,
            metadata: serde_json::json!({"schema_version": 1}),
        }
    }

    #[test]
    fn linear_chain_has_no_forks() {
        let nodes = vec![msg("m1", "r1", None, 0), msg("m2", "r1", Some("m1"), 1)];
        let status = HashMap::from([("r1".to_string(), RunStatus::Committed)]);
        let transcript = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap();
        assert_eq!(
            transcript.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(),
            vec!["m1", "m2"]
        );
    }

    #[test]
    fn fork_prefers_committed_over_streaming() {
        let nodes = vec![
            msg("root", "r0", None, 0),
            msg("a", "r1", Some("root"), 1),
            msg("b", "r2", Some("root"), 2),
        ];
        let status = HashMap::from([
            ("r0".to_string(), RunStatus::Committed),
            ("r1".to_string(), RunStatus::Failed),
            ("r2".to_string(), RunStatus::Committed),
        ]);
        let transcript = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap();
        assert_eq!(transcript.last().unwrap().id, "b");
    }

    #[test]
    fn fork_falls_back_to_latest_order_when_none_committed() {
        let nodes = vec![
            msg("root", "r0", None, 0),
            msg("a", "r1", Some("root"), 1),
            msg("b", "r2", Some("root"), 2),
        ];
        let status = HashMap::from([
            ("r0".to_string(), RunStatus::Committed),
            ("r1".to_string(), RunStatus::Failed),
            ("r2".to_string(), RunStatus::Cancelled),
        ]);
        let transcript = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap();
        assert_eq!(transcript.last().unwrap().id, "b");
    }

    #[test]
    fn explicit_selector_overrides_policy() {
        let nodes = vec![
            msg("root", "r0", None, 0),
            msg("a", "r1", Some("root"), 1),
            msg("b", "r2", Some("root"), 2),
        ];
        let status = HashMap::from([
            ("r0".to_string(), RunStatus::Committed),
            ("r1".to_string(), RunStatus::Committed),
            ("r2".to_string(), RunStatus::Committed),
        ]);
        let branch = BranchSelector::new().with_choice("root", "a");
        let transcript = resolve_transcript(&nodes, &status, &branch).unwrap();
        assert_eq!(transcript.last().unwrap().id, "a");
    }

    #[test]
    fn missing_run_status_is_structural_error() {
        let nodes = vec![
            msg("root", "r0", None, 0),
            msg("a", "r1", Some("root"), 1),
            msg("b", "r2", Some("root"), 2),
        ];
        let status = HashMap::from([("r0".to_string(), RunStatus::Committed)]);
        let err = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap_err();
        assert!(matches!(err, Error::Structural(_)));
    }

    #[test]
    fn thread_tree_reports_fork_points() {
        let nodes = vec![
            msg("root", "r0", None, 0),
            msg("a", "r1", Some("root"), 1),
            msg("b", "r2", Some("root"), 2),
        ];
        let status = HashMap::from([
            ("r0".to_string(), RunStatus::Committed),
            ("r1".to_string(), RunStatus::Committed),
            ("r2".to_string(), RunStatus::Committed),
        ]);
        let tree = resolve_thread_tree(&nodes, &status, &BranchSelector::default()).unwrap();
        assert_eq!(tree.fork_points.len(), 1);
        assert_eq!(tree.fork_points[0].children.len(), 2);
        assert_eq!(tree.fork_points[0].active_child_id, "b");
    }

    #[test]
    fn dangling_parent_roots_the_forest() {
        // parent_message_id points at a fork anchor that was never itself
        // persisted as a message (e.g. a `fork_from_message_id` that named
        // a message outside this thread). It must root, not vanish.
        let nodes = vec![msg("m1", "r1", Some("u1"), 0)];
        let status = HashMap::from([("r1".to_string(), RunStatus::Committed)]);
        let transcript = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap();
        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].id, "m1");
    }

    #[test]
    fn cycle_terminates_without_error() {
        // Neither node has a null parent, so there are zero roots: the
        // walk never starts and the cycle is moot, matching "corrupt data
        // is tolerated, not silently trusted as a valid forest".
        let a = msg("a", "r1", Some("b"), 0);
        let b = msg("b", "r1", Some("a"), 1);
        let nodes = vec![a, b];
        let status = HashMap::from([("r1".to_string(), RunStatus::Committed)]);
        let transcript = resolve_transcript(&nodes, &status, &BranchSelector::default()).unwrap();
        assert!(transcript.is_empty());
    }
}
