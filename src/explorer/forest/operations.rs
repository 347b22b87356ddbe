//! Event-driven mutations of the test forest.
//!
//! This module contains:
//! - `add_suite()` - create a suite, healing the package path on the way
//! - `add_test_cases()` - replace a suite's test cases
//! - `remove_item()` - delete an item and prune emptied packages
//! - `update_suite_location()` - move a suite without changing its identity
//! - `apply_update()` - apply one build target's event batch
//! - `snapshot()` - serialisable read-only view of the forest

use super::{TestForest, TestNode};
use crate::error_ext::ResultExt;
use crate::explorer::path::{last_segment, TestItemPath};
use crate::server::ExplorerError;
use crate::types::{
    AddSuiteEvent, AddTestCasesEvent, BuildTargetUpdate, NodeId, NodeKind, TargetKey,
    TestExplorerEvent, UpdateSuiteLocationEvent,
};
use compact_str::{format_compact, CompactString};
use serde::Serialize;
use tower_lsp::lsp_types::Location;
use tracing::debug;

/// Counts of what a batch of events changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyStats {
    /// Suites created (re-announced suites are not counted)
    pub suites_added: usize,
    /// Test cases created
    pub test_cases_added: usize,
    /// Nodes dropped, including pruned packages and replaced test cases
    pub nodes_removed: usize,
    /// Suites whose location was overwritten
    pub locations_updated: usize,
    /// Events ignored because their path did not exist
    pub events_skipped: usize,
}

impl ApplyStats {
    /// Whether the batch changed the forest at all.
    pub fn changed(&self) -> bool {
        self.suites_added + self.test_cases_added + self.nodes_removed + self.locations_updated > 0
    }
}

impl std::ops::AddAssign for ApplyStats {
    fn add_assign(&mut self, other: Self) {
        self.suites_added += other.suites_added;
        self.test_cases_added += other.test_cases_added;
        self.nodes_removed += other.nodes_removed;
        self.locations_updated += other.locations_updated;
        self.events_skipped += other.events_skipped;
    }
}

/// Owned, serialisable copy of a subtree.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeSnapshot {
    pub id: CompactString,
    pub label: CompactString,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub can_expand: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<NodeSnapshot>,
}

impl TestForest {
    /// Resolve the `WorkspaceFolder -> Module` chain for a target, creating
    /// whatever is missing.
    pub(crate) fn ensure_target_root(&mut self, key: &TargetKey) -> NodeId {
        let folder = key.folder.as_ref().map(|folder| {
            match self.child(None, folder.uri.as_str()) {
                Some(existing) => existing,
                None => {
                    let mut node = TestNode::new(
                        folder.uri.as_str(),
                        folder.name.clone(),
                        NodeKind::WorkspaceFolder,
                    );
                    node.folder_uri = Some(folder.uri.clone());
                    self.insert(None, node)
                }
            }
        });

        if let Some(existing) = self.child(folder, &key.target.name) {
            return existing;
        }

        let mut module = TestNode::new(
            key.target.name.clone(),
            key.target.name.clone(),
            NodeKind::Module,
        );
        module.target = Some(key.target.clone());
        module.folder_uri = key.folder.as_ref().map(|f| f.uri.clone());
        self.insert(folder, module)
    }

    /// Add a suite under its target, creating missing packages along the way.
    ///
    /// Idempotent: if the suite already exists it is returned untouched, with
    /// its location and children preserved.
    pub fn add_suite(&mut self, key: &TargetKey, event: &AddSuiteEvent) -> NodeId {
        let fqcn = event.fully_qualified_class_name.as_str();
        let mut parent = self.ensure_target_root(key);

        for segment in TestItemPath::new(fqcn, false) {
            parent = match self.child(Some(parent), segment.id) {
                Some(existing) => existing,
                None => self.insert(
                    Some(parent),
                    TestNode::new(segment.id, segment.label, NodeKind::Package),
                ),
            };
        }

        if let Some(existing) = self.child(Some(parent), fqcn) {
            debug!(fqcn = %fqcn, "Suite already present");
            return existing;
        }

        let label = if event.class_name.is_empty() {
            CompactString::from(last_segment(fqcn))
        } else {
            event.class_name.clone()
        };
        let mut suite = TestNode::new(fqcn, label, NodeKind::Suite);
        suite.location = Some(event.location.clone());
        suite.can_expand = event.can_resolve_children;
        suite.target = Some(key.target.clone());
        suite.folder_uri = key.folder.as_ref().map(|f| f.uri.clone());
        self.insert(Some(parent), suite)
    }

    /// Replace every test case of an existing suite.
    ///
    /// Stale cases are dropped rather than merged. Returns the number of
    /// cases created.
    pub fn add_test_cases(
        &mut self,
        key: &TargetKey,
        event: &AddTestCasesEvent,
    ) -> Result<usize, ExplorerError> {
        let fqcn = event.fully_qualified_class_name.as_str();
        let suite_id = self.find(key, fqcn)?;
        let Some(suite) = self.get(suite_id).filter(|n| n.kind == NodeKind::Suite) else {
            return Err(ExplorerError::broken_path(&key.target.name, fqcn, fqcn));
        };
        let target = suite.target.clone();
        let folder_uri = suite.folder_uri.clone();
        let suite_name = suite.id.clone();

        self.clear_children(suite_id);

        let mut created = 0;
        for case in &event.test_cases {
            let id = format_compact!("{}.{}", suite_name, case.name);
            if self.child(Some(suite_id), &id).is_some() {
                debug!(test = %id, "Duplicate test case in one event");
                continue;
            }
            let label = case.display_name.clone().unwrap_or_else(|| case.name.clone());
            let mut node = TestNode::new(id, label, NodeKind::TestCase);
            node.location = Some(case.location.clone());
            node.target = target.clone();
            node.folder_uri = folder_uri.clone();
            self.insert(Some(suite_id), node);
            created += 1;
        }
        Ok(created)
    }

    /// Remove an item and every package left empty above it.
    ///
    /// Pruning stops at the first ancestor that is not a package, so the
    /// target's module node (and its workspace folder) survive even when they
    /// end up empty. Returns the number of nodes dropped.
    pub fn remove_item(&mut self, key: &TargetKey, fqcn: &str) -> Result<usize, ExplorerError> {
        let id = self.find(key, fqcn)?;
        let mut parent = self.parent_of(id);
        let mut removed = self.remove_subtree(id);

        while let Some(candidate) = parent {
            let Some(node) = self.get(candidate) else {
                break;
            };
            if !node.kind.is_pruned_when_empty() || node.has_children() {
                break;
            }
            parent = node.parent;
            removed += self.remove_subtree(candidate);
        }
        Ok(removed)
    }

    /// Overwrite the location of an existing suite. Never creates nodes.
    pub fn update_suite_location(
        &mut self,
        key: &TargetKey,
        event: &UpdateSuiteLocationEvent,
    ) -> Result<(), ExplorerError> {
        let fqcn = event.fully_qualified_class_name.as_str();
        let id = self.find(key, fqcn)?;
        match self.get_mut(id) {
            Some(node) => {
                node.location = Some(event.location.clone());
                Ok(())
            }
            None => Err(ExplorerError::broken_path(&key.target.name, fqcn, fqcn)),
        }
    }

    /// Apply one build target's events in order.
    ///
    /// Broken paths are logged and skipped; the rest of the batch still applies.
    pub fn apply_update(&mut self, update: &BuildTargetUpdate) -> ApplyStats {
        let key = update.key();
        let mut stats = ApplyStats::default();

        for event in &update.events {
            match event {
                TestExplorerEvent::AddSuite(e) => {
                    let before = self.len();
                    self.add_suite(&key, e);
                    if self.len() > before {
                        stats.suites_added += 1;
                    }
                }
                TestExplorerEvent::AddTestCases(e) => {
                    let before = self.len();
                    match self.add_test_cases(&key, e).ok_warn("addTestCases") {
                        Some(created) => {
                            stats.test_cases_added += created;
                            // Replaced cases leave the arena before new ones enter.
                            stats.nodes_removed += (before + created).saturating_sub(self.len());
                        }
                        None => stats.events_skipped += 1,
                    }
                }
                TestExplorerEvent::RemoveSuite(e) => {
                    match self
                        .remove_item(&key, &e.fully_qualified_class_name)
                        .ok_warn("removeSuite")
                    {
                        Some(removed) => stats.nodes_removed += removed,
                        None => stats.events_skipped += 1,
                    }
                }
                TestExplorerEvent::UpdateSuiteLocation(e) => {
                    match self.update_suite_location(&key, e).ok_warn("updateSuiteLocation") {
                        Some(()) => stats.locations_updated += 1,
                        None => stats.events_skipped += 1,
                    }
                }
            }
        }

        debug!(
            build_target = %update.target_name,
            events = update.events.len(),
            ?stats,
            "Applied test explorer update"
        );
        stats
    }

    /// Apply a batch of target updates, one after the other.
    pub fn apply_updates(&mut self, updates: &[BuildTargetUpdate]) -> ApplyStats {
        let mut stats = ApplyStats::default();
        for update in updates {
            stats += self.apply_update(update);
        }
        stats
    }

    /// Owned copy of a subtree.
    pub fn snapshot_of(&self, id: NodeId) -> Option<NodeSnapshot> {
        let node = self.get(id)?;
        Some(NodeSnapshot {
            id: node.id.clone(),
            label: node.label.clone(),
            kind: node.kind,
            location: node.location.clone(),
            can_expand: node.can_expand,
            children: node
                .children()
                .filter_map(|child| self.snapshot_of(child))
                .collect(),
        })
    }

    /// Owned copy of the whole forest, roots first.
    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.roots().filter_map(|id| self.snapshot_of(id)).collect()
    }
}
