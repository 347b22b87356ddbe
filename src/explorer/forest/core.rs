//! Arena bookkeeping and read-only traversal for the test forest.
//!
//! This module contains:
//! - Forest construction and clearing
//! - Node insertion and subtree removal (keeping parent/child links consistent)
//! - Lookup by handle, by sibling id, and by folder/target/fqcn address

use super::{TestForest, TestNode};
use crate::explorer::path::TestItemPath;
use crate::server::ExplorerError;
use crate::types::{NodeId, TargetKey};
use compact_str::CompactString;

impl TestForest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a node by handle.
    #[inline]
    pub fn get(&self, id: NodeId) -> Option<&TestNode> {
        self.nodes.get(&id)
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: NodeId) -> Option<&mut TestNode> {
        self.nodes.get_mut(&id)
    }

    #[inline]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Top-level handles in insertion order.
    pub fn roots(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.roots.values().copied()
    }

    /// Children of a node, or the roots when `parent` is `None`.
    pub fn children_of(&self, parent: Option<NodeId>) -> Vec<NodeId> {
        match parent {
            Some(id) => self
                .get(id)
                .map(|node| node.children().collect())
                .unwrap_or_default(),
            None => self.roots().collect(),
        }
    }

    /// Parent of a node; `None` for roots and unknown handles.
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        self.get(id).and_then(|node| node.parent)
    }

    /// Child of `parent` (or root when `None`) with the given sibling id.
    pub fn child(&self, parent: Option<NodeId>, id: &str) -> Option<NodeId> {
        match parent {
            Some(parent) => self.get(parent).and_then(|node| node.child(id)),
            None => self.roots.get(id).copied(),
        }
    }

    /// Follow a chain of sibling ids from the roots down.
    pub fn lookup(&self, ids: &[&str]) -> Option<NodeId> {
        let mut current = None;
        for id in ids {
            current = Some(self.child(current, id)?);
        }
        current
    }

    /// Number of live nodes.
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Drop every node. Handles issued before the call stop resolving.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    /// Walk from `id` up to its root, starting with `id` itself.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        let mut current = self.contains(id).then_some(id);
        std::iter::from_fn(move || {
            let id = current?;
            current = self.parent_of(id);
            Some(id)
        })
    }

    /// Attach `node` under `parent` (or as a root) and return its handle.
    ///
    /// The caller guarantees no sibling already uses `node.id`.
    pub(crate) fn insert(&mut self, parent: Option<NodeId>, mut node: TestNode) -> NodeId {
        self.next_id += 1;
        let handle =
            NodeId::new(self.next_id).expect("Node ID counter overflow - too many test items");
        node.parent = parent;
        let key = node.id.clone();

        match parent.and_then(|p| self.nodes.get_mut(&p)) {
            Some(parent_node) => {
                parent_node.children.insert(key, handle);
            }
            None => {
                self.roots.insert(key, handle);
            }
        }

        self.nodes.insert(handle, node);
        handle
    }

    /// Detach a node from its parent and drop it together with its descendants.
    ///
    /// Returns the number of nodes dropped.
    pub(crate) fn remove_subtree(&mut self, id: NodeId) -> usize {
        let Some(node) = self.nodes.get(&id) else {
            return 0;
        };
        let key: CompactString = node.id.clone();
        let parent = node.parent;
        match parent {
            Some(parent) => {
                if let Some(parent_node) = self.nodes.get_mut(&parent) {
                    parent_node.children.shift_remove(&key);
                }
            }
            None => {
                self.roots.shift_remove(&key);
            }
        }

        let mut removed = 0;
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if let Some(node) = self.nodes.remove(&current) {
                stack.extend(node.children.values().copied());
                removed += 1;
            }
        }
        removed
    }

    /// Drop all children of a node, keeping the node itself.
    pub(crate) fn clear_children(&mut self, id: NodeId) -> usize {
        let children = self.children_of(Some(id));
        children
            .into_iter()
            .map(|child| self.remove_subtree(child))
            .sum()
    }

    /// Handle of the module node a target key addresses, if it exists.
    pub fn target_root(&self, key: &TargetKey) -> Option<NodeId> {
        let parent = match &key.folder {
            Some(folder) => Some(self.child(None, folder.uri.as_str())?),
            None => None,
        };
        self.child(parent, &key.target.name)
    }

    /// Walk from the target's module node along the dotted path of `fqcn`.
    ///
    /// Never creates nodes; a missing link is reported as `BrokenPath`.
    pub fn find(&self, key: &TargetKey, fqcn: &str) -> Result<NodeId, ExplorerError> {
        let target_name = key.target.name.as_str();
        let mut current = self
            .target_root(key)
            .ok_or_else(|| ExplorerError::broken_path(target_name, fqcn, target_name))?;

        for segment in TestItemPath::new(fqcn, true) {
            current = self
                .child(Some(current), segment.id)
                .ok_or_else(|| ExplorerError::broken_path(target_name, fqcn, segment.id))?;
        }
        Ok(current)
    }
}
