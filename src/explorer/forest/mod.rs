//! The test forest: every test item the editor shows, keyed by stable ids.
//!
//! The forest is shaped exclusively by the server's add/remove/update events:
//! - `core`: node arena, parent/child bookkeeping and read-only traversal
//! - `operations`: the event-driven mutations (add suite, add test cases,
//!   remove, update location) and batch application
//!
//! Ownership runs strictly parent to child through the `children` maps; the
//! `parent` field is a non-owning handle used for upward traversal only.

mod core;
mod operations;

pub use operations::{ApplyStats, NodeSnapshot};

use crate::types::{NodeId, NodeKind, TargetInfo};
use compact_str::CompactString;
use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tower_lsp::lsp_types::{Location, Url};

/// A single item of the test forest.
#[derive(Debug, Clone)]
pub struct TestNode {
    /// Unique among siblings. Fully qualified class name for suites,
    /// `<suite id>.<case name>` for test cases, the dotted prefix for packages.
    pub(crate) id: CompactString,

    /// Display name.
    pub(crate) label: CompactString,

    pub(crate) kind: NodeKind,

    /// Children in insertion order, keyed by their `id`.
    pub(crate) children: IndexMap<CompactString, NodeId>,

    /// Non-owning back reference; `None` for forest roots.
    pub(crate) parent: Option<NodeId>,

    pub(crate) location: Option<Location>,

    /// Suites only: children may be discovered lazily.
    pub(crate) can_expand: bool,

    /// Build target this node routes run requests to.
    pub(crate) target: Option<TargetInfo>,

    pub(crate) folder_uri: Option<Url>,
}

impl TestNode {
    pub(crate) fn new(id: impl Into<CompactString>, label: impl Into<CompactString>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            kind,
            children: IndexMap::new(),
            parent: None,
            location: None,
            can_expand: false,
            target: None,
            folder_uri: None,
        }
    }

    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    #[inline]
    pub fn location(&self) -> Option<&Location> {
        self.location.as_ref()
    }

    #[inline]
    pub fn can_expand(&self) -> bool {
        self.can_expand
    }

    #[inline]
    pub fn target(&self) -> Option<&TargetInfo> {
        self.target.as_ref()
    }

    #[inline]
    pub fn folder_uri(&self) -> Option<&Url> {
        self.folder_uri.as_ref()
    }

    /// Child handles in insertion order.
    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children.values().copied()
    }

    /// Child handle by sibling-unique id.
    pub fn child(&self, id: &str) -> Option<NodeId> {
        self.children.get(id).copied()
    }

    #[inline]
    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }
}

/// Arena-backed forest of test items.
///
/// Nodes live in a flat map keyed by `NodeId`; removal drops the entry, so a
/// handle held across a mutation resolves to `None` rather than to a
/// different node.
#[derive(Debug, Default)]
pub struct TestForest {
    /// Arena storage for nodes
    pub(crate) nodes: FxHashMap<NodeId, TestNode>,

    /// Top-level items (workspace folders, or modules when no folder is known)
    pub(crate) roots: IndexMap<CompactString, NodeId>,

    /// Next node ID to assign
    pub(crate) next_id: u32,
}
