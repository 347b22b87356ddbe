use compact_str::CompactString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU32;
use std::time::Duration;
use tower_lsp::lsp_types::{Location, Url};

/// Handle to a node in the test forest.
///
/// Ids are never reused after a node is removed, so a stale handle simply
/// stops resolving instead of pointing at an unrelated node.
/// Uses NonZeroU32 for niche optimization (Option<NodeId> is same size as NodeId).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(NonZeroU32);

impl NodeId {
    /// Create a new NodeId from a 1-based value.
    /// Returns None if id is 0.
    #[inline]
    pub fn new(id: u32) -> Option<Self> {
        NonZeroU32::new(id).map(NodeId)
    }

    /// Get the raw u32 value (1-based).
    #[inline]
    pub fn raw(&self) -> u32 {
        self.0.get()
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node in the test forest represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    /// An editor workspace folder.
    WorkspaceFolder,
    /// A build target (module) inside a workspace folder.
    Module,
    /// One segment of a dotted package name.
    Package,
    /// A discoverable test class.
    Suite,
    /// An individually discovered test inside a suite.
    TestCase,
}

impl NodeKind {
    /// Whether a node of this kind disappears once its last child is removed.
    #[inline]
    pub fn is_pruned_when_empty(self) -> bool {
        match self {
            NodeKind::Package => true,
            NodeKind::WorkspaceFolder | NodeKind::Module | NodeKind::Suite | NodeKind::TestCase => {
                false
            }
        }
    }
}

/// Build target a suite or test case belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetInfo {
    pub name: CompactString,
    pub uri: Url,
}

/// Workspace folder a build target lives in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FolderInfo {
    pub name: CompactString,
    pub uri: Url,
}

/// Addresses the `WorkspaceFolder -> Module` chain an update applies to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TargetKey {
    pub folder: Option<FolderInfo>,
    pub target: TargetInfo,
}

impl TargetKey {
    pub fn new(folder: Option<FolderInfo>, target: TargetInfo) -> Self {
        Self { folder, target }
    }
}

// =========================================================================
// Discovery payloads
// =========================================================================

/// One build target's worth of test explorer events, as pushed by the server.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildTargetUpdate {
    pub target_name: CompactString,
    pub target_uri: Url,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<CompactString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_uri: Option<Url>,
    #[serde(default)]
    pub events: Vec<TestExplorerEvent>,
}

impl BuildTargetUpdate {
    /// The folder/target chain this update addresses.
    ///
    /// A folder is only attached when both its name and uri are known.
    pub fn key(&self) -> TargetKey {
        let folder = match (&self.folder_name, &self.folder_uri) {
            (Some(name), Some(uri)) => Some(FolderInfo {
                name: name.clone(),
                uri: uri.clone(),
            }),
            _ => None,
        };
        TargetKey::new(
            folder,
            TargetInfo {
                name: self.target_name.clone(),
                uri: self.target_uri.clone(),
            },
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TestExplorerEvent {
    AddSuite(AddSuiteEvent),
    AddTestCases(AddTestCasesEvent),
    RemoveSuite(RemoveSuiteEvent),
    UpdateSuiteLocation(UpdateSuiteLocationEvent),
}

impl TestExplorerEvent {
    /// Fully qualified class name of the suite the event refers to.
    pub fn fqcn(&self) -> &str {
        match self {
            TestExplorerEvent::AddSuite(e) => &e.fully_qualified_class_name,
            TestExplorerEvent::AddTestCases(e) => &e.fully_qualified_class_name,
            TestExplorerEvent::RemoveSuite(e) => &e.fully_qualified_class_name,
            TestExplorerEvent::UpdateSuiteLocation(e) => &e.fully_qualified_class_name,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddSuiteEvent {
    pub fully_qualified_class_name: CompactString,
    pub class_name: CompactString,
    pub location: Location,
    #[serde(default)]
    pub can_resolve_children: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddTestCasesEvent {
    pub fully_qualified_class_name: CompactString,
    pub class_name: CompactString,
    pub test_cases: Vec<TestCaseEntry>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseEntry {
    pub name: CompactString,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<CompactString>,
    pub location: Location,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoveSuiteEvent {
    pub fully_qualified_class_name: CompactString,
    pub class_name: CompactString,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSuiteLocationEvent {
    pub fully_qualified_class_name: CompactString,
    pub class_name: CompactString,
    pub location: Location,
}

// =========================================================================
// Execution results
// =========================================================================

/// Result of one suite's execution, as streamed by the debug adapter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuiteResult {
    pub suite_name: CompactString,
    /// Suite duration in milliseconds.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub tests: Vec<SingleTestResult>,
}

impl TestSuiteResult {
    #[inline]
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum SingleTestResult {
    Passed {
        test_name: CompactString,
        duration: u64,
    },
    Failed {
        test_name: CompactString,
        duration: u64,
        error: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        location: Option<Location>,
    },
    Skipped {
        test_name: CompactString,
    },
}

impl SingleTestResult {
    pub fn test_name(&self) -> &str {
        match self {
            SingleTestResult::Passed { test_name, .. }
            | SingleTestResult::Failed { test_name, .. }
            | SingleTestResult::Skipped { test_name } => test_name,
        }
    }

    /// Per-test duration; skipped tests carry none.
    pub fn duration(&self) -> Option<Duration> {
        match self {
            SingleTestResult::Passed { duration, .. } | SingleTestResult::Failed { duration, .. } => {
                Some(Duration::from_millis(*duration))
            }
            SingleTestResult::Skipped { .. } => None,
        }
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, SingleTestResult::Failed { .. })
    }
}

// =========================================================================
// Debug session payloads
// =========================================================================

/// Payload of the server's debug-adapter start request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugSessionParams {
    pub target: BuildTargetIdentifier,
    pub data_kind: CompactString,
    pub request_data: TestSuitesRequest,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildTargetIdentifier {
    pub uri: Url,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSuitesRequest {
    pub suites: Vec<SuiteSelection>,
    pub jvm_options: Vec<String>,
    pub environment_variables: Vec<String>,
}

/// One class to run; an empty `tests` list means "every test in the class".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuiteSelection {
    pub class_name: CompactString,
    pub tests: Vec<CompactString>,
}

/// Debug server handed back by the language server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugServer {
    pub name: String,
    /// Encodes the `host:port` the debug adapter listens on.
    pub uri: Url,
}
