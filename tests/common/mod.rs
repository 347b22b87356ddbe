#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use test_explorer::explorer::results::{TestMessage, TestRunActions};
use test_explorer::explorer::session::{DebugSessionEvent, SessionTracker};
use test_explorer::server::config::ConfigManager;
use test_explorer::server::host::{DebugHost, DebugLaunch, DiscoveryClient};
use test_explorer::server::{ExplorerError, TestManager};
use test_explorer::types::{
    AddSuiteEvent, AddTestCasesEvent, BuildTargetUpdate, DebugServer, DebugSessionParams,
    NodeId, RemoveSuiteEvent, SingleTestResult, TestCaseEntry, TestExplorerEvent,
    TestSuiteResult,
};
use tokio::sync::Notify;
use tower_lsp::lsp_types::{Location, Position, Range, Url};

// ---------------------------------------------------------------------------
// Payload builders
// ---------------------------------------------------------------------------

pub fn location(file: &str, line: u32) -> Location {
    Location::new(
        Url::parse(&format!("file:///ws/src/{}", file)).unwrap(),
        Range::new(Position::new(line, 0), Position::new(line, 10)),
    )
}

pub fn target_uri(target: &str) -> Url {
    Url::parse(&format!("file:///ws/?id={}", target)).unwrap()
}

pub fn update(target: &str, events: Vec<TestExplorerEvent>) -> BuildTargetUpdate {
    BuildTargetUpdate {
        target_name: target.into(),
        target_uri: target_uri(target),
        folder_name: None,
        folder_uri: None,
        events,
    }
}

pub fn add_suite(fqcn: &str, can_resolve_children: bool) -> TestExplorerEvent {
    let class_name = fqcn.rsplit('.').next().unwrap_or(fqcn);
    TestExplorerEvent::AddSuite(AddSuiteEvent {
        fully_qualified_class_name: fqcn.into(),
        class_name: class_name.into(),
        location: location(&format!("{}.scala", class_name), 0),
        can_resolve_children,
    })
}

pub fn add_test_cases(fqcn: &str, cases: &[&str]) -> TestExplorerEvent {
    let class_name = fqcn.rsplit('.').next().unwrap_or(fqcn);
    TestExplorerEvent::AddTestCases(AddTestCasesEvent {
        fully_qualified_class_name: fqcn.into(),
        class_name: class_name.into(),
        test_cases: cases
            .iter()
            .enumerate()
            .map(|(line, name)| TestCaseEntry {
                name: (*name).into(),
                display_name: None,
                location: location(&format!("{}.scala", class_name), line as u32 + 1),
            })
            .collect(),
    })
}

pub fn remove_suite(fqcn: &str) -> TestExplorerEvent {
    TestExplorerEvent::RemoveSuite(RemoveSuiteEvent {
        fully_qualified_class_name: fqcn.into(),
        class_name: fqcn.rsplit('.').next().unwrap_or(fqcn).into(),
    })
}

pub fn passed(name: &str, duration: u64) -> SingleTestResult {
    SingleTestResult::Passed {
        test_name: name.into(),
        duration,
    }
}

pub fn failed(name: &str, error: &str) -> SingleTestResult {
    SingleTestResult::Failed {
        test_name: name.into(),
        duration: 1,
        error: error.into(),
        location: None,
    }
}

pub fn suite_result(suite: &str, duration: u64, tests: Vec<SingleTestResult>) -> TestSuiteResult {
    TestSuiteResult {
        suite_name: suite.into(),
        duration,
        tests,
    }
}

// ---------------------------------------------------------------------------
// Recording run actions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Started(NodeId),
    Passed(NodeId, Option<Duration>),
    Failed(NodeId, Vec<String>),
    Skipped(NodeId),
}

#[derive(Default)]
pub struct RecordingActions {
    outcomes: Mutex<Vec<Outcome>>,
}

impl RecordingActions {
    pub fn outcomes(&self) -> Vec<Outcome> {
        self.outcomes.lock().clone()
    }

    pub fn started(&self) -> Vec<NodeId> {
        self.outcomes()
            .into_iter()
            .filter_map(|o| match o {
                Outcome::Started(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Outcomes other than `Started`.
    pub fn finished(&self) -> Vec<Outcome> {
        self.outcomes()
            .into_iter()
            .filter(|o| !matches!(o, Outcome::Started(_)))
            .collect()
    }
}

impl TestRunActions for RecordingActions {
    fn started(&self, node: NodeId) {
        self.outcomes.lock().push(Outcome::Started(node));
    }

    fn passed(&self, node: NodeId, duration: Option<Duration>) {
        self.outcomes.lock().push(Outcome::Passed(node, duration));
    }

    fn failed(&self, node: NodeId, messages: Vec<TestMessage>, _duration: Option<Duration>) {
        let texts = messages.into_iter().map(|m| m.text).collect();
        self.outcomes.lock().push(Outcome::Failed(node, texts));
    }

    fn skipped(&self, node: NodeId) {
        self.outcomes.lock().push(Outcome::Skipped(node));
    }
}

// ---------------------------------------------------------------------------
// Fake discovery
// ---------------------------------------------------------------------------

#[derive(Default)]
pub struct FakeDiscovery {
    full: Mutex<Option<Result<Vec<BuildTargetUpdate>, String>>>,
    by_uri: Mutex<HashMap<Url, Vec<BuildTargetUpdate>>>,
    pub requests: Mutex<Vec<Option<Url>>>,
    /// When set, lookups for a single file fail.
    pub fail_file_requests: AtomicBool,
}

impl FakeDiscovery {
    pub fn with_updates(updates: Vec<BuildTargetUpdate>) -> Self {
        let discovery = Self::default();
        discovery.respond(Ok(updates));
        discovery
    }

    pub fn respond(&self, response: Result<Vec<BuildTargetUpdate>, String>) {
        *self.full.lock() = Some(response);
    }

    pub fn respond_for(&self, uri: Url, updates: Vec<BuildTargetUpdate>) {
        self.by_uri.lock().insert(uri, updates);
    }
}

#[async_trait]
impl DiscoveryClient for FakeDiscovery {
    async fn discover_tests(&self, uri: Option<Url>) -> Result<Vec<BuildTargetUpdate>, ExplorerError> {
        self.requests.lock().push(uri.clone());
        match uri {
            Some(_) if self.fail_file_requests.load(Ordering::SeqCst) => {
                Err(ExplorerError::discovery("build server timed out"))
            }
            Some(uri) => Ok(self.by_uri.lock().get(&uri).cloned().unwrap_or_default()),
            None => match self.full.lock().clone() {
                Some(Ok(updates)) => Ok(updates),
                Some(Err(reason)) => Err(ExplorerError::discovery(reason)),
                None => Ok(Vec::new()),
            },
        }
    }
}

// ---------------------------------------------------------------------------
// Fake debug host
// ---------------------------------------------------------------------------

/// Debug host that answers each launch by replaying scripted results through
/// the session tracker, as the editor would.
#[derive(Default)]
pub struct FakeDebugHost {
    tracker: OnceLock<Arc<SessionTracker>>,
    scripts: Mutex<VecDeque<Vec<TestSuiteResult>>>,
    pub refuse_debug_server: AtomicBool,
    /// Launches beyond this many are rejected.
    pub launch_limit: OnceLock<usize>,
    /// When set, sessions only terminate once the gate is notified.
    pub gate: OnceLock<Arc<Notify>>,
    pub saves: AtomicUsize,
    pub start_requests: Mutex<Vec<DebugSessionParams>>,
    pub launches: Mutex<Vec<DebugLaunch>>,
    pub errors: Mutex<Vec<String>>,
}

impl FakeDebugHost {
    pub fn new(tracker: Arc<SessionTracker>) -> Self {
        let host = Self::default();
        host.attach(tracker);
        host
    }

    pub fn attach(&self, tracker: Arc<SessionTracker>) {
        let _ = self.tracker.set(tracker);
    }

    /// Queue the results emitted by the next launched session.
    pub fn script(&self, results: Vec<TestSuiteResult>) {
        self.scripts.lock().push_back(results);
    }

    pub fn hold_sessions(&self) -> Arc<Notify> {
        Arc::clone(self.gate.get_or_init(|| Arc::new(Notify::new())))
    }

    pub fn launch_count(&self) -> usize {
        self.launches.lock().len()
    }
}

#[async_trait]
impl DebugHost for FakeDebugHost {
    async fn save_all(&self) -> Result<(), ExplorerError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn start_debug_server(&self, params: DebugSessionParams) -> Option<DebugServer> {
        self.start_requests.lock().push(params);
        if self.refuse_debug_server.load(Ordering::SeqCst) {
            return None;
        }
        Some(DebugServer {
            name: "test-session".into(),
            uri: Url::parse("tcp://127.0.0.1:5005").unwrap(),
        })
    }

    async fn launch(&self, launch: DebugLaunch) -> Result<String, ExplorerError> {
        if self
            .launch_limit
            .get()
            .is_some_and(|&limit| self.launch_count() >= limit)
        {
            return Err(ExplorerError::launch("editor refused the debug configuration"));
        }
        let session_id = {
            let mut launches = self.launches.lock();
            launches.push(launch.clone());
            format!("session-{}", launches.len())
        };
        let tracker = Arc::clone(self.tracker.get().expect("tracker attached"));
        let results = self.scripts.lock().pop_front().unwrap_or_default();
        let marker = Some(launch.run_marker);
        let gate = self.gate.get().cloned();

        let id = session_id.clone();
        tokio::spawn(async move {
            tracker.handle_event(DebugSessionEvent::started(id.clone(), marker));
            for result in results {
                let body = serde_json::json!({
                    "category": "testResult",
                    "data": serde_json::to_value(&result).unwrap(),
                });
                tracker.handle_event(DebugSessionEvent::custom(id.clone(), marker, "testResult", body));
            }
            if let Some(gate) = gate {
                gate.notified().await;
            }
            tracker.handle_event(DebugSessionEvent::terminated(id, marker));
        });

        Ok(session_id)
    }

    async fn show_error(&self, message: &str) {
        self.errors.lock().push(message.to_string());
    }
}

// ---------------------------------------------------------------------------
// Manager fixture
// ---------------------------------------------------------------------------

pub struct ManagerFixture {
    pub manager: Arc<TestManager>,
    pub discovery: Arc<FakeDiscovery>,
    pub host: Arc<FakeDebugHost>,
    pub config: Arc<ConfigManager>,
}

impl ManagerFixture {
    pub fn new(discovery: FakeDiscovery) -> Self {
        let discovery = Arc::new(discovery);
        let host = Arc::new(FakeDebugHost::default());
        let config = Arc::new(ConfigManager::new());
        let manager = Arc::new(TestManager::new(
            discovery.clone(),
            host.clone(),
            config.clone(),
        ));
        host.attach(manager.session_tracker());

        Self {
            manager,
            discovery,
            host,
            config,
        }
    }

    /// Fixture with the explorer enabled and `updates` discovered.
    pub async fn enabled(updates: Vec<BuildTargetUpdate>) -> Self {
        let fixture = Self::new(FakeDiscovery::with_updates(updates));
        fixture.manager.enable().await.unwrap();
        fixture
    }

    pub fn lookup(&self, ids: &[&str]) -> NodeId {
        self.manager
            .forest()
            .lookup(ids)
            .unwrap_or_else(|| panic!("no test item at {:?}", ids))
    }
}
