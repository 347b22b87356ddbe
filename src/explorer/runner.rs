//! Run coordination: from an editor run request to reported outcomes.
//!
//! A run goes through these phases:
//! 1. Expand the request into runnable leaves, marking every visited node
//!    started (or skipped once cancellation is observed)
//! 2. Group the leaves by build target and build the suite selections
//! 3. Save all editor buffers, even when nothing turned out to be runnable
//! 4. Per target: start a debug server, launch a tagged session, wait for it
//!    to terminate and hand its results to `analyze_run`
//!
//! Only one run is in flight at a time; a request that arrives while another
//! run is active is ignored.

use crate::constants::TEST_SELECTION_DATA_KIND;
use crate::explorer::forest::TestForest;
use crate::explorer::results::{analyze_run, TestMessage, TestRunActions};
use crate::explorer::session::{RunMarker, RunSubscription, SessionTracker};
use crate::server::cancellation::CancellationToken;
use crate::server::host::{DebugHost, DebugLaunch};
use crate::server::ExplorerError;
use crate::types::{
    BuildTargetIdentifier, DebugSessionParams, NodeId, NodeKind, SuiteSelection, TargetInfo,
    TestSuitesRequest,
};
use compact_str::CompactString;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Run profile chosen in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Run,
    Debug,
}

/// Nodes the user asked to run.
#[derive(Debug, Clone, Default)]
pub struct RunRequest {
    /// Empty means every root of the forest.
    pub include: Vec<NodeId>,
    pub exclude: FxHashSet<NodeId>,
}

impl RunRequest {
    pub fn new(include: Vec<NodeId>) -> Self {
        Self {
            include,
            exclude: FxHashSet::default(),
        }
    }

    pub fn excluding(mut self, exclude: impl IntoIterator<Item = NodeId>) -> Self {
        self.exclude.extend(exclude);
        self
    }
}

/// JVM settings forwarded with every suite selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSettings {
    pub jvm_options: Vec<String>,
    /// `KEY=VALUE` entries.
    pub environment_variables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Every target's session terminated and its results were reported.
    Completed,
    /// Another run was in flight.
    Ignored,
    /// Cancellation was observed before every target was launched.
    Cancelled,
    /// The run could not be started; the message was shown to the user.
    Failed(String),
}

/// Runnable leaves of one build target and the selection sent for them.
#[derive(Debug)]
struct TargetGroup {
    target: TargetInfo,
    leaves: Vec<NodeId>,
    /// Keyed by suite class name, in first-seen order.
    suites: IndexMap<CompactString, SuiteSelectionBuilder>,
}

#[derive(Debug, Default)]
struct SuiteSelectionBuilder {
    /// The whole suite was requested; individual case names are irrelevant.
    run_all: bool,
    tests: Vec<CompactString>,
}

impl TargetGroup {
    fn new(target: TargetInfo) -> Self {
        Self {
            target,
            leaves: Vec::new(),
            suites: IndexMap::new(),
        }
    }

    fn add_suite(&mut self, id: NodeId, class_name: &str) {
        self.leaves.push(id);
        let selection = self.suites.entry(class_name.into()).or_default();
        selection.run_all = true;
        selection.tests.clear();
    }

    fn add_test_case(&mut self, id: NodeId, class_name: &str, test_name: &str) {
        self.leaves.push(id);
        let selection = self.suites.entry(class_name.into()).or_default();
        if !selection.run_all && !selection.tests.iter().any(|t| t == test_name) {
            selection.tests.push(test_name.into());
        }
    }

    /// Drop case leaves whose suite is itself part of the run, so each case
    /// is reported once, through its suite.
    fn dedup_leaves(&mut self, forest: &TestForest) {
        let suites: FxHashSet<NodeId> = self
            .leaves
            .iter()
            .copied()
            .filter(|&id| forest.get(id).is_some_and(|n| n.kind() == NodeKind::Suite))
            .collect();
        self.leaves.retain(|&id| {
            forest
                .get(id)
                .and_then(|n| n.parent().filter(|_| n.kind() == NodeKind::TestCase))
                .map_or(true, |parent| !suites.contains(&parent))
        });
    }

    fn params(&self, settings: &RunSettings) -> DebugSessionParams {
        let suites = self
            .suites
            .iter()
            .map(|(class_name, selection)| SuiteSelection {
                class_name: class_name.clone(),
                tests: if selection.run_all {
                    Vec::new()
                } else {
                    selection.tests.clone()
                },
            })
            .collect();

        DebugSessionParams {
            target: BuildTargetIdentifier {
                uri: self.target.uri.clone(),
            },
            data_kind: TEST_SELECTION_DATA_KIND.into(),
            request_data: TestSuitesRequest {
                suites,
                jvm_options: settings.jvm_options.clone(),
                environment_variables: settings.environment_variables.clone(),
            },
        }
    }
}

#[derive(Debug, Default)]
struct RunPlan {
    /// Every node marked started, containers included.
    started: Vec<NodeId>,
    groups: Vec<TargetGroup>,
    cancelled: bool,
}

impl RunPlan {
    /// Walk the request depth first, honouring `exclude`.
    fn build(
        forest: &TestForest,
        request: &RunRequest,
        actions: &dyn TestRunActions,
        cancel: &CancellationToken,
    ) -> Self {
        let mut plan = RunPlan::default();
        let mut groups: IndexMap<String, TargetGroup> = IndexMap::new();
        let mut visited: FxHashSet<NodeId> = FxHashSet::default();

        let mut stack: Vec<NodeId> = if request.include.is_empty() {
            forest.roots().collect()
        } else {
            request.include.clone()
        };
        stack.reverse();

        while let Some(id) = stack.pop() {
            if request.exclude.contains(&id) || !visited.insert(id) {
                continue;
            }
            let Some(node) = forest.get(id) else {
                debug!(node = %id, "Requested test item no longer exists");
                continue;
            };

            if cancel.is_cancelled() {
                plan.cancelled = true;
                actions.skipped(id);
                continue;
            }
            actions.started(id);
            plan.started.push(id);

            match node.kind() {
                NodeKind::WorkspaceFolder | NodeKind::Module | NodeKind::Package => {
                    let children: Vec<NodeId> = node.children().collect();
                    stack.extend(children.into_iter().rev());
                }
                // A partially excluded suite runs as its remaining cases.
                NodeKind::Suite if node.children().any(|c| request.exclude.contains(&c)) => {
                    let children: Vec<NodeId> = node
                        .children()
                        .filter(|c| !request.exclude.contains(c))
                        .collect();
                    stack.extend(children.into_iter().rev());
                }
                NodeKind::Suite | NodeKind::TestCase => {
                    let Some(target) = node.target() else {
                        warn!(node = %node.id(), "Runnable test item without a build target");
                        continue;
                    };
                    let group = groups
                        .entry(target.uri.to_string())
                        .or_insert_with(|| TargetGroup::new(target.clone()));

                    if node.kind() == NodeKind::Suite {
                        group.add_suite(id, node.id());
                    } else if let Some(suite) = node.parent().and_then(|p| forest.get(p)) {
                        let test_name = node
                            .id()
                            .strip_prefix(suite.id())
                            .and_then(|rest| rest.strip_prefix('.'))
                            .unwrap_or(node.id());
                        group.add_test_case(id, suite.id(), test_name);
                    }
                }
            }
        }

        plan.groups = groups
            .into_values()
            .map(|mut group| {
                group.dedup_leaves(forest);
                group
            })
            .collect();
        plan
    }
}

/// Forwards to the host's actions while remembering which nodes received a
/// final state.
struct TrackingActions<'a> {
    inner: &'a dyn TestRunActions,
    reported: Mutex<FxHashSet<NodeId>>,
}

impl<'a> TrackingActions<'a> {
    fn new(inner: &'a dyn TestRunActions) -> Self {
        Self {
            inner,
            reported: Mutex::new(FxHashSet::default()),
        }
    }

    fn is_reported(&self, id: NodeId) -> bool {
        self.reported.lock().contains(&id)
    }
}

impl TestRunActions for TrackingActions<'_> {
    fn started(&self, node: NodeId) {
        self.inner.started(node);
    }

    fn passed(&self, node: NodeId, duration: Option<Duration>) {
        self.reported.lock().insert(node);
        self.inner.passed(node, duration);
    }

    fn failed(&self, node: NodeId, messages: Vec<TestMessage>, duration: Option<Duration>) {
        self.reported.lock().insert(node);
        self.inner.failed(node, messages, duration);
    }

    fn skipped(&self, node: NodeId) {
        self.reported.lock().insert(node);
        self.inner.skipped(node);
    }
}

/// Releases the in-flight flag when the run ends, however it ends.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Executes run requests against the forest through the debug host.
pub struct RunCoordinator {
    forest: Arc<RwLock<TestForest>>,
    host: Arc<dyn DebugHost>,
    tracker: Arc<SessionTracker>,
    running: AtomicBool,
}

impl RunCoordinator {
    pub fn new(
        forest: Arc<RwLock<TestForest>>,
        host: Arc<dyn DebugHost>,
        tracker: Arc<SessionTracker>,
    ) -> Self {
        Self {
            forest,
            host,
            tracker,
            running: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Execute a run request, reporting every outcome through `actions`.
    pub async fn run(
        &self,
        request: RunRequest,
        mode: RunMode,
        settings: &RunSettings,
        actions: &dyn TestRunActions,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!("Test run already in progress, ignoring request");
            return RunOutcome::Ignored;
        };

        let actions = TrackingActions::new(actions);
        let plan = {
            let forest = self.forest.read();
            RunPlan::build(&forest, &request, &actions, cancel)
        };
        let leaf_count: usize = plan.groups.iter().map(|g| g.leaves.len()).sum();
        info!(
            ?mode,
            targets = plan.groups.len(),
            leaves = leaf_count,
            "Starting test run"
        );

        let mut subscription = self.tracker.subscribe(RunMarker::new());
        match self
            .execute(&plan, mode, settings, &actions, cancel, &mut subscription)
            .await
        {
            Ok(outcome) if plan.cancelled => {
                debug!(?outcome, "Run finished after cancellation");
                RunOutcome::Cancelled
            }
            Ok(outcome) => outcome,
            Err(e) => {
                let message = e.to_string();
                warn!(run = %subscription.marker(), error = %message, "Test run failed to start");
                self.host.show_error(&message).await;

                let started = plan.started.iter().copied();
                for id in started.filter(|&id| !actions.is_reported(id)) {
                    actions.failed(id, vec![TestMessage::new(message.clone())], None);
                }
                RunOutcome::Failed(message)
            }
        }
    }

    async fn execute(
        &self,
        plan: &RunPlan,
        mode: RunMode,
        settings: &RunSettings,
        actions: &TrackingActions<'_>,
        cancel: &CancellationToken,
        subscription: &mut RunSubscription,
    ) -> Result<RunOutcome, ExplorerError> {
        self.host.save_all().await?;

        if plan.groups.is_empty() {
            debug!("Nothing runnable in the request");
            let started = plan.started.iter().copied();
            for id in started.filter(|&id| !actions.is_reported(id)) {
                actions.skipped(id);
            }
            return Ok(RunOutcome::Completed);
        }

        for (index, group) in plan.groups.iter().enumerate() {
            if cancel.is_cancelled() {
                info!(
                    remaining = plan.groups.len() - index,
                    "Run cancelled before launching remaining targets"
                );
                for group in &plan.groups[index..] {
                    group.leaves.iter().for_each(|&id| actions.skipped(id));
                }
                return Ok(RunOutcome::Cancelled);
            }

            let server = self
                .host
                .start_debug_server(group.params(settings))
                .await
                .ok_or_else(|| ExplorerError::DebugServerUnavailable {
                    target: group.target.name.to_string(),
                })?;
            debug!(build_target = %group.target.name, server = %server.uri, "Debug server started");

            let session_id = self
                .host
                .launch(DebugLaunch {
                    server,
                    no_debug: mode == RunMode::Run,
                    run_marker: subscription.marker(),
                })
                .await?;
            info!(build_target = %group.target.name, session = %session_id, "Test session launched");

            let results = subscription.collect_results(&session_id).await;
            {
                let forest = self.forest.read();
                analyze_run(actions, &forest, &group.leaves, results);
            }
        }

        Ok(RunOutcome::Completed)
    }
}
