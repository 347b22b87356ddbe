//! Mapping of debug-run results back onto the test forest.
//!
//! A run produces a flat list of per-suite results. `analyze_run` reconciles
//! them against the nodes that were part of the run request:
//! - a bare suite (no discovered test cases) is passed or failed as a unit
//! - a suite with discovered cases, and individually included cases, are
//!   matched test by test
//! - results the forest did not expect are surfaced as extra failures on the
//!   owning suite instead of being dropped
//! - anything without a result is reported as skipped

use crate::explorer::forest::TestForest;
use crate::types::{NodeId, NodeKind, SingleTestResult, TestSuiteResult};
use compact_str::CompactString;
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;
use std::time::Duration;
use tower_lsp::lsp_types::Location;
use tracing::{debug, warn};

/// A failure message as shown next to a test item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestMessage {
    pub text: String,
    pub location: Option<Location>,
}

impl TestMessage {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            location: None,
        }
    }

    /// Message for a test framework error, with terminal colour codes removed.
    pub fn from_error(error: &str, location: Option<Location>) -> Self {
        Self {
            text: strip_ansi_escapes::strip_str(error),
            location,
        }
    }
}

/// Host callbacks through which run outcomes are reported.
///
/// Implementations forward to the editor's test-run API; they are called
/// from the run task, so they take `&self` and must be thread-safe.
pub trait TestRunActions: Send + Sync {
    fn started(&self, node: NodeId);
    fn passed(&self, node: NodeId, duration: Option<Duration>);
    fn failed(&self, node: NodeId, messages: Vec<TestMessage>, duration: Option<Duration>);
    fn skipped(&self, node: NodeId);
}

/// Report the outcome of every included node.
///
/// `included` holds runnable leaves (suites and test cases); containers and
/// handles that no longer resolve are ignored. When `results` contains two
/// entries with the same suite name the later one wins.
pub fn analyze_run(
    actions: &dyn TestRunActions,
    forest: &TestForest,
    included: &[NodeId],
    results: Vec<TestSuiteResult>,
) {
    let mut by_suite: FxHashMap<CompactString, TestSuiteResult> = FxHashMap::default();
    for result in results {
        if let Some(previous) = by_suite.insert(result.suite_name.clone(), result) {
            warn!(suite = %previous.suite_name, "Duplicate suite result, keeping the last one");
        }
    }

    // Individually included cases are matched per suite so that unexpected
    // results are judged against every case of that suite in the run.
    let mut cases_by_suite: IndexMap<NodeId, Vec<NodeId>> = IndexMap::new();

    for &id in included {
        let Some(node) = forest.get(id) else {
            debug!(node = %id, "Test item removed before results arrived");
            continue;
        };
        match node.kind() {
            NodeKind::Suite => match by_suite.get(node.id()) {
                None => actions.skipped(id),
                Some(result) if node.has_children() => {
                    let cases: Vec<NodeId> = node.children().collect();
                    analyze_test_cases(actions, forest, id, &cases, result);
                }
                Some(result) => analyze_suite(actions, id, result),
            },
            NodeKind::TestCase => match node.parent() {
                Some(suite) => cases_by_suite.entry(suite).or_default().push(id),
                None => actions.skipped(id),
            },
            NodeKind::WorkspaceFolder | NodeKind::Module | NodeKind::Package => {
                debug!(node = %node.id(), "Container passed to result analysis");
            }
        }
    }

    for (suite, cases) in cases_by_suite {
        let result = forest.get(suite).and_then(|s| by_suite.get(s.id()));
        match result {
            Some(result) => analyze_test_cases(actions, forest, suite, &cases, result),
            None => cases.iter().for_each(|&case| actions.skipped(case)),
        }
    }
}

/// A suite without discovered cases passes or fails as a whole.
///
/// One failure message is produced per failed test. A suite whose tests were
/// all skipped is reported skipped.
fn analyze_suite(actions: &dyn TestRunActions, suite: NodeId, result: &TestSuiteResult) {
    let failures: Vec<TestMessage> = result
        .tests
        .iter()
        .filter_map(|test| match test {
            SingleTestResult::Failed {
                error, location, ..
            } => Some(TestMessage::from_error(error, location.clone())),
            SingleTestResult::Passed { .. } | SingleTestResult::Skipped { .. } => None,
        })
        .collect();

    let all_skipped = !result.tests.is_empty()
        && result
            .tests
            .iter()
            .all(|t| matches!(t, SingleTestResult::Skipped { .. }));

    if !failures.is_empty() {
        actions.failed(suite, failures, Some(result.duration()));
    } else if all_skipped {
        actions.skipped(suite);
    } else {
        actions.passed(suite, Some(result.duration()));
    }
}

/// Match test results to the included cases of one suite.
///
/// Names are matched against every discovered case of the suite; a result
/// for a known case outside `included` is ignored, and only names that are
/// not children of the suite at all count as unexpected.
fn analyze_test_cases(
    actions: &dyn TestRunActions,
    forest: &TestForest,
    suite: NodeId,
    included: &[NodeId],
    result: &TestSuiteResult,
) {
    let suite_name = result.suite_name.as_str();
    let known: FxHashMap<&str, NodeId> = forest
        .get(suite)
        .into_iter()
        .flat_map(|node| node.children())
        .filter_map(|case| {
            let node = forest.get(case)?;
            Some((strip_suite_prefix(node.id(), suite_name), case))
        })
        .collect();
    let in_run: FxHashSet<NodeId> = included.iter().copied().collect();

    let mut reported: FxHashSet<NodeId> = FxHashSet::default();
    let mut unexpected: SmallVec<[TestMessage; 2]> = SmallVec::new();

    for test in &result.tests {
        let name = strip_suite_prefix(test.test_name(), suite_name);
        let Some(&case) = known.get(name) else {
            debug!(suite = %suite_name, test = %name, "Unexpected test result");
            unexpected.push(unexpected_message(test));
            continue;
        };
        if !in_run.contains(&case) {
            debug!(suite = %suite_name, test = %name, "Result for a test outside the run");
            continue;
        }
        reported.insert(case);
        match test {
            SingleTestResult::Passed { .. } => actions.passed(case, test.duration()),
            SingleTestResult::Failed {
                error, location, ..
            } => actions.failed(
                case,
                vec![TestMessage::from_error(error, location.clone())],
                test.duration(),
            ),
            SingleTestResult::Skipped { .. } => actions.skipped(case),
        }
    }

    for &case in included {
        if forest.contains(case) && !reported.contains(&case) {
            actions.skipped(case);
        }
    }

    if !unexpected.is_empty() {
        actions.failed(suite, unexpected.into_vec(), Some(result.duration()));
    }
}

fn unexpected_message(test: &SingleTestResult) -> TestMessage {
    match test {
        SingleTestResult::Failed {
            error, location, ..
        } => TestMessage::from_error(error, location.clone()),
        SingleTestResult::Passed { test_name, .. } | SingleTestResult::Skipped { test_name } => {
            TestMessage::new(format!("Unexpected result for test '{}'", test_name))
        }
    }
}

/// Frameworks report test names with or without the suite prefix; strip it once.
fn strip_suite_prefix<'a>(name: &'a str, suite_name: &str) -> &'a str {
    name.strip_prefix(suite_name)
        .and_then(|rest| rest.strip_prefix('.'))
        .filter(|rest| !rest.is_empty())
        .unwrap_or(name)
}
