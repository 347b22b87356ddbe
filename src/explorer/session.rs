//! Bridge between the editor's debug sessions and in-flight test runs.
//!
//! The host registers one long-lived `SessionTracker` and forwards every
//! debug-session lifecycle event to it. Sessions launched by a test run carry
//! that run's `RunMarker`; everything else is ignored. Each run owns a
//! `RunSubscription` that buffers its own results, so nothing is kept in
//! process-wide maps once the run finishes.

use crate::constants::{RUN_MARKER_KEY, TEST_RESULT_CATEGORY, TEST_RESULT_EVENT};
use crate::server::ExplorerError;
use crate::types::TestSuiteResult;
use dashmap::DashMap;
use serde::Deserialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Tag attached to the debug configuration of sessions started by a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RunMarker(Uuid);

impl RunMarker {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Read the marker back from a session's debug configuration.
    pub fn from_configuration(configuration: &serde_json::Value) -> Option<Self> {
        configuration
            .get(RUN_MARKER_KEY)
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
            .map(Self)
    }
}

impl Default for RunMarker {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// A lifecycle notification for one editor debug session.
#[derive(Debug, Clone)]
pub struct DebugSessionEvent {
    pub session_id: String,
    /// `None` for sessions the test explorer did not start.
    pub run_marker: Option<RunMarker>,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone)]
pub enum SessionEventKind {
    Started,
    /// A custom debug-adapter event such as `testResult`.
    Custom {
        event: String,
        body: serde_json::Value,
    },
    Terminated,
}

impl DebugSessionEvent {
    pub fn started(session_id: impl Into<String>, run_marker: Option<RunMarker>) -> Self {
        Self {
            session_id: session_id.into(),
            run_marker,
            kind: SessionEventKind::Started,
        }
    }

    pub fn custom(
        session_id: impl Into<String>,
        run_marker: Option<RunMarker>,
        event: impl Into<String>,
        body: serde_json::Value,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            run_marker,
            kind: SessionEventKind::Custom {
                event: event.into(),
                body,
            },
        }
    }

    pub fn terminated(session_id: impl Into<String>, run_marker: Option<RunMarker>) -> Self {
        Self {
            session_id: session_id.into(),
            run_marker,
            kind: SessionEventKind::Terminated,
        }
    }
}

#[derive(Deserialize)]
struct TestResultBody {
    category: String,
    data: serde_json::Value,
}

/// Decode the body of a `testResult` event.
///
/// Returns `Ok(None)` for bodies of another category.
pub fn parse_test_result(body: &serde_json::Value) -> Result<Option<TestSuiteResult>, ExplorerError> {
    let body: TestResultBody = serde_json::from_value(body.clone())?;
    if body.category != TEST_RESULT_CATEGORY {
        return Ok(None);
    }
    Ok(Some(serde_json::from_value(body.data)?))
}

/// Routes debug-session events to the run that launched the session.
#[derive(Debug, Default)]
pub struct SessionTracker {
    runs: DashMap<RunMarker, mpsc::UnboundedSender<DebugSessionEvent>>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry point for the host: called for every debug session in the editor.
    pub fn handle_event(&self, event: DebugSessionEvent) {
        let Some(marker) = event.run_marker else {
            trace!(session = %event.session_id, "Ignoring untracked debug session");
            return;
        };
        match self.runs.get(&marker) {
            Some(sender) => {
                if sender.send(event).is_err() {
                    debug!(run = %marker, "Run finished before its session event arrived");
                }
            }
            None => debug!(run = %marker, "Event for a run that is no longer active"),
        }
    }

    /// Start buffering events for a run.
    pub fn subscribe(self: &Arc<Self>, marker: RunMarker) -> RunSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        self.runs.insert(marker, sender);
        RunSubscription {
            marker,
            receiver,
            tracker: Arc::clone(self),
        }
    }

    /// Number of runs currently subscribed.
    pub fn active_runs(&self) -> usize {
        self.runs.len()
    }
}

/// Per-run view of the session events; unsubscribes on drop.
pub struct RunSubscription {
    marker: RunMarker,
    receiver: mpsc::UnboundedReceiver<DebugSessionEvent>,
    tracker: Arc<SessionTracker>,
}

impl RunSubscription {
    #[inline]
    pub fn marker(&self) -> RunMarker {
        self.marker
    }

    /// Buffer the results of `session_id` until that session terminates.
    ///
    /// Events of other sessions tagged with the same run are skipped. If the
    /// run's channel closes first, whatever was buffered so far is returned.
    pub async fn collect_results(&mut self, session_id: &str) -> Vec<TestSuiteResult> {
        let mut results = Vec::new();

        while let Some(event) = self.receiver.recv().await {
            if event.session_id != session_id {
                debug!(session = %event.session_id, "Skipping event of another session");
                continue;
            }
            match event.kind {
                SessionEventKind::Started => {
                    debug!(session = %session_id, "Test debug session started");
                }
                SessionEventKind::Custom { event, body } if event == TEST_RESULT_EVENT => {
                    match parse_test_result(&body) {
                        Ok(Some(result)) => results.push(result),
                        Ok(None) => trace!(session = %session_id, "Ignoring non-test result body"),
                        Err(e) => warn!(session = %session_id, error = %e, "Malformed test result"),
                    }
                }
                SessionEventKind::Custom { event, .. } => {
                    trace!(session = %session_id, event = %event, "Ignoring debug adapter event");
                }
                SessionEventKind::Terminated => {
                    debug!(session = %session_id, suites = results.len(), "Test debug session terminated");
                    return results;
                }
            }
        }

        warn!(session = %session_id, "Run channel closed before the session terminated");
        results
    }
}

impl Drop for RunSubscription {
    fn drop(&mut self) {
        self.tracker.runs.remove(&self.marker);
    }
}
