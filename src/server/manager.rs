//! The Test Manager: composition root of the test explorer.
//!
//! `TestManager` owns the forest and wires it to the host capabilities:
//! - `DiscoveryClient` feeds the forest (full rediscovery and lazy resolve)
//! - server-pushed update batches are applied in arrival order
//! - `RunCoordinator` executes run requests through the `DebugHost`
//!
//! It is only active while the configured test interface is the explorer.

use crate::error_ext::ResultExt;
use crate::explorer::forest::{ApplyStats, NodeSnapshot, TestForest};
use crate::explorer::results::TestRunActions;
use crate::explorer::runner::{RunCoordinator, RunMode, RunOutcome, RunRequest};
use crate::explorer::session::SessionTracker;
use crate::server::cancellation::{BackgroundTaskManager, CancellationToken};
use crate::server::config::ConfigManager;
use crate::server::host::{DebugHost, DiscoveryClient};
use crate::server::ExplorerError;
use crate::types::{BuildTargetUpdate, NodeId, NodeKind};
use futures::{Stream, StreamExt};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info};

pub struct TestManager {
    forest: Arc<RwLock<TestForest>>,
    discovery: Arc<dyn DiscoveryClient>,
    tracker: Arc<SessionTracker>,
    runner: RunCoordinator,
    config: Arc<ConfigManager>,
    enabled: AtomicBool,
    tasks: Mutex<BackgroundTaskManager>,
}

impl TestManager {
    /// Create a disabled manager with an empty forest.
    pub fn new(
        discovery: Arc<dyn DiscoveryClient>,
        host: Arc<dyn DebugHost>,
        config: Arc<ConfigManager>,
    ) -> Self {
        let forest = Arc::new(RwLock::new(TestForest::new()));
        let tracker = Arc::new(SessionTracker::new());
        let runner = RunCoordinator::new(Arc::clone(&forest), host, Arc::clone(&tracker));

        Self {
            forest,
            discovery,
            tracker,
            runner,
            config,
            enabled: AtomicBool::new(false),
            tasks: Mutex::new(BackgroundTaskManager::new()),
        }
    }

    /// Read access to the forest. Do not hold the guard across an await.
    pub fn forest(&self) -> RwLockReadGuard<'_, TestForest> {
        self.forest.read()
    }

    pub fn snapshot(&self) -> Vec<NodeSnapshot> {
        self.forest.read().snapshot()
    }

    /// The registration point for the host's debug-session events.
    pub fn session_tracker(&self) -> Arc<SessionTracker> {
        Arc::clone(&self.tracker)
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Activate the explorer, discovering tests if configured to.
    pub async fn enable(&self) -> Result<(), ExplorerError> {
        if self.enabled.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        info!("Test explorer enabled");

        let discover = self.config.snapshot().await.discovery.discover_on_enable;
        if discover {
            self.discover().await?;
        }
        Ok(())
    }

    /// Deactivate the explorer and drop every test item.
    pub fn disable(&self) {
        if !self.enabled.swap(false, Ordering::AcqRel) {
            return;
        }
        self.forest.write().clear();
        info!("Test explorer disabled");
    }

    /// Enable or disable according to the current configuration.
    pub async fn apply_config(&self) -> Result<(), ExplorerError> {
        if self.config.snapshot().await.explorer_enabled() {
            self.enable().await
        } else {
            self.disable();
            Ok(())
        }
    }

    /// Apply a server-pushed batch of updates.
    ///
    /// Ignored while disabled. The batch is applied under one write lock, so
    /// readers never see it half done.
    pub fn update_test_explorer(&self, updates: &[BuildTargetUpdate]) -> ApplyStats {
        if !self.is_enabled() {
            debug!(targets = updates.len(), "Test explorer disabled, dropping update");
            return ApplyStats::default();
        }
        self.forest.write().apply_updates(updates)
    }

    /// Rebuild the forest from a full discovery.
    ///
    /// On failure the forest keeps its last known good state.
    pub async fn discover(&self) -> Result<ApplyStats, ExplorerError> {
        let updates = match self.discovery.discover_tests(None).await {
            Ok(updates) => updates,
            Err(e) => {
                error!(error = %e, "Test discovery failed, keeping the current tree");
                return Err(e);
            }
        };
        if !self.is_enabled() {
            debug!("Test explorer disabled during discovery");
            return Ok(ApplyStats::default());
        }

        let stats = {
            let mut forest = self.forest.write();
            forest.clear();
            forest.apply_updates(&updates)
        };
        info!(
            targets = updates.len(),
            suites = stats.suites_added,
            test_cases = stats.test_cases_added,
            "Test discovery finished"
        );
        Ok(stats)
    }

    /// Resolve handler of the editor's test controller.
    ///
    /// `None` rediscovers everything. An expandable suite asks discovery for
    /// its source file and merges the answer; other items need no work. A
    /// failed suite lookup is logged and leaves the suite as it was.
    pub async fn resolve(&self, node: Option<NodeId>) -> Result<ApplyStats, ExplorerError> {
        let Some(id) = node else {
            return self.discover().await;
        };

        let uri = {
            let forest = self.forest.read();
            forest
                .get(id)
                .filter(|n| n.kind() == NodeKind::Suite && n.can_expand())
                .and_then(|n| n.location())
                .map(|location| location.uri.clone())
        };
        let Some(uri) = uri else {
            return Ok(ApplyStats::default());
        };

        debug!(node = %id, uri = %uri, "Resolving suite children");
        let Some(updates) = self
            .discovery
            .discover_tests(Some(uri))
            .await
            .ok_logged("Resolving suite children")
        else {
            return Ok(ApplyStats::default());
        };
        Ok(self.update_test_explorer(&updates))
    }

    /// Run or debug the requested items.
    pub async fn run(
        &self,
        request: RunRequest,
        mode: RunMode,
        actions: &dyn TestRunActions,
        cancel: &CancellationToken,
    ) -> RunOutcome {
        if !self.is_enabled() {
            debug!("Test explorer disabled, ignoring run request");
            return RunOutcome::Ignored;
        }
        let settings = self.config.get_run_settings().await;
        self.runner
            .run(request, mode, &settings, actions, cancel)
            .await
    }

    /// Apply every batch of `updates` on a background task, in order.
    pub fn listen<S>(self: &Arc<Self>, updates: S)
    where
        S: Stream<Item = Vec<BuildTargetUpdate>> + Send + 'static,
    {
        let manager = Arc::clone(self);
        self.tasks
            .lock()
            .spawn_cancellable("test-explorer-updates", async move {
                let mut updates = Box::pin(updates);
                while let Some(batch) = updates.next().await {
                    let stats = manager.update_test_explorer(&batch);
                    if stats.changed() {
                        debug!(?stats, "Test explorer updated");
                    }
                }
            });
    }

    /// Stop the update listener.
    pub async fn shutdown(&self) {
        let tasks = std::mem::take(&mut *self.tasks.lock());
        tasks.shutdown().await;
    }
}
