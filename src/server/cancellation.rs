//! Cancellation and background task plumbing.
//!
//! Test runs check a `CancellationToken` before starting each item; the update
//! listener of the test manager runs under a `BackgroundTaskManager` so that
//! shutting the manager down stops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// Token for cooperative cancellation.
///
/// Cancellation is sticky: once cancelled, every clone reports it forever.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancellation has been requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::Acquire)
    }

    /// Cancel every holder of this token.
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::Release);
        self.state.notify.notify_waiters();
    }

    /// Wait for cancellation to be signaled.
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel() is not missed.
            let notified = self.state.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Owner of long-lived background tasks with graceful shutdown.
#[derive(Debug, Default)]
pub struct BackgroundTaskManager {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the cancellation token shared by all managed tasks.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Spawn a task that is dropped at its next await point once cancelled.
    pub fn spawn_cancellable<F>(&mut self, name: &'static str, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        debug!("Spawning background task: {}", name);

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("Background task cancelled: {}", name);
                }
                _ = fut => {
                    debug!("Background task completed: {}", name);
                }
            }
        });
        self.tasks.retain(|task| !task.is_finished());
        self.tasks.push(handle);
    }

    /// Cancel all managed tasks and wait for them to finish.
    pub async fn shutdown(self) {
        info!("Stopping {} background task(s)", self.tasks.len());
        self.token.cancel();

        for (i, handle) in self.tasks.into_iter().enumerate() {
            if let Err(e) = handle.await {
                warn!("Background task {} panicked: {}", i, e);
            }
        }
    }

    /// Number of managed tasks that have not finished yet.
    pub fn task_count(&self) -> usize {
        self.tasks.iter().filter(|task| !task.is_finished()).count()
    }
}
