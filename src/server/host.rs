//! Capabilities the explorer consumes from the editor and the language server.
//!
//! The explorer never talks to the RPC transport or the editor's debug
//! machinery directly; the host implements these traits on top of them.

use crate::constants::RUN_MARKER_KEY;
use crate::explorer::session::RunMarker;
use crate::server::ExplorerError;
use crate::types::{BuildTargetUpdate, DebugServer, DebugSessionParams};
use async_trait::async_trait;
use serde_json::json;
use tower_lsp::lsp_types::Url;

/// Test discovery request to the language server.
#[async_trait]
pub trait DiscoveryClient: Send + Sync {
    /// Discover test suites; `uri` narrows discovery to one source file.
    async fn discover_tests(&self, uri: Option<Url>) -> Result<Vec<BuildTargetUpdate>, ExplorerError>;
}

/// Debug-session facilities of the editor and the language server.
#[async_trait]
pub trait DebugHost: Send + Sync {
    /// Flush unsaved editor buffers to disk.
    async fn save_all(&self) -> Result<(), ExplorerError>;

    /// Ask the language server for a debug adapter serving `params`.
    ///
    /// `None` means the server could not start one.
    async fn start_debug_server(&self, params: DebugSessionParams) -> Option<DebugServer>;

    /// Start an editor debug session attached to a debug server.
    ///
    /// Returns the editor's id for the new session.
    async fn launch(&self, launch: DebugLaunch) -> Result<String, ExplorerError>;

    /// Show an error message to the user.
    async fn show_error(&self, message: &str);
}

/// Everything the editor needs to attach a session to a debug server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugLaunch {
    pub server: DebugServer,
    /// Plain run rather than a debugging session.
    pub no_debug: bool,
    pub run_marker: RunMarker,
}

impl DebugLaunch {
    /// Editor debug configuration for this launch, tagged with the run marker.
    pub fn configuration(&self) -> serde_json::Value {
        let mut configuration = json!({
            "type": "scala",
            "request": "launch",
            "name": self.server.name,
            "noDebug": self.no_debug,
        });
        if let Some(port) = self.server.uri.port() {
            configuration["debugServer"] = json!(port);
        }
        configuration[RUN_MARKER_KEY] = json!(self.run_marker.to_string());
        configuration
    }
}
