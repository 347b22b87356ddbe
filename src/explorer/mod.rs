pub mod forest;
pub mod path;
pub mod results;
pub mod runner;
pub mod session;

pub use forest::{ApplyStats, NodeSnapshot, TestForest, TestNode};
pub use path::TestItemPath;
pub use results::{analyze_run, TestMessage, TestRunActions};
pub use runner::{RunCoordinator, RunMode, RunOutcome, RunRequest, RunSettings};
pub use session::{DebugSessionEvent, RunMarker, SessionTracker};
