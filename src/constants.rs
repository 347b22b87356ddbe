//! Constants shared between the explorer engine and its host glue.

/// Name of the per-workspace configuration file.
pub const CONFIG_FILE_NAME: &str = "test-explorer.toml";

/// `dataKind` sent with every debug-adapter start request issued by a test run.
pub const TEST_SELECTION_DATA_KIND: &str = "scala-test-suites-selection";

/// Debug-adapter event carrying a `TestSuiteResult`.
pub const TEST_RESULT_EVENT: &str = "testResult";

/// `body.category` of a test result event.
pub const TEST_RESULT_CATEGORY: &str = "testResult";

/// Debug configuration key holding the marker of the run that launched a session.
pub const RUN_MARKER_KEY: &str = "testExplorerRun";
