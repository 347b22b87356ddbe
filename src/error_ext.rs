//! Logging conversions for fallible explorer operations.
//!
//! Tree updates and host notifications are best-effort: a failure is logged
//! and the caller carries on. These helpers make that explicit at the call
//! site instead of discarding errors with `.ok()`.

use tracing::{error, warn};

/// Extension trait for Result types that logs the error while converting to Option.
pub trait ResultExt<T, E: std::fmt::Display> {
    /// Convert to Option, logging the error at error level if Err.
    ///
    /// For failures that leave the explorer without data it expected,
    /// such as a rejected discovery request.
    fn ok_logged(self, context: &str) -> Option<T>;

    /// Convert to Option, logging the error at warn level if Err.
    ///
    /// For conditions the server can legitimately cause, such as an update
    /// addressing a suite that was never announced.
    fn ok_warn(self, context: &str) -> Option<T>;
}

impl<T, E: std::fmt::Display> ResultExt<T, E> for Result<T, E> {
    fn ok_logged(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                error!(context = %context, error = %e, "Test explorer operation failed");
                None
            }
        }
    }

    fn ok_warn(self, context: &str) -> Option<T> {
        match self {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(context = %context, error = %e, "Test explorer operation skipped");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::ExplorerError;

    #[test]
    fn test_ok_logged_passes_value_through() {
        let result: Result<&str, ExplorerError> = Ok("suite");
        assert_eq!(result.ok_logged("discovery"), Some("suite"));
    }

    #[test]
    fn test_ok_warn_swallows_broken_path() {
        let result: Result<(), ExplorerError> =
            Err(ExplorerError::broken_path("core", "a.Foo", "a"));
        assert_eq!(result.ok_warn("removeSuite"), None);
    }

    #[test]
    fn test_ok_logged_swallows_discovery_failure() {
        let result: Result<u32, ExplorerError> = Err(ExplorerError::discovery("timeout"));
        assert_eq!(result.ok_logged("discovery"), None);
    }
}
