pub mod constants;
pub mod error_ext;
pub mod explorer;
pub mod server;
pub mod types;

pub use server::config::{TestExplorerConfig, TestUserInterface};
pub use server::{ExplorerError, TestManager};
