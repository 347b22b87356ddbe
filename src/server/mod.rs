pub mod cancellation;
pub mod config;
pub mod error;
pub mod host;
pub mod manager;

pub use error::ExplorerError;
pub use manager::TestManager;
