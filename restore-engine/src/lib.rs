//! Restore Engine Library
//!
//! Restores files from tar backups (optionally compressed and encrypted)
//! into a target directory, with conflict resolution, progress events and
//! a durable restore history.

pub mod catalog;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod executor;
pub mod extract;
pub mod fs;
pub mod history;
pub mod resolve;
pub mod session;
pub mod snapshot;
pub mod transfer;
pub mod utils;
pub mod verify;

#[cfg(test)]
mod test_support;

// Re-export commonly used types
pub use catalog::{BackupCatalog, BackupRecord};
pub use config::Config;
pub use engine::{RestoreEngine, RestoreHandle};
pub use resolve::ConflictStrategy;
pub use session::{RestoreEvent, RestoreRequest, RestoreSession, SessionState};
pub use snapshot::SnapshotProvider;
pub use utils::errors::{RestoreError, Result};
