//! Boundary to the backup-creation side.

use async_trait::async_trait;

/// Takes a snapshot of the current state before a restore overwrites it.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Create an incremental backup; returns the new backup's id.
    async fn create_incremental_backup(&self) -> anyhow::Result<String>;
}
