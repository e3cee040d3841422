//! Backup catalog - discovers backup descriptors and checks them against disk.
//!
//! Descriptors are JSON files written by the backup-creation side. The
//! catalog never writes; `available` is derived on every scan by comparing
//! the recorded size with the archive actually on disk.

use crate::config::Config;
use crate::utils::errors::{RestoreError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A backup artifact as described by its descriptor file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BackupRecord {
    pub id: String,
    /// Creation time, milliseconds since the Unix epoch
    pub timestamp: i64,
    #[serde(rename = "type")]
    pub backup_type: String,
    /// Archive location (absolute, or relative to the backup directory)
    pub path: PathBuf,
    /// Archive size in bytes
    pub size: u64,
    #[serde(default)]
    pub encrypted: bool,
    #[serde(default)]
    pub compressed: bool,
    /// Set by the catalog, never read from the descriptor
    #[serde(default, skip_deserializing)]
    pub available: bool,
}

/// Read-only index over the descriptor directory.
#[derive(Debug, Clone)]
pub struct BackupCatalog {
    metadata_dir: PathBuf,
    backup_dir: Option<PathBuf>,
}

impl BackupCatalog {
    pub fn new(metadata_dir: impl Into<PathBuf>, backup_dir: Option<PathBuf>) -> Self {
        Self {
            metadata_dir: metadata_dir.into(),
            backup_dir,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.catalog.metadata_dir.clone(),
            config.catalog.backup_dir.clone(),
        )
    }

    /// All descriptors, newest first, with `available` and `path` resolved.
    pub async fn list_available_backups(&self) -> Result<Vec<BackupRecord>> {
        let mut records = Vec::new();

        let mut dir = match tokio::fs::read_dir(&self.metadata_dir).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Metadata directory {} does not exist", self.metadata_dir.display());
                return Ok(records);
            }
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = dir.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            match self.load_descriptor(&path).await {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping backup descriptor {}: {}", path.display(), e),
            }
        }

        records.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    pub async fn get_backup_by_id(&self, id: &str) -> Result<BackupRecord> {
        self.list_available_backups()
            .await?
            .into_iter()
            .find(|r| r.id == id)
            .ok_or_else(|| RestoreError::NotFound(format!("backup {}", id)))
    }

    /// Available backups with `start <= timestamp <= end` (epoch ms).
    pub async fn find_backups_by_date_range(
        &self,
        start: i64,
        end: i64,
    ) -> Result<Vec<BackupRecord>> {
        Ok(self
            .list_available_backups()
            .await?
            .into_iter()
            .filter(|r| r.available && r.timestamp >= start && r.timestamp <= end)
            .collect())
    }

    /// The available backup taken at or before `target_time` that is closest to it.
    pub async fn find_closest_backup(
        &self,
        target_time: i64,
        backup_type: Option<&str>,
    ) -> Result<Option<BackupRecord>> {
        let records = self.list_available_backups().await?;
        Ok(closest_before(records, target_time, backup_type))
    }

    async fn load_descriptor(&self, path: &Path) -> Result<BackupRecord> {
        let content = tokio::fs::read(path).await?;
        let mut record: BackupRecord = serde_json::from_slice(&content)?;

        record.path = self.resolve_archive_path(&record.path);
        record.available = match tokio::fs::metadata(&record.path).await {
            Ok(meta) => meta.is_file() && meta.len() == record.size,
            Err(_) => false,
        };

        Ok(record)
    }

    fn resolve_archive_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match &self.backup_dir {
            Some(base) => base.join(path),
            None => self.metadata_dir.join(path),
        }
    }
}

fn closest_before(
    records: Vec<BackupRecord>,
    target_time: i64,
    backup_type: Option<&str>,
) -> Option<BackupRecord> {
    records
        .into_iter()
        .filter(|r| r.available && r.timestamp <= target_time)
        .filter(|r| backup_type.map_or(true, |t| r.backup_type == t))
        .min_by_key(|r| (target_time - r.timestamp).unsigned_abs())
}
