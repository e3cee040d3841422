//! Restore history - a durable, ordered log of finished sessions.
//!
//! The log is one JSON file, rewritten wholesale through a temp file and a
//! rename. Aggregate statistics are never stored; they are recomputed from
//! the entries whenever they are asked for.

use crate::session::{RestoreSession, SessionState};
use crate::utils::errors::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Durable subset of a terminal session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub session_id: String,
    pub backup_id: String,
    pub target_path: PathBuf,
    pub state: SessionState,
    pub files_restored: usize,
    pub files_skipped: usize,
    pub bytes_restored: u64,
    pub errors: usize,
    #[serde(default)]
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl HistoryEntry {
    pub fn from_session(session: &RestoreSession) -> Self {
        Self {
            session_id: session.id.clone(),
            backup_id: session.backup_id.clone(),
            target_path: session.options.target_path.clone(),
            state: session.state,
            files_restored: session.restored_files.len(),
            files_skipped: session.skipped_files.len(),
            bytes_restored: session.restored_files.iter().map(|f| f.size).sum(),
            errors: session.errors.len(),
            failure: session.failure.clone(),
            started_at: session.started_at,
            completed_at: session.completed_at.unwrap_or_else(Utc::now),
            duration_ms: session.duration_ms(),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == SessionState::Completed
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestoreStatistics {
    pub total_restores: usize,
    pub successful_restores: usize,
    pub failed_restores: usize,
    pub total_files_restored: usize,
    pub total_bytes_restored: u64,
    pub average_duration_ms: u64,
}

impl RestoreStatistics {
    pub fn from_entries(entries: &[HistoryEntry]) -> Self {
        let mut stats = RestoreStatistics {
            total_restores: entries.len(),
            ..Default::default()
        };

        let mut total_duration: u128 = 0;
        for entry in entries {
            if entry.succeeded() {
                stats.successful_restores += 1;
            } else {
                stats.failed_restores += 1;
            }
            stats.total_files_restored += entry.files_restored;
            stats.total_bytes_restored += entry.bytes_restored;
            total_duration += entry.duration_ms as u128;
        }

        if !entries.is_empty() {
            stats.average_duration_ms = (total_duration / entries.len() as u128) as u64;
        }

        stats
    }
}

/// On-disk layout. Statistics are written for readers of the file but
/// ignored on load.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryFile {
    #[serde(default)]
    entries: Vec<HistoryEntry>,
    #[serde(default, skip_deserializing)]
    statistics: RestoreStatistics,
}

pub struct HistoryStore {
    path: PathBuf,
    entries: Mutex<Vec<HistoryEntry>>,
}

impl HistoryStore {
    /// Load the log at `path`. A missing file is an empty history; a
    /// malformed one is logged and replaced on the next save.
    pub async fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        let entries = match tokio::fs::read(&path).await {
            Ok(content) => match serde_json::from_slice::<HistoryFile>(&content) {
                Ok(file) => file.entries,
                Err(e) => {
                    warn!("Ignoring unreadable history file {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No history file at {}", path.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        info!("Loaded {} restore history entries", entries.len());

        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Append one terminal session and persist the log.
    pub async fn record(&self, session: &RestoreSession) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.push(HistoryEntry::from_session(session));
        write_atomic(&self.path, &entries).await
    }

    /// Persist the current log without appending.
    pub async fn save(&self) -> Result<()> {
        let entries = self.entries.lock().await;
        write_atomic(&self.path, &entries).await
    }

    /// All entries in completion order
    pub async fn entries(&self) -> Vec<HistoryEntry> {
        self.entries.lock().await.clone()
    }

    /// The newest `limit` entries, newest first
    pub async fn recent(&self, limit: usize) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        entries.iter().rev().take(limit).cloned().collect()
    }

    pub async fn find_by_backup(&self, backup_id: &str) -> Vec<HistoryEntry> {
        let entries = self.entries.lock().await;
        entries
            .iter()
            .filter(|e| e.backup_id == backup_id)
            .cloned()
            .collect()
    }

    pub async fn statistics(&self) -> RestoreStatistics {
        let entries = self.entries.lock().await;
        RestoreStatistics::from_entries(&entries)
    }
}

async fn write_atomic(path: &Path, entries: &[HistoryEntry]) -> Result<()> {
    let file = HistoryFile {
        entries: entries.to_vec(),
        statistics: RestoreStatistics::from_entries(entries),
    };
    let json = serde_json::to_vec_pretty(&file)?;

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, &json).await?;
    tokio::fs::rename(&tmp, path).await?;

    debug!("Saved {} history entries to {}", entries.len(), path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ConflictStrategy;
    use crate::session::{RestoreOptions, RestoreRequest, RestoredFile};
    use tempfile::TempDir;

    fn finished(backup_id: &str, files: &[u64], ok: bool) -> RestoreSession {
        let options = RestoreOptions::from_request(
            &RestoreRequest::new(backup_id),
            Path::new("/restore"),
            ConflictStrategy::Prompt,
        );
        let mut session = RestoreSession::new(backup_id, options);
        for (i, size) in files.iter().enumerate() {
            session.restored_files.push(RestoredFile {
                relative_path: format!("f{}", i),
                target_path: PathBuf::from(format!("/restore/f{}", i)),
                size: *size,
            });
        }
        if ok {
            session.transition(SessionState::Completed);
        } else {
            session.fail("archive missing");
        }
        session
    }

    #[tokio::test]
    async fn test_missing_file_is_empty_history() {
        let dir = TempDir::new().unwrap();
        let store = HistoryStore::load(dir.path().join("history.json")).await.unwrap();
        assert!(store.entries().await.is_empty());
        assert_eq!(store.statistics().await, RestoreStatistics::default());
    }

    #[tokio::test]
    async fn test_record_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/history.json");

        let store = HistoryStore::load(&path).await.unwrap();
        store.record(&finished("b1", &[10, 20], true)).await.unwrap();
        store.record(&finished("b2", &[], false)).await.unwrap();
        store.record(&finished("b1", &[5], true)).await.unwrap();

        let reloaded = HistoryStore::load(&path).await.unwrap();
        let stats = reloaded.statistics().await;
        assert_eq!(stats.total_restores, 3);
        assert_eq!(stats.successful_restores, 2);
        assert_eq!(stats.failed_restores, 1);
        assert_eq!(stats.total_files_restored, 3);
        assert_eq!(stats.total_bytes_restored, 35);

        let recent = reloaded.recent(2).await;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].backup_id, "b1");
        assert_eq!(recent[1].backup_id, "b2");
        assert_eq!(reloaded.find_by_backup("b1").await.len(), 2);
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_stored_statistics_are_not_trusted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");

        let store = HistoryStore::load(&path).await.unwrap();
        store.record(&finished("b1", &[1], true)).await.unwrap();

        // Tamper with the persisted counters
        let mut raw: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        raw["statistics"]["total_restores"] = serde_json::json!(99);
        std::fs::write(&path, serde_json::to_vec(&raw).unwrap()).unwrap();

        let reloaded = HistoryStore::load(&path).await.unwrap();
        assert_eq!(reloaded.statistics().await.total_restores, 1);
    }

    #[tokio::test]
    async fn test_malformed_file_starts_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, b"{not json").unwrap();

        let store = HistoryStore::load(&path).await.unwrap();
        assert!(store.entries().await.is_empty());
    }
}
