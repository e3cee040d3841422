//! Restore executor - copies resolved candidates into the target tree.
//!
//! Candidates are processed in discovery order. A failure on one file is
//! recorded on the session and the run carries on with the next one.

use crate::config::RestoreConfig;
use crate::fs::FileMetadata;
use crate::resolve::{FileCandidate, Resolution};
use crate::session::{FileErrorKind, RestoreSession, RestoredFile, SessionEvents};
use crate::transfer::format_bytes;
use crate::utils::errors::{RestoreError, Result};
use std::path::Path;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

/// Outcome counts of one executor run
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub restored: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

#[derive(Debug, Clone)]
pub struct RestoreExecutor {
    chunk_size: usize,
    preserve_permissions: bool,
    progress_interval: usize,
}

impl RestoreExecutor {
    pub fn new(chunk_size: usize, preserve_permissions: bool, progress_interval: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            preserve_permissions,
            progress_interval: progress_interval.max(1),
        }
    }

    pub fn from_config(config: &RestoreConfig) -> Self {
        Self::new(
            config.chunk_size,
            config.preserve_permissions,
            config.progress_interval,
        )
    }

    /// Copy every candidate according to its resolution, updating the
    /// session's progress and file records as it goes.
    pub async fn execute(
        &self,
        session: &mut RestoreSession,
        candidates: &[FileCandidate],
        events: &SessionEvents,
    ) -> ExecutionSummary {
        let total_bytes: u64 = candidates
            .iter()
            .filter(|c| !matches!(c.resolution, Some(Resolution::Skip)))
            .map(|c| c.size)
            .sum();
        session.progress.begin(candidates.len(), total_bytes);

        info!(
            session_id = %session.id,
            "Restoring {} files ({})",
            candidates.len(),
            format_bytes(total_bytes)
        );

        if candidates.is_empty() {
            events.progress(session);
            return ExecutionSummary::default();
        }

        let mut summary = ExecutionSummary::default();

        for candidate in candidates {
            let copied = match candidate.resolution.as_ref() {
                None | Some(Resolution::Skip) => {
                    debug!(path = %candidate.relative_path, "Skipping");
                    session.skipped_files.push(candidate.relative_path.clone());
                    summary.skipped += 1;
                    0
                }
                Some(resolution) => {
                    let create_new = matches!(resolution, Resolution::Rename { .. });
                    let destination = resolution
                        .destination(candidate)
                        .unwrap_or(candidate.target_path.as_path());

                    match self.restore_file(candidate, destination, create_new).await {
                        Ok(bytes) => {
                            debug!(path = %candidate.relative_path, bytes, "Restored");
                            session.restored_files.push(RestoredFile {
                                relative_path: candidate.relative_path.clone(),
                                target_path: destination.to_path_buf(),
                                size: candidate.size,
                            });
                            summary.restored += 1;
                            summary.bytes += bytes;
                            bytes
                        }
                        Err(e) => {
                            warn!(path = %candidate.relative_path, "Failed to restore file: {}", e);
                            session.record_error(
                                candidate.relative_path.clone(),
                                FileErrorKind::Filesystem,
                                e.to_string(),
                            );
                            summary.failed += 1;
                            0
                        }
                    }
                }
            };

            session.progress.record_file(copied);

            let processed = session.progress.files_processed;
            if processed % self.progress_interval == 0 || session.progress.is_complete() {
                events.progress(session);
            }
        }

        info!(
            session_id = %session.id,
            restored = summary.restored,
            skipped = summary.skipped,
            failed = summary.failed,
            "Copy phase finished ({})",
            format_bytes(summary.bytes)
        );

        summary
    }

    /// Stream one file to `destination`. Rename targets are opened with
    /// create-new so an existing path is never replaced. A symlink at the
    /// destination is replaced by a regular file, never written through.
    async fn restore_file(
        &self,
        candidate: &FileCandidate,
        destination: &Path,
        create_new: bool,
    ) -> Result<u64> {
        let fs_error = |message: String| RestoreError::Filesystem {
            path: candidate.relative_path.clone(),
            message,
        };

        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| fs_error(format!("cannot create {}: {}", parent.display(), e)))?;
        }

        let source = tokio::fs::File::open(&candidate.source_path)
            .await
            .map_err(|e| fs_error(format!("cannot read extracted file: {}", e)))?;
        let mut reader = BufReader::with_capacity(self.chunk_size, source);

        if !create_new {
            unlink_symlink(destination).await.map_err(|e| {
                fs_error(format!("cannot replace link {}: {}", destination.display(), e))
            })?;
        }

        let mut options = OpenOptions::new();
        options.write(true);
        if create_new {
            options.create_new(true);
        } else {
            options.create(true).truncate(true);
        }
        let mut target = options
            .open(destination)
            .await
            .map_err(|e| fs_error(format!("cannot open {}: {}", destination.display(), e)))?;

        let bytes = tokio::io::copy_buf(&mut reader, &mut target)
            .await
            .map_err(|e| fs_error(format!("copy failed: {}", e)))?;
        target
            .flush()
            .await
            .map_err(|e| fs_error(format!("flush failed: {}", e)))?;
        drop(target);

        if self.preserve_permissions {
            let metadata = FileMetadata {
                size: candidate.size,
                modified: candidate.modified,
                permissions: candidate.permissions,
            };
            metadata
                .apply_permissions(destination)
                .map_err(|e| fs_error(format!("cannot set permissions: {}", e)))?;
        }

        Ok(bytes)
    }
}

async fn unlink_symlink(path: &Path) -> std::io::Result<()> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.file_type().is_symlink() => {
            debug!("Removing symlink at {}", path.display());
            tokio::fs::remove_file(path).await
        }
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
