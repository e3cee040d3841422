//! Pre-restore integrity gate.

use crate::catalog::BackupRecord;
use crate::config::KEY_LEN;
use crate::utils::errors::{RestoreError, Result};
use tracing::info;

/// Checks a backup before anything is extracted or written.
#[derive(Clone)]
pub struct IntegrityVerifier {
    key: Option<[u8; KEY_LEN]>,
}

impl IntegrityVerifier {
    pub fn new(key: Option<[u8; KEY_LEN]>) -> Self {
        Self { key }
    }

    /// Fails on a missing archive, a size mismatch, or an encrypted backup
    /// with no key to open it.
    pub async fn verify(&self, backup: &BackupRecord) -> Result<()> {
        let metadata = match tokio::fs::metadata(&backup.path).await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                return Err(RestoreError::Integrity(format!(
                    "archive {} is not a regular file",
                    backup.path.display()
                )))
            }
            Err(e) => {
                return Err(RestoreError::Integrity(format!(
                    "archive {} is unreadable: {}",
                    backup.path.display(),
                    e
                )))
            }
        };

        if metadata.len() != backup.size {
            return Err(RestoreError::Integrity(format!(
                "archive {} is {} bytes, descriptor records {}",
                backup.path.display(),
                metadata.len(),
                backup.size
            )));
        }

        if backup.encrypted && self.key.is_none() {
            return Err(RestoreError::Configuration(format!(
                "backup {} is encrypted but no decryption key is configured",
                backup.id
            )));
        }

        info!(backup_id = %backup.id, size = backup.size, "Backup integrity verified");
        Ok(())
    }
}

impl std::fmt::Debug for IntegrityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityVerifier")
            .field("has_key", &self.key.is_some())
            .finish()
    }
}
