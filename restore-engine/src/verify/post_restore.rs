//! Post-restore re-check of written files.
//!
//! Mismatches are reported, never repaired: copied files stay where they are.

use crate::session::{FileError, FileErrorKind, RestoredFile};
use tracing::warn;

/// Re-stat every restored file and report the ones that are missing or
/// have the wrong size.
pub async fn verify_restored(files: &[RestoredFile]) -> Vec<FileError> {
    let mut errors = Vec::new();

    for file in files {
        let message = match tokio::fs::metadata(&file.target_path).await {
            Ok(meta) if meta.len() == file.size => continue,
            Ok(meta) => format!(
                "size mismatch: expected {} bytes, found {}",
                file.size,
                meta.len()
            ),
            Err(e) => format!("restored file missing: {}", e),
        };

        warn!(path = %file.relative_path, "Post-restore verification failed: {}", message);
        errors.push(FileError {
            path: file.relative_path.clone(),
            kind: FileErrorKind::Verification,
            message,
        });
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_reports_missing_and_mismatched_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("ok.txt"), b"12345").unwrap();
        std::fs::write(dir.path().join("short.txt"), b"12").unwrap();

        let files = vec![
            RestoredFile {
                relative_path: "ok.txt".into(),
                target_path: dir.path().join("ok.txt"),
                size: 5,
            },
            RestoredFile {
                relative_path: "short.txt".into(),
                target_path: dir.path().join("short.txt"),
                size: 5,
            },
            RestoredFile {
                relative_path: "gone.txt".into(),
                target_path: dir.path().join("gone.txt"),
                size: 1,
            },
        ];

        let errors = verify_restored(&files).await;
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, "short.txt");
        assert_eq!(errors[1].path, "gone.txt");
        assert!(errors.iter().all(|e| e.kind == FileErrorKind::Verification));
        // Nothing is rolled back
        assert!(dir.path().join("short.txt").exists());
    }
}
