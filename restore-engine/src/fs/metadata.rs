//! File metadata captured from the extraction tree and reapplied on restore.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::SystemTime;

/// Metadata needed to classify and restore a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    /// File size in bytes
    pub size: u64,

    /// Last modified time
    pub modified: SystemTime,

    /// File permissions (Unix mode bits)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub permissions: Option<u32>,
}

impl FileMetadata {
    /// Read metadata from a path, following symlinks
    pub fn from_path(path: &Path) -> std::io::Result<Self> {
        Ok(Self::from_metadata(&fs::metadata(path)?))
    }

    pub fn from_metadata(metadata: &fs::Metadata) -> Self {
        #[cfg(unix)]
        let permissions = {
            use std::os::unix::fs::PermissionsExt;
            Some(metadata.permissions().mode())
        };

        #[cfg(not(unix))]
        let permissions = None;

        Self {
            size: metadata.len(),
            modified: metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            permissions,
        }
    }

    /// Apply the captured permission bits to `path`
    #[cfg(unix)]
    pub fn apply_permissions(&self, path: &Path) -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        if let Some(mode) = self.permissions {
            fs::set_permissions(path, fs::Permissions::from_mode(mode & 0o7777))?;
        }
        Ok(())
    }

    #[cfg(not(unix))]
    pub fn apply_permissions(&self, _path: &Path) -> std::io::Result<()> {
        // Mode bits have no meaning here
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_extract_metadata() -> std::io::Result<()> {
        let mut temp_file = NamedTempFile::new()?;
        temp_file.write_all(b"test content")?;
        temp_file.flush()?;

        let metadata = FileMetadata::from_path(temp_file.path())?;

        assert_eq!(metadata.size, 12);
        assert!(metadata.modified > SystemTime::UNIX_EPOCH);

        Ok(())
    }

    #[test]
    #[cfg(unix)]
    fn test_apply_permissions() -> std::io::Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let source = NamedTempFile::new()?;
        fs::set_permissions(source.path(), fs::Permissions::from_mode(0o640))?;
        let metadata = FileMetadata::from_path(source.path())?;

        let target = NamedTempFile::new()?;
        fs::set_permissions(target.path(), fs::Permissions::from_mode(0o600))?;
        metadata.apply_permissions(target.path())?;

        let mode = fs::metadata(target.path())?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);

        Ok(())
    }
}
