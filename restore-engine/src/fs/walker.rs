//! Directory traversal over an extraction tree.
//!
//! Only regular files are reported. Relative paths are always `/`-separated
//! so glob patterns behave the same on every platform.

use super::metadata::FileMetadata;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Information about a file discovered during walking
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Full path to the file
    pub path: PathBuf,

    /// Path relative to the walk root, `/`-separated
    pub relative_path: String,

    pub metadata: FileMetadata,
}

impl FileInfo {
    /// Returns None for anything that is not a regular file (directories,
    /// symlinks, devices).
    fn from_entry(entry: &DirEntry, root: &Path) -> std::io::Result<Option<Self>> {
        if !entry.file_type().is_file() {
            return Ok(None);
        }

        let path = entry.path().to_path_buf();
        let relative = path.strip_prefix(root).unwrap_or(&path);
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let metadata = entry.metadata().map_err(std::io::Error::from)?;

        Ok(Some(Self {
            path,
            relative_path,
            metadata: FileMetadata::from_metadata(&metadata),
        }))
    }
}

/// Walk a directory tree and collect every regular file.
///
/// Entries are visited in file-name order so repeated walks over the same
/// tree yield the same sequence.
///
/// # Example
/// ```no_run
/// use restore_engine::fs::walker::walk_files;
/// use std::path::Path;
///
/// let files = walk_files(Path::new("/tmp/restore-123")).unwrap();
/// println!("Found {} files", files.len());
/// ```
pub fn walk_files(root: &Path) -> std::io::Result<Vec<FileInfo>> {
    let mut files = Vec::new();

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name();

    for entry in walker {
        let entry = entry.map_err(std::io::Error::from)?;

        if let Some(file_info) = FileInfo::from_entry(&entry, root)? {
            files.push(file_info);
        }
    }

    Ok(files)
}
