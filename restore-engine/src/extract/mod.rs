//! Extraction pipeline: archive file → decrypt → decompress → unpack.
//!
//! Stages are chained as streaming readers so no stage holds the whole
//! archive in memory. The tar unpacker is synchronous and runs on the
//! blocking pool, pulling from the async chain through a `SyncIoBridge`.

pub mod cipher;
pub mod stage;

use crate::catalog::BackupRecord;
use crate::config::KEY_LEN;
use crate::utils::errors::{ExtractStage, RestoreError, Result};
use async_compression::tokio::bufread::{GzipDecoder, ZstdDecoder};
use cipher::DecryptReader;
use stage::{into_restore_error, BoxReader, Staged};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const ZSTD_MAGIC: [u8; 4] = [0x28, 0xb5, 0x2f, 0xfd];

/// Compression format detected from the stream's leading bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Codec {
    Gzip,
    Zstd,
}

impl Codec {
    /// Anything that is not zstd is handed to the gzip decoder, which
    /// rejects it with a decompress-stage error.
    fn sniff(head: &[u8]) -> Self {
        if head.starts_with(&ZSTD_MAGIC) {
            Codec::Zstd
        } else {
            Codec::Gzip
        }
    }
}

/// Directory tree unpacked from one archive
#[derive(Debug)]
pub struct ExtractedTree {
    pub root: PathBuf,
}

#[derive(Clone)]
pub struct ExtractionPipeline {
    temp_dir: PathBuf,
    chunk_size: usize,
    key: Option<[u8; KEY_LEN]>,
}

impl ExtractionPipeline {
    pub fn new(
        temp_dir: impl Into<PathBuf>,
        chunk_size: usize,
        key: Option<[u8; KEY_LEN]>,
    ) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            chunk_size: chunk_size.max(1),
            key,
        }
    }

    /// Working directory owned by one session
    pub fn work_dir(&self, session_id: &str) -> PathBuf {
        self.temp_dir.join(format!("restore-{}", session_id))
    }

    /// Unpack `backup` into the session's working directory. On failure the
    /// partial tree is removed before the error is returned.
    pub async fn extract(&self, backup: &BackupRecord, session_id: &str) -> Result<ExtractedTree> {
        let root = self.work_dir(session_id);
        tokio::fs::create_dir_all(&root).await.map_err(|e| {
            RestoreError::extraction(
                ExtractStage::Unarchive,
                format!("cannot create working directory {}: {}", root.display(), e),
            )
        })?;

        info!(
            backup_id = %backup.id,
            encrypted = backup.encrypted,
            compressed = backup.compressed,
            "Extracting backup into {}",
            root.display()
        );

        match self.run_stages(backup, &root).await {
            Ok(()) => Ok(ExtractedTree { root }),
            Err(e) => {
                remove_working_tree(&root).await;
                Err(e)
            }
        }
    }

    async fn run_stages(&self, backup: &BackupRecord, root: &Path) -> Result<()> {
        let file = tokio::fs::File::open(&backup.path).await.map_err(|e| {
            RestoreError::NotFound(format!("archive {}: {}", backup.path.display(), e))
        })?;
        let mut reader: BoxReader = Box::pin(BufReader::with_capacity(self.chunk_size, file));

        if backup.encrypted {
            let key = self.key.ok_or_else(|| {
                RestoreError::Configuration(format!(
                    "backup {} is encrypted but no decryption key is configured",
                    backup.id
                ))
            })?;
            reader = Box::pin(Staged::new(ExtractStage::Decrypt, DecryptReader::new(reader, key)));
        }

        if backup.compressed {
            reader = decompress(reader, self.chunk_size).await?;
        }

        unarchive(reader, root).await
    }
}

async fn decompress(reader: BoxReader, chunk_size: usize) -> Result<BoxReader> {
    let mut buffered = BufReader::with_capacity(chunk_size, reader);
    let head = buffered
        .fill_buf()
        .await
        .map_err(|e| into_restore_error(ExtractStage::Decompress, e))?;
    let codec = Codec::sniff(head);
    debug!("Decompressing with {:?}", codec);

    let decoded: BoxReader = match codec {
        Codec::Zstd => Box::pin(ZstdDecoder::new(buffered)),
        Codec::Gzip => {
            let mut decoder = GzipDecoder::new(buffered);
            decoder.multiple_members(true);
            Box::pin(decoder)
        }
    };

    Ok(Box::pin(Staged::new(ExtractStage::Decompress, decoded)))
}

async fn unarchive(reader: BoxReader, root: &Path) -> Result<()> {
    let bridge = SyncIoBridge::new(reader);
    let dest = root.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut archive = tar::Archive::new(bridge);
        archive.set_preserve_permissions(true);
        archive.set_preserve_mtime(true);
        archive.set_unpack_xattrs(false);
        archive.unpack(&dest)?;

        // Tar stops at its end-of-archive blocks; the decoders only verify
        // their trailer checksums once read to EOF.
        let drained = std::io::copy(&mut archive.into_inner(), &mut std::io::sink())?;
        if drained > 0 {
            debug!("Drained {} trailing bytes after the archive end", drained);
        }
        Ok::<(), std::io::Error>(())
    })
    .await
    .map_err(|e| {
        RestoreError::extraction(ExtractStage::Unarchive, format!("unpack task failed: {}", e))
    })?
    .map_err(|e| into_restore_error(ExtractStage::Unarchive, e))
}

/// Best-effort removal of a session working directory.
pub async fn remove_working_tree(root: &Path) {
    match tokio::fs::remove_dir_all(root).await {
        Ok(()) => debug!("Removed working directory {}", root.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove working directory {}: {}", root.display(), e),
    }
}
