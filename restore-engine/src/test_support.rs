//! Archive and descriptor builders shared by the unit tests.

use crate::catalog::BackupRecord;
use crate::config::KEY_LEN;
use crate::extract::cipher::{Aes256Ctr, IV_LEN};
use ctr::cipher::{KeyIvInit, StreamCipher};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::io::Write;
use std::path::Path;
use tokio::io::AsyncReadExt;

pub const TEST_KEY: [u8; KEY_LEN] = [0x5a; KEY_LEN];

/// Fixed mtime for archive entries (2021-01-01T00:00:00Z)
pub const ENTRY_MTIME: u64 = 1_609_459_200;

/// Build an uncompressed tar from `(path, contents)` pairs.
pub fn tar_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(0o640);
        header.set_mtime(ENTRY_MTIME);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    builder.into_inner().unwrap()
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub async fn zstd(data: &[u8]) -> Vec<u8> {
    let mut encoder = async_compression::tokio::bufread::ZstdEncoder::new(data);
    let mut out = Vec::new();
    encoder.read_to_end(&mut out).await.unwrap();
    out
}

/// IV prefix followed by AES-256-CTR ciphertext.
pub fn encrypt(key: &[u8; KEY_LEN], data: &[u8]) -> Vec<u8> {
    let iv = [0x24u8; IV_LEN];
    let mut body = data.to_vec();
    Aes256Ctr::new_from_slices(key, &iv)
        .unwrap()
        .apply_keystream(&mut body);

    let mut out = iv.to_vec();
    out.extend_from_slice(&body);
    out
}

/// Write `archive` into `backup_dir` and a matching descriptor into
/// `metadata_dir`, returning the record as the catalog will see it.
pub fn write_backup(
    metadata_dir: &Path,
    backup_dir: &Path,
    id: &str,
    timestamp: i64,
    archive: &[u8],
    encrypted: bool,
    compressed: bool,
) -> BackupRecord {
    std::fs::create_dir_all(metadata_dir).unwrap();
    std::fs::create_dir_all(backup_dir).unwrap();

    let path = backup_dir.join(format!("{}.tar", id));
    std::fs::write(&path, archive).unwrap();

    let record = BackupRecord {
        id: id.to_string(),
        timestamp,
        backup_type: "full".to_string(),
        path,
        size: archive.len() as u64,
        encrypted,
        compressed,
        available: true,
    };

    let json = serde_json::to_vec_pretty(&record).unwrap();
    std::fs::write(metadata_dir.join(format!("{}.json", id)), json).unwrap();
    record
}
