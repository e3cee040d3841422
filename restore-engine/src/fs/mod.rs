//! Filesystem helpers shared by the resolver, executor and verifiers.

pub mod metadata;
pub mod walker;

pub use metadata::FileMetadata;
pub use walker::{walk_files, FileInfo};
