//! Error types for the restore engine.
//!
//! Session-aborting errors (`Configuration`, `NotFound`, `Integrity`,
//! `Extraction`) end a restore in the `FAILED` state. Per-file copy and
//! verification problems are recorded on the session instead.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Pipeline stage that produced an extraction failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractStage {
    Decrypt,
    Decompress,
    Unarchive,
}

impl ExtractStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractStage::Decrypt => "decrypt",
            ExtractStage::Decompress => "decompress",
            ExtractStage::Unarchive => "unarchive",
        }
    }
}

impl fmt::Display for ExtractStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum RestoreError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Integrity error: {0}")]
    Integrity(String),

    #[error("Extraction failed at {stage} stage: {message}")]
    Extraction { stage: ExtractStage, message: String },

    #[error("Filesystem error on {path}: {message}")]
    Filesystem { path: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl RestoreError {
    /// Short machine-readable name used in events and history entries.
    pub fn kind(&self) -> &'static str {
        match self {
            RestoreError::Configuration(_) => "configuration",
            RestoreError::NotFound(_) => "not_found",
            RestoreError::Integrity(_) => "integrity",
            RestoreError::Extraction { .. } => "extraction",
            RestoreError::Filesystem { .. } => "filesystem",
            RestoreError::Io(_) => "io",
            RestoreError::Serialization(_) => "serialization",
            RestoreError::ShuttingDown => "shutting_down",
        }
    }

    pub fn extraction(stage: ExtractStage, message: impl Into<String>) -> Self {
        RestoreError::Extraction {
            stage,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RestoreError>;
