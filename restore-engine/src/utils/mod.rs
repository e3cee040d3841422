//! Utility modules for the restore engine.

pub mod errors;
pub mod logger;

pub use errors::{ExtractStage, RestoreError, Result};
