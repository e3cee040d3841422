//! Integrity checks before and after a restore.

pub mod integrity;
pub mod post_restore;

pub use integrity::IntegrityVerifier;
pub use post_restore::verify_restored;
