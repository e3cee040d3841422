//! Progress accounting for the copy phase.

pub mod progress;

pub use progress::{format_bytes, format_duration, RestoreProgress};
