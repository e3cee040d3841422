//! Restore sessions: request, options, state machine and per-file records.

pub mod events;

pub use events::{RestoreEvent, SessionEvents};

use crate::resolve::{ConflictStrategy, FileCandidate, Resolution};
use crate::transfer::progress::RestoreProgress;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Session lifecycle.
///
/// `INITIALIZING → VERIFYING → [PRE_BACKUP] → EXTRACTING → ANALYZING →
/// RESOLVING_CONFLICTS → RESTORING → [VERIFYING_RESULT] → COMPLETED`,
/// or `FAILED` from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Initializing,
    Verifying,
    PreBackup,
    Extracting,
    Analyzing,
    ResolvingConflicts,
    Restoring,
    VerifyingResult,
    Completed,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed)
    }

    /// Position in the forward path, used to reject backwards transitions
    fn ordinal(&self) -> u8 {
        match self {
            SessionState::Initializing => 0,
            SessionState::Verifying => 1,
            SessionState::PreBackup => 2,
            SessionState::Extracting => 3,
            SessionState::Analyzing => 4,
            SessionState::ResolvingConflicts => 5,
            SessionState::Restoring => 6,
            SessionState::VerifyingResult => 7,
            SessionState::Completed | SessionState::Failed => 8,
        }
    }

    /// Forward moves only; `Failed` is reachable from any non-terminal state.
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        if self.is_terminal() {
            return false;
        }
        match next {
            SessionState::Failed => true,
            _ => next.ordinal() > self.ordinal(),
        }
    }
}

/// Transport-agnostic restore request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreRequest {
    pub backup_id: String,

    /// Destination; the configured restore root when absent
    #[serde(default)]
    pub target_path: Option<PathBuf>,

    /// Apply `file_patterns` as an include list
    #[serde(default)]
    pub selective: bool,

    #[serde(default)]
    pub file_patterns: Vec<String>,

    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Shorthand for `conflict_strategy = overwrite`
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub conflict_strategy: Option<ConflictStrategy>,

    #[serde(default = "default_true")]
    pub verify_integrity: bool,

    /// Snapshot the current state before restoring
    #[serde(default)]
    pub create_backup: bool,
}

fn default_true() -> bool {
    true
}

impl RestoreRequest {
    pub fn new(backup_id: impl Into<String>) -> Self {
        Self {
            backup_id: backup_id.into(),
            target_path: None,
            selective: false,
            file_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            overwrite: false,
            conflict_strategy: None,
            verify_integrity: true,
            create_backup: false,
        }
    }

    pub fn target(mut self, path: impl Into<PathBuf>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = Some(strategy);
        self
    }
}

/// Options after defaults have been applied
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub target_path: PathBuf,
    pub selective: bool,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub strategy: ConflictStrategy,
    pub verify_integrity: bool,
    pub create_backup: bool,
}

impl RestoreOptions {
    /// An explicit strategy wins, then `overwrite`, then the configured default.
    pub fn from_request(
        request: &RestoreRequest,
        restore_root: &std::path::Path,
        default_strategy: ConflictStrategy,
    ) -> Self {
        let strategy = match (request.conflict_strategy, request.overwrite) {
            (Some(strategy), _) => strategy,
            (None, true) => ConflictStrategy::Overwrite,
            (None, false) => default_strategy,
        };

        Self {
            target_path: request
                .target_path
                .clone()
                .unwrap_or_else(|| restore_root.to_path_buf()),
            selective: request.selective,
            include_patterns: if request.selective {
                request.file_patterns.clone()
            } else {
                Vec::new()
            },
            exclude_patterns: request.exclude_patterns.clone(),
            strategy,
            verify_integrity: request.verify_integrity,
            create_backup: request.create_backup,
        }
    }
}

/// Decision recorded for a file that already existed at the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub relative_path: String,
    pub target_path: PathBuf,
    pub resolution: Resolution,
    pub reason: String,
}

impl ConflictRecord {
    /// None for candidates without a conflict or not yet resolved
    pub fn from_candidate(candidate: &FileCandidate) -> Option<Self> {
        if !candidate.conflict {
            return None;
        }
        Some(Self {
            relative_path: candidate.relative_path.clone(),
            target_path: candidate.target_path.clone(),
            resolution: candidate.resolution.clone()?,
            reason: candidate.reason.clone().unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoredFile {
    pub relative_path: String,
    /// Where the bytes were written (differs from the natural path on rename)
    pub target_path: PathBuf,
    /// Size recorded in the backup, checked again after the restore
    pub size: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileErrorKind {
    Filesystem,
    Verification,
}

/// Per-file failure that did not abort the session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub kind: FileErrorKind,
    pub message: String,
}

/// One end-to-end restore operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreSession {
    pub id: String,
    pub backup_id: String,
    pub state: SessionState,
    pub options: RestoreOptions,
    pub progress: RestoreProgress,
    pub conflicts: Vec<ConflictRecord>,
    pub restored_files: Vec<RestoredFile>,
    pub skipped_files: Vec<String>,
    pub errors: Vec<FileError>,
    /// Terminal error for `FAILED` sessions
    pub failure: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RestoreSession {
    pub fn new(backup_id: impl Into<String>, options: RestoreOptions) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            backup_id: backup_id.into(),
            state: SessionState::Initializing,
            options,
            progress: RestoreProgress::new(),
            conflicts: Vec::new(),
            restored_files: Vec::new(),
            skipped_files: Vec::new(),
            errors: Vec::new(),
            failure: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Move to `next`; returns false and leaves the state alone when the
    /// move is not allowed.
    pub fn transition(&mut self, next: SessionState) -> bool {
        if !self.state.can_transition_to(next) {
            return false;
        }
        self.state = next;
        self.progress.stage = next;
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        true
    }

    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        if !self.transition(SessionState::Failed) {
            return false;
        }
        self.failure = Some(message.into());
        true
    }

    pub fn record_error(
        &mut self,
        path: impl Into<String>,
        kind: FileErrorKind,
        message: impl Into<String>,
    ) {
        self.errors.push(FileError {
            path: path.into(),
            kind,
            message: message.into(),
        });
    }

    pub fn duration_ms(&self) -> u64 {
        let end = self.completed_at.unwrap_or_else(Utc::now);
        (end - self.started_at).num_milliseconds().max(0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn options() -> RestoreOptions {
        RestoreOptions::from_request(
            &RestoreRequest::new("b1"),
            Path::new("/restore"),
            ConflictStrategy::Prompt,
        )
    }

    #[test]
    fn test_forward_transitions_only() {
        let mut session = RestoreSession::new("b1", options());
        assert!(session.transition(SessionState::Verifying));
        assert!(session.transition(SessionState::Extracting));
        assert!(!session.transition(SessionState::Verifying));
        assert_eq!(session.state, SessionState::Extracting);
        assert_eq!(session.progress.stage, SessionState::Extracting);
    }

    #[test]
    fn test_exactly_one_terminal_state() {
        let mut session = RestoreSession::new("b1", options());
        assert!(session.fail("boom"));
        assert!(session.completed_at.is_some());
        assert!(!session.transition(SessionState::Completed));
        assert!(!session.fail("again"));
        assert_eq!(session.state, SessionState::Failed);
        assert_eq!(session.failure.as_deref(), Some("boom"));
    }

    #[test]
    fn test_options_strategy_precedence() {
        let root = Path::new("/restore");

        let mut request = RestoreRequest::new("b1");
        assert_eq!(
            RestoreOptions::from_request(&request, root, ConflictStrategy::Rename).strategy,
            ConflictStrategy::Rename
        );

        request.overwrite = true;
        assert_eq!(
            RestoreOptions::from_request(&request, root, ConflictStrategy::Rename).strategy,
            ConflictStrategy::Overwrite
        );

        request.conflict_strategy = Some(ConflictStrategy::Skip);
        assert_eq!(
            RestoreOptions::from_request(&request, root, ConflictStrategy::Rename).strategy,
            ConflictStrategy::Skip
        );
    }

    #[test]
    fn test_include_patterns_need_selective() {
        let mut request = RestoreRequest::new("b1");
        request.file_patterns = vec!["*.txt".into()];
        request.exclude_patterns = vec!["*.tmp".into()];

        let opts = RestoreOptions::from_request(&request, Path::new("/r"), ConflictStrategy::Prompt);
        assert!(opts.include_patterns.is_empty());
        assert_eq!(opts.exclude_patterns, vec!["*.tmp".to_string()]);
        assert_eq!(opts.target_path, PathBuf::from("/r"));

        request.selective = true;
        let opts = RestoreOptions::from_request(&request, Path::new("/r"), ConflictStrategy::Prompt);
        assert_eq!(opts.include_patterns, vec!["*.txt".to_string()]);
    }

    #[test]
    fn test_request_defaults_from_json() {
        let request: RestoreRequest = serde_json::from_str(r#"{"backup_id":"b7"}"#).unwrap();
        assert!(request.verify_integrity);
        assert!(!request.create_backup);
        assert!(request.conflict_strategy.is_none());
    }
}
