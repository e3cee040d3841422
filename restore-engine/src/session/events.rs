//! Per-session event channel.
//!
//! Each session owns its own broadcast sender; subscribers attach before the
//! session task is spawned so they see every event from `restore:started`
//! onwards.

use super::{RestoreSession, SessionState};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Maximum number of queued events per subscriber
const EVENT_CAPACITY: usize = 1000;

/// Events emitted while a session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum RestoreEvent {
    #[serde(rename = "restore:started")]
    Started { session_id: String, backup_id: String },

    #[serde(rename = "restore:progress")]
    Progress(ProgressPayload),

    #[serde(rename = "restore:completed")]
    Completed { session: Box<RestoreSession> },

    #[serde(rename = "restore:failed")]
    Failed {
        session_id: String,
        kind: String,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub session_id: String,
    pub stage: SessionState,
    pub percentage: u8,
    pub files_processed: usize,
    pub total_files: usize,
    pub bytes_processed: u64,
    pub total_bytes: u64,
}

impl ProgressPayload {
    pub fn from_session(session: &RestoreSession) -> Self {
        Self {
            session_id: session.id.clone(),
            stage: session.state,
            percentage: session.progress.percentage,
            files_processed: session.progress.files_processed,
            total_files: session.progress.total_files,
            bytes_processed: session.progress.bytes_processed,
            total_bytes: session.progress.total_bytes,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SessionEvents {
    tx: broadcast::Sender<RestoreEvent>,
}

impl SessionEvents {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CAPACITY);
        Self { tx }
    }

    /// Send to every subscriber. Having none is not an error.
    pub fn emit(&self, event: RestoreEvent) {
        if let Err(e) = self.tx.send(event) {
            debug!("Restore event dropped (no subscribers): {:?}", e.0);
        }
    }

    pub fn progress(&self, session: &RestoreSession) {
        self.emit(RestoreEvent::Progress(ProgressPayload::from_session(session)));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RestoreEvent> {
        self.tx.subscribe()
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscriber_receives_events() {
        let events = SessionEvents::new();
        let mut rx = events.subscribe();

        events.emit(RestoreEvent::Started {
            session_id: "s1".into(),
            backup_id: "b1".into(),
        });

        match rx.recv().await.unwrap() {
            RestoreEvent::Started { session_id, .. } => assert_eq!(session_id, "s1"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_emit_without_subscribers() {
        let events = SessionEvents::new();
        events.emit(RestoreEvent::Failed {
            session_id: "s1".into(),
            kind: "not_found".into(),
            error: "backup b1".into(),
        });
    }

    #[test]
    fn test_event_serialization() {
        let event = RestoreEvent::Progress(ProgressPayload {
            session_id: "s1".into(),
            stage: SessionState::Restoring,
            percentage: 50,
            files_processed: 5,
            total_files: 10,
            bytes_processed: 1024,
            total_bytes: 2048,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("restore:progress"));
        assert!(json.contains("RESTORING"));
    }
}
