//! Registry of in-flight restore sessions.

use crate::session::RestoreSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Snapshots of running sessions, keyed by session id
#[derive(Clone)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, RestoreSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Insert or refresh the snapshot for a session
    pub async fn update(&self, session: &RestoreSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
    }

    /// Remove a session once it is terminal
    pub async fn complete(&self, session_id: &str) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id);
    }

    pub async fn get(&self, session_id: &str) -> Option<RestoreSession> {
        let sessions = self.sessions.read().await;
        sessions.get(session_id).cloned()
    }

    /// All running sessions, oldest first
    pub async fn snapshot(&self) -> Vec<RestoreSession> {
        let sessions = self.sessions.read().await;
        let mut all: Vec<_> = sessions.values().cloned().collect();
        all.sort_by_key(|s| s.started_at);
        all
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolve::ConflictStrategy;
    use crate::session::{RestoreOptions, RestoreRequest, SessionState};
    use std::path::Path;

    fn session() -> RestoreSession {
        let options = RestoreOptions::from_request(
            &RestoreRequest::new("b1"),
            Path::new("/restore"),
            ConflictStrategy::Prompt,
        );
        RestoreSession::new("b1", options)
    }

    #[tokio::test]
    async fn test_update_and_complete() {
        let registry = SessionRegistry::new();
        let mut s = session();
        registry.update(&s).await;
        assert_eq!(registry.snapshot().await.len(), 1);

        s.transition(SessionState::Verifying);
        registry.update(&s).await;
        assert_eq!(registry.get(&s.id).await.unwrap().state, SessionState::Verifying);

        registry.complete(&s.id).await;
        assert!(registry.get(&s.id).await.is_none());
        assert!(registry.snapshot().await.is_empty());
    }
}
