//! Restore engine - drives one session per request through the pipeline.
//!
//! ```text
//! INITIALIZING → VERIFYING → [PRE_BACKUP] → EXTRACTING → ANALYZING →
//! RESOLVING_CONFLICTS → RESTORING → [VERIFYING_RESULT] → COMPLETED
//! ```
//!
//! Any unrecoverable error moves the session to `FAILED`. Either way the
//! session is written to history, dropped from the registry, and its
//! working directory is removed.

pub mod registry;


pub use registry::SessionRegistry;

use crate::catalog::{BackupCatalog, BackupRecord};
use crate::config::Config;
use crate::executor::RestoreExecutor;
use crate::extract::{remove_working_tree, ExtractionPipeline};
use crate::history::{HistoryEntry, HistoryStore, RestoreStatistics};
use crate::resolve::{analyze, resolve, PathFilter};
use crate::session::{
    ConflictRecord, RestoreEvent, RestoreOptions, RestoreRequest, RestoreSession, SessionEvents,
    SessionState,
};
use crate::snapshot::SnapshotProvider;
use crate::transfer::format_duration;
use crate::utils::errors::{RestoreError, Result};
use crate::verify::{verify_restored, IntegrityVerifier};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

/// A spawned restore session
#[derive(Debug)]
pub struct RestoreHandle {
    pub session_id: String,
    /// Subscribed before the session task starts, so nothing is missed
    pub events: broadcast::Receiver<RestoreEvent>,
    pub join: JoinHandle<Result<RestoreSession>>,
}

impl RestoreHandle {
    /// Wait for the session to reach a terminal state
    pub async fn wait(self) -> Result<RestoreSession> {
        self.join.await.map_err(task_failed)?
    }
}

#[derive(Clone)]
pub struct RestoreEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: Config,
    catalog: BackupCatalog,
    verifier: IntegrityVerifier,
    pipeline: ExtractionPipeline,
    executor: RestoreExecutor,
    history: HistoryStore,
    registry: SessionRegistry,
    snapshot: Option<Arc<dyn SnapshotProvider>>,
    tasks: TaskTracker,
}

impl RestoreEngine {
    /// Validate `config`, load history, and build the pipeline components.
    pub async fn new(config: Config, snapshot: Option<Arc<dyn SnapshotProvider>>) -> Result<Self> {
        config.validate()?;
        let key = config.decryption_key()?;
        let history = HistoryStore::load(config.history.path.clone()).await?;

        info!(
            metadata_dir = %config.catalog.metadata_dir.display(),
            restore_root = %config.restore.restore_root.display(),
            "Restore engine ready"
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                catalog: BackupCatalog::from_config(&config),
                verifier: IntegrityVerifier::new(key),
                pipeline: ExtractionPipeline::new(
                    config.restore.temp_dir.clone(),
                    config.restore.chunk_size,
                    key,
                ),
                executor: RestoreExecutor::from_config(&config.restore),
                history,
                registry: SessionRegistry::new(),
                snapshot,
                tasks: TaskTracker::new(),
                config,
            }),
        })
    }

    /// Validate `request`, register a new session and spawn it.
    pub async fn start_restore(&self, request: RestoreRequest) -> Result<RestoreHandle> {
        if self.inner.tasks.is_closed() {
            return Err(RestoreError::ShuttingDown);
        }
        if request.backup_id.trim().is_empty() {
            return Err(RestoreError::Configuration("backup_id must not be empty".to_string()));
        }

        let restore = &self.inner.config.restore;
        let mut options =
            RestoreOptions::from_request(&request, &restore.restore_root, restore.default_strategy);
        options.verify_integrity |= restore.verify_before_restore;
        let filter = PathFilter::new(&options.include_patterns, &options.exclude_patterns)?;

        let session = RestoreSession::new(request.backup_id.clone(), options);
        let session_id = session.id.clone();
        let events = SessionEvents::new();
        let receiver = events.subscribe();
        self.inner.registry.update(&session).await;

        let engine = self.clone();
        let join = self
            .inner
            .tasks
            .spawn(async move { engine.run_session(session, filter, events).await });

        Ok(RestoreHandle {
            session_id,
            events: receiver,
            join,
        })
    }

    /// Start a restore and wait for it. `Err` carries the terminal failure
    /// of a `FAILED` session.
    pub async fn restore(&self, request: RestoreRequest) -> Result<RestoreSession> {
        self.start_restore(request).await?.wait().await
    }

    pub async fn active_sessions(&self) -> Vec<RestoreSession> {
        self.inner.registry.snapshot().await
    }

    pub async fn session(&self, session_id: &str) -> Option<RestoreSession> {
        self.inner.registry.get(session_id).await
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.inner.history.entries().await
    }

    pub async fn recent_history(&self, limit: usize) -> Vec<HistoryEntry> {
        self.inner.history.recent(limit).await
    }

    pub async fn history_for_backup(&self, backup_id: &str) -> Vec<HistoryEntry> {
        self.inner.history.find_by_backup(backup_id).await
    }

    pub async fn statistics(&self) -> RestoreStatistics {
        self.inner.history.statistics().await
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupRecord>> {
        self.inner.catalog.list_available_backups().await
    }

    pub async fn backup(&self, backup_id: &str) -> Result<BackupRecord> {
        self.inner.catalog.get_backup_by_id(backup_id).await
    }

    /// Stop admitting sessions, wait up to `grace` for running ones, then
    /// save history.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        let tasks = &self.inner.tasks;
        tasks.close();
        info!("Shutting down with {} restore(s) in flight", tasks.len());

        if tokio::time::timeout(grace, tasks.wait()).await.is_err() {
            warn!(
                "Grace period of {}s elapsed with {} restore(s) still running",
                grace.as_secs(),
                tasks.len()
            );
        }

        self.inner.history.save().await?;
        info!("Restore engine stopped");
        Ok(())
    }

    async fn run_session(
        self,
        mut session: RestoreSession,
        filter: PathFilter,
        events: SessionEvents,
    ) -> Result<RestoreSession> {
        info!(session_id = %session.id, backup_id = %session.backup_id, "Restore session started");
        events.emit(RestoreEvent::Started {
            session_id: session.id.clone(),
            backup_id: session.backup_id.clone(),
        });

        let outcome = self.drive(&mut session, &filter, &events).await;
        remove_working_tree(&self.inner.pipeline.work_dir(&session.id)).await;

        let outcome = match outcome {
            Ok(()) => {
                session.transition(SessionState::Completed);
                info!(
                    session_id = %session.id,
                    restored = session.restored_files.len(),
                    skipped = session.skipped_files.len(),
                    errors = session.errors.len(),
                    "Restore completed in {}",
                    format_duration(session.duration_ms())
                );
                Ok(())
            }
            Err(e) => {
                session.fail(e.to_string());
                error!(session_id = %session.id, state = ?session.state, "Restore failed: {}", e);
                Err(e)
            }
        };

        self.inner.registry.complete(&session.id).await;
        if let Err(e) = self.inner.history.record(&session).await {
            error!(session_id = %session.id, "Failed to record restore history: {}", e);
        }

        match outcome {
            Ok(()) => {
                events.emit(RestoreEvent::Completed {
                    session: Box::new(session.clone()),
                });
                Ok(session)
            }
            Err(e) => {
                events.emit(RestoreEvent::Failed {
                    session_id: session.id.clone(),
                    kind: e.kind().to_string(),
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn drive(
        &self,
        session: &mut RestoreSession,
        filter: &PathFilter,
        events: &SessionEvents,
    ) -> Result<()> {
        self.advance(session, SessionState::Verifying, events).await;
        let backup = self.inner.catalog.get_backup_by_id(&session.backup_id).await?;
        if session.options.verify_integrity {
            self.inner.verifier.verify(&backup).await?;
        }

        if session.options.create_backup {
            self.advance(session, SessionState::PreBackup, events).await;
            self.pre_restore_snapshot(session).await;
        }

        self.advance(session, SessionState::Extracting, events).await;
        let tree = self.inner.pipeline.extract(&backup, &session.id).await?;

        self.advance(session, SessionState::Analyzing, events).await;
        let tree_root = tree.root.clone();
        let target = session.options.target_path.clone();
        let filter = filter.clone();
        let mut candidates =
            tokio::task::spawn_blocking(move || analyze(&tree_root, &target, &filter))
                .await
                .map_err(task_failed)??;

        self.advance(session, SessionState::ResolvingConflicts, events).await;
        let strategy = session.options.strategy;
        let candidates = tokio::task::spawn_blocking(move || {
            resolve(&mut candidates, strategy);
            candidates
        })
        .await
        .map_err(task_failed)?;
        session.conflicts = candidates.iter().filter_map(ConflictRecord::from_candidate).collect();
        info!(
            session_id = %session.id,
            candidates = candidates.len(),
            conflicts = session.conflicts.len(),
            strategy = ?strategy,
            "Conflicts resolved"
        );

        self.advance(session, SessionState::Restoring, events).await;
        self.inner.executor.execute(session, &candidates, events).await;

        if session.options.verify_integrity {
            self.advance(session, SessionState::VerifyingResult, events).await;
            let failures = verify_restored(&session.restored_files).await;
            session.errors.extend(failures);
        }

        Ok(())
    }

    async fn advance(
        &self,
        session: &mut RestoreSession,
        next: SessionState,
        events: &SessionEvents,
    ) {
        if !session.transition(next) {
            warn!(
                session_id = %session.id,
                from = ?session.state,
                to = ?next,
                "Ignored invalid transition"
            );
            return;
        }
        info!(session_id = %session.id, state = ?next, "Restore stage");
        self.inner.registry.update(session).await;
        events.progress(session);
    }

    /// Best-effort: a failed snapshot is logged and the restore goes on.
    async fn pre_restore_snapshot(&self, session: &RestoreSession) {
        let Some(provider) = self.inner.snapshot.as_ref() else {
            warn!(
                session_id = %session.id,
                "Pre-restore backup requested but no snapshot provider is configured"
            );
            return;
        };

        match provider.create_incremental_backup().await {
            Ok(backup_id) => {
                info!(session_id = %session.id, %backup_id, "Pre-restore backup created")
            }
            Err(e) => {
                warn!(session_id = %session.id, "Pre-restore backup failed, continuing: {:#}", e)
            }
        }
    }
}

fn task_failed(e: JoinError) -> RestoreError {
    RestoreError::Io(std::io::Error::other(format!("restore task failed: {}", e)))
}
