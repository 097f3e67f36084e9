//! Background execution of migration runs
//!
//! Every run gets an id and an observable status. A run that panics or
//! is cancelled still reaches a terminal `Fatal` status, so no run is lost
//! silently.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::metrics::MigrationMetrics;
use crate::services::migrator::{DependentRecordMigrator, MigrationJob, MigrationOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MigrationId(Uuid);

impl MigrationId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for MigrationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationStatus {
    Pending,
    Running,
    Finished(MigrationOutcome),
}

impl MigrationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationStatus::Finished(_))
    }

    pub fn outcome(&self) -> Option<&MigrationOutcome> {
        match self {
            MigrationStatus::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }
}

struct RunEntry {
    status: watch::Receiver<MigrationStatus>,
    watcher: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct Registry {
    runs: HashMap<MigrationId, RunEntry>,
    /// Terminal runs, oldest first
    finished: VecDeque<MigrationId>,
}

impl Registry {
    fn mark_finished(&mut self, id: MigrationId, history: usize) {
        self.finished.push_back(id);
        while self.finished.len() > history {
            if let Some(oldest) = self.finished.pop_front() {
                self.runs.remove(&oldest);
            }
        }
    }
}

/// Launches migration runs on the tokio runtime and tracks their status
pub struct MigrationSupervisor {
    migrator: Arc<DependentRecordMigrator>,
    registry: Arc<Mutex<Registry>>,
    status_history: usize,
    metrics: MigrationMetrics,
}

impl MigrationSupervisor {
    pub fn new(migrator: Arc<DependentRecordMigrator>, status_history: usize) -> Self {
        Self {
            migrator,
            registry: Arc::new(Mutex::new(Registry::default())),
            status_history: status_history.max(1),
            metrics: MigrationMetrics::new(),
        }
    }

    /// Start a run in the background and return immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn launch(&self, job: MigrationJob) -> MigrationId {
        let id = MigrationId::new();
        let (tx, rx) = watch::channel(MigrationStatus::Pending);
        let tx = Arc::new(tx);

        // Register before spawning so a fast run never finishes unregistered
        self.registry.lock().runs.insert(
            id,
            RunEntry {
                status: rx,
                watcher: None,
            },
        );

        let migrator = Arc::clone(&self.migrator);
        let run_tx = Arc::clone(&tx);
        self.metrics.run_started();
        let run = tokio::spawn(async move {
            run_tx.send_replace(MigrationStatus::Running);
            let outcome = migrator.run(&job).await;
            (job, outcome)
        });

        let registry = Arc::clone(&self.registry);
        let history = self.status_history;
        let metrics = self.metrics.clone();
        let watcher = tokio::spawn(async move {
            let outcome = match run.await {
                Ok((job, outcome)) => {
                    log_outcome(id, &job, &outcome);
                    outcome
                }
                Err(e) => {
                    let reason = if e.is_panic() {
                        format!("migration task panicked: {}", panic_message(e.into_panic()))
                    } else {
                        "migration task was cancelled".to_string()
                    };
                    error!(migration_id = %id, reason = %reason, "Migration run died");
                    MigrationOutcome::Fatal(reason)
                }
            };

            metrics.run_finished();
            metrics.record_outcome(&outcome);
            tx.send_replace(MigrationStatus::Finished(outcome));
            registry.lock().mark_finished(id, history);
        });

        if let Some(entry) = self.registry.lock().runs.get_mut(&id) {
            entry.watcher = Some(watcher);
        }

        id
    }

    /// Current status, or `None` for an unknown or pruned id
    pub fn status(&self, id: MigrationId) -> Option<MigrationStatus> {
        self.registry
            .lock()
            .runs
            .get(&id)
            .map(|entry| entry.status.borrow().clone())
    }

    /// Wait for a run to reach its terminal status
    pub async fn wait(&self, id: MigrationId) -> Option<MigrationOutcome> {
        let mut rx = self.registry.lock().runs.get(&id)?.status.clone();
        let terminal = rx
            .wait_for(MigrationStatus::is_terminal)
            .await
            .map(|status| status.clone());
        let status = match terminal {
            Ok(status) => status,
            // Sender dropped without a terminal status; the last value is all we have
            Err(_) => rx.borrow().clone(),
        };
        status.outcome().cloned()
    }

    /// Runs that have not reached a terminal status yet
    pub fn in_flight(&self) -> usize {
        self.registry
            .lock()
            .runs
            .values()
            .filter(|entry| !entry.status.borrow().is_terminal())
            .count()
    }

    /// Wait until every run launched so far has finished
    pub async fn drain(&self) {
        let watchers: Vec<JoinHandle<()>> = self
            .registry
            .lock()
            .runs
            .values_mut()
            .filter_map(|entry| entry.watcher.take())
            .collect();

        for watcher in watchers {
            if let Err(e) = watcher.await {
                warn!(error = %e, "Migration watcher task failed");
            }
        }
    }
}

fn log_outcome(id: MigrationId, job: &MigrationJob, outcome: &MigrationOutcome) {
    match outcome {
        MigrationOutcome::Completed {
            migrated,
            unchanged,
        } => info!(
            migration_id = %id,
            owner_id = %job.owner_id,
            migrated,
            unchanged,
            "Migration completed"
        ),
        MigrationOutcome::PartialFailure {
            failed,
            migrated,
            unchanged,
            samples,
        } => warn!(
            migration_id = %id,
            owner_id = %job.owner_id,
            failed,
            migrated,
            unchanged,
            samples = ?samples,
            "Migration finished with failures"
        ),
        MigrationOutcome::Fatal(reason) => error!(
            migration_id = %id,
            owner_id = %job.owner_id,
            reason = %reason,
            "Migration aborted"
        ),
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
