mod availability;
mod conflict;
mod error;
mod lifecycle;
mod mutations;
mod queries;
mod store;

pub use availability::{Slots, generate_slots, mark_slots, merge_overlapping, resolve_window};
pub use conflict::is_slot_available;
pub use error::EngineError;
pub use store::InMemoryStore;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{OwnedRwLockWriteGuard, RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::audit::{AuditAction, AuditEntry, AuditLog, TracingAuditLog};
use crate::auth::Actor;
use crate::directory::{InMemoryDirectory, UserDirectory};
use crate::model::*;
use crate::notify::{self, NotificationKind, Notifier, NotifyHub};
use crate::wal::Wal;

pub type SharedSchedule = Arc<RwLock<TailorSchedule>>;

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];
                let mut pending = None;

                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            pending = Some(other);
                            break;
                        }
                        Err(_) => break,
                    }
                }

                commit_batch(&mut wal, &mut batch);
                if let Some(other) = pending {
                    handle_non_append(&mut wal, other);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
    tracing::debug!("WAL writer stopped");
}

fn commit_batch(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    if let Err(e) = &result {
        tracing::error!(batch = batch.len(), "WAL flush failed: {e}");
    }
    respond_batch(batch, &result);
}

fn flush_batch(wal: &mut Wal, batch: &[(Event, oneshot::Sender<io::Result<()>>)]) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even on append error so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { event, response } => {
            let mut batch = vec![(event, response)];
            commit_batch(wal, &mut batch);
        }
    }
}

/// Write an event through the background group-commit writer.
async fn wal_append(wal_tx: &mpsc::Sender<WalCommand>, event: &Event) -> Result<(), EngineError> {
    let (tx, rx) = oneshot::channel();
    wal_tx
        .send(WalCommand::Append {
            event: event.clone(),
            response: tx,
        })
        .await
        .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
    rx.await
        .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
        .map_err(|e| EngineError::WalError(e.to_string()))
}

/// External services the engine reports to after a commit.
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    pub directory: Arc<dyn UserDirectory>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            notifier: Arc::new(NotifyHub::new()),
            audit: Arc::new(TracingAuditLog),
            directory: Arc::new(InMemoryDirectory::new()),
        }
    }
}

/// What a committed transition should tell the outside world.
pub(super) struct SideEffects {
    pub action: AuditAction,
    pub resource_type: &'static str,
    pub resource_id: String,
    pub details: serde_json::Value,
    pub notify: Option<(Ulid, NotificationKind)>,
}

pub struct Engine {
    pub(super) store: Arc<InMemoryStore>,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    /// Mutations hold it shared; compaction takes it exclusively so the
    /// snapshot it writes cannot miss an in-flight commit.
    pub(super) commit_gate: RwLock<()>,
    pub notifier: Arc<dyn Notifier>,
    pub audit: Arc<dyn AuditLog>,
    pub directory: Arc<dyn UserDirectory>,
}

impl Engine {
    pub fn new(wal_path: PathBuf, collaborators: Collaborators) -> io::Result<Self> {
        let replay = Wal::replay(&wal_path)?;
        if replay.truncated {
            tracing::warn!(
                path = %wal_path.display(),
                kept = replay.events.len(),
                "discarding torn WAL tail"
            );
            Wal::rewrite(&wal_path, &replay.events)?;
        }
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let store = InMemoryStore::from_events(&replay.events);
        tracing::info!(
            path = %wal_path.display(),
            events = replay.events.len(),
            "state restored from WAL"
        );

        Ok(Self {
            store: Arc::new(store),
            wal_tx,
            commit_gate: RwLock::new(()),
            notifier: collaborators.notifier,
            audit: collaborators.audit,
            directory: collaborators.directory,
        })
    }

    pub fn get_schedule(&self, tailor_id: &Ulid) -> Option<SharedSchedule> {
        self.store.get_schedule(tailor_id)
    }

    /// WAL-append then apply, on a task that owns the tailor's lock.
    ///
    /// A caller dropped mid-commit (timeout, disconnect) cannot leave the log and
    /// the in-memory schedule disagreeing: the task runs to completion either way.
    pub(super) async fn persist_and_apply(
        &self,
        mut guard: OwnedRwLockWriteGuard<TailorSchedule>,
        event: Event,
    ) -> Result<OwnedRwLockWriteGuard<TailorSchedule>, EngineError> {
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        tokio::spawn(async move {
            wal_append(&wal_tx, &event).await?;
            store.apply_to_schedule(&mut guard, &event);
            Ok(guard)
        })
        .await
        .map_err(|e| EngineError::WalError(format!("commit task failed: {e}")))?
    }

    /// Same as `persist_and_apply` for availability records.
    pub(super) async fn persist_availability(&self, event: Event) -> Result<(), EngineError> {
        let wal_tx = self.wal_tx.clone();
        let store = self.store.clone();
        let write = self.store.availability_write.clone().lock_owned().await;
        tokio::spawn(async move {
            let _write = write;
            wal_append(&wal_tx, &event).await?;
            store.apply_availability(&event);
            Ok(())
        })
        .await
        .map_err(|e| EngineError::WalError(format!("commit task failed: {e}")))?
    }

    /// Lookup appointment → tailor, acquire that tailor's write lock.
    pub(super) async fn resolve_appointment_write(
        &self,
        id: &Ulid,
    ) -> Result<OwnedRwLockWriteGuard<TailorSchedule>, EngineError> {
        let tailor_id = self.store.tailor_for(id).ok_or(EngineError::NotFound(*id))?;
        let schedule = self
            .store
            .get_schedule(&tailor_id)
            .ok_or(EngineError::NotFound(*id))?;
        let guard = schedule.write_owned().await;
        // Deleted while we waited for the lock.
        if guard.get(*id).is_none() {
            return Err(EngineError::NotFound(*id));
        }
        Ok(guard)
    }

    /// Audit + notify after a commit. Neither can fail the transition.
    pub(super) fn after_commit(&self, actor: &Actor, effects: SideEffects) {
        let entry = AuditEntry::new(
            effects.action,
            actor,
            effects.resource_type,
            effects.resource_id,
            effects.details.clone(),
            conflict::now(),
        );
        if let Err(e) = self.audit.record(&entry) {
            metrics::counter!(crate::observability::AUDIT_FAILED_TOTAL).increment(1);
            tracing::warn!(action = effects.action.as_str(), "audit record failed: {e}");
        }
        if let Some((user_id, kind)) = effects.notify {
            notify::dispatch(self.notifier.clone(), user_id, kind, effects.details);
        }
    }
}
