//! The job manager: accepts jobs, persists them, gates dispatch on
//! requirements, and drives a bounded worker pool.
//!
//! All scheduling state (the Blocked/Ready/Running sets and the store) is
//! owned by a single coordinator task; `add`, provider notifications, and
//! worker completions reach it as messages, so none of them race on shared
//! state. Job execution itself happens in spawned worker tasks outside the
//! coordinator, bounded by a semaphore of `concurrency` permits.
//!
//! # Lifecycle
//!
//! 1. [`JobManager::initialize`] loads every persisted record, re-evaluates
//!    its requirements, and spawns the coordinator. Jobs interrupted
//!    mid-run by a previous process come back as plain records and are
//!    retry-eligible (at-least-once semantics).
//! 2. [`JobManager::add`] persists the job before returning, then queues it
//!    as Blocked or Ready.
//! 3. [`JobManager::shutdown`] stops dispatch, drains in-flight workers up
//!    to the configured grace period, then abandons stragglers in place;
//!    their records survive for the next startup.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::ManagerConfig;
use crate::error::{JobError, Result};
use crate::job::handler::{HandlerRegistry, JobFailure};
use crate::job::record::{JobRecord, RetryPolicy};
use crate::requirements::RequirementRegistry;
use crate::scheduler::queue::JobQueue;
use crate::store::FileJobStore;

enum Command {
    Add {
        record: JobRecord,
        respond: oneshot::Sender<Result<Uuid>>,
    },
    JobFinished {
        id: Uuid,
        outcome: WorkerOutcome,
    },
    PendingCount {
        respond: oneshot::Sender<usize>,
    },
}

enum WorkerOutcome {
    Succeeded,
    Failed(JobFailure),
}

/// Cloneable handle to a running job manager.
#[derive(Clone)]
pub struct JobManager {
    cmd_tx: mpsc::UnboundedSender<Command>,
    change_tx: mpsc::UnboundedSender<String>,
    shutdown: CancellationToken,
    coordinator: Arc<Mutex<Option<JoinHandle<()>>>>,
    grace: Duration,
}

impl JobManager {
    /// Start the manager: recover persisted jobs, wire provider
    /// notifications, and spawn the coordinator.
    ///
    /// # Errors
    ///
    /// Fails only if the store directory cannot be listed. Individual
    /// corrupt records are skipped with a warning, never fatal.
    pub async fn initialize(
        config: ManagerConfig,
        store: FileJobStore,
        handlers: HandlerRegistry,
        requirements: RequirementRegistry,
    ) -> Result<Self> {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (change_tx, change_rx) = mpsc::unbounded_channel();

        requirements.subscribe_all(&change_tx);

        let mut queue = JobQueue::new();
        for record in store.load_all().await? {
            let ready = requirements.all_satisfied(&record.requirement_tags);
            tracing::info!(job_id = %record.id, kind = %record.kind, ready, "Recovered persisted job");
            queue.insert(record, ready);
        }

        let shutdown = CancellationToken::new();
        let grace = Duration::from_millis(config.shutdown_grace_ms);
        let workers = Arc::new(Semaphore::new(config.concurrency.max(1)));

        let coordinator = Coordinator {
            config,
            store,
            handlers,
            requirements,
            queue,
            workers,
            cmd_tx: cmd_tx.clone(),
            shutdown: shutdown.clone(),
        };
        let handle = tokio::spawn(coordinator.run(cmd_rx, change_rx));

        Ok(Self {
            cmd_tx,
            change_tx,
            shutdown,
            coordinator: Arc::new(Mutex::new(Some(handle))),
            grace,
        })
    }

    /// Enqueue a job. The record is encrypted and durably written before
    /// this returns; a job that was accepted survives a process restart.
    ///
    /// # Errors
    ///
    /// [`JobError::StoreUnavailable`] if persistence fails (the job is not
    /// enqueued), or [`JobError::ShuttingDown`] after shutdown has begun.
    pub async fn add(
        &self,
        kind: impl Into<String>,
        payload: Vec<u8>,
        requirement_tags: Vec<String>,
        retry_policy: RetryPolicy,
    ) -> Result<Uuid> {
        if self.shutdown.is_cancelled() {
            return Err(JobError::ShuttingDown);
        }
        let record = JobRecord::new(kind, payload, requirement_tags, retry_policy);
        let (respond, ack) = oneshot::channel();
        self.cmd_tx
            .send(Command::Add { record, respond })
            .map_err(|_| JobError::ShuttingDown)?;
        ack.await.map_err(|_| JobError::ShuttingDown)?
    }

    /// Re-evaluate blocked jobs that reference `provider_id`. Idempotent and
    /// safe to call from any thread at any time, including concurrently with
    /// `add` and dispatch.
    pub fn on_requirement_changed(&self, provider_id: &str) {
        let _ = self.change_tx.send(provider_id.to_string());
    }

    /// Number of jobs currently Blocked, Ready, or Running. Diagnostics.
    pub async fn pending_count(&self) -> usize {
        let (respond, count) = oneshot::channel();
        if self
            .cmd_tx
            .send(Command::PendingCount { respond })
            .is_err()
        {
            return 0;
        }
        count.await.unwrap_or(0)
    }

    /// Stop dispatching and drain in-flight jobs, bounded by the configured
    /// grace period. Safe to call more than once.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        let handle = self.coordinator.lock().await.take();
        let Some(mut handle) = handle else { return };
        if tokio::time::timeout(self.grace, &mut handle).await.is_err() {
            tracing::warn!("Shutdown grace period elapsed, abandoning in-flight jobs");
            handle.abort();
        }
    }
}

/// Single-task owner of all scheduling state. Runs until cancelled, then
/// drains in-flight workers.
struct Coordinator {
    config: ManagerConfig,
    store: FileJobStore,
    handlers: HandlerRegistry,
    requirements: RequirementRegistry,
    queue: JobQueue,
    workers: Arc<Semaphore>,
    cmd_tx: mpsc::UnboundedSender<Command>,
    shutdown: CancellationToken,
}

impl Coordinator {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Command>,
        mut change_rx: mpsc::UnboundedReceiver<String>,
    ) {
        let mut sweep =
            tokio::time::interval(Duration::from_millis(self.config.sweep_interval_ms.max(1)));
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let shutdown = self.shutdown.clone();

        // Anything reconciliation marked Ready can go out immediately.
        self.dispatch_ready().await;

        loop {
            tokio::select! {
                Some(cmd) = cmd_rx.recv() => {
                    self.handle_command(cmd).await;
                }
                Some(provider_id) = change_rx.recv() => {
                    self.promote_for_provider(&provider_id);
                    self.dispatch_ready().await;
                }
                _ = sweep.tick() => {
                    self.sweep_blocked();
                    self.dispatch_ready().await;
                }
                _ = shutdown.cancelled() => break,
            }
        }

        self.drain(&mut cmd_rx).await;
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Add { record, respond } => {
                let result = self.admit(record).await;
                let _ = respond.send(result);
                self.dispatch_ready().await;
            }
            Command::JobFinished { id, outcome } => {
                self.finish(id, outcome).await;
                self.dispatch_ready().await;
            }
            Command::PendingCount { respond } => {
                let _ = respond.send(self.queue.len());
            }
        }
    }

    /// Persist then queue a new job. Persistence failure means the job was
    /// never enqueued; the error goes straight back to the caller.
    async fn admit(&mut self, record: JobRecord) -> Result<Uuid> {
        self.store.persist(&record).await?;
        let id = record.id;
        let ready = self.requirements.all_satisfied(&record.requirement_tags);
        tracing::info!(job_id = %id, kind = %record.kind, ready, "Job added");
        self.queue.insert(record, ready);
        Ok(id)
    }

    /// Promote blocked jobs referencing a provider whose state changed.
    /// The full requirement set is still re-checked (AND semantics), and a
    /// pending retry backoff is never bypassed.
    fn promote_for_provider(&mut self, provider_id: &str) {
        let requirements = &self.requirements;
        let promoted = self.queue.promote_where(Instant::now(), |record| {
            record
                .requirement_tags
                .iter()
                .any(|tag| tag.as_str() == provider_id)
                && requirements.all_satisfied(&record.requirement_tags)
        });
        if promoted > 0 {
            tracing::debug!(provider_id, promoted, "Requirement change promoted jobs");
        }
    }

    /// Periodic backstop: promotes jobs whose backoff expired and catches
    /// provider notifications that never arrived.
    fn sweep_blocked(&mut self) {
        let requirements = &self.requirements;
        let promoted = self.queue.promote_where(Instant::now(), |record| {
            requirements.all_satisfied(&record.requirement_tags)
        });
        if promoted > 0 {
            tracing::debug!(promoted, "Sweep promoted blocked jobs");
        }
    }

    /// Hand Ready jobs to workers while pool permits are free, FIFO.
    async fn dispatch_ready(&mut self) {
        if self.shutdown.is_cancelled() {
            return;
        }
        loop {
            if self.queue.ready_count() == 0 {
                break;
            }
            let permit = match self.workers.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let Some(record) = self.queue.pop_ready() else {
                break;
            };
            // Promotion may be stale by the time a permit frees up, so the
            // requirement set is re-checked at the moment of dispatch.
            if !self.requirements.all_satisfied(&record.requirement_tags) {
                tracing::debug!(
                    job_id = %record.id,
                    kind = %record.kind,
                    "Requirement no longer holds at dispatch, demoting job"
                );
                self.queue.demote(&record.id);
                continue;
            }
            let Some(handler) = self.handlers.get(&record.kind) else {
                // No registered handler can ever run this record; parking it
                // forever would leak a store entry with no path out.
                let id = record.id;
                let error = JobError::UnknownHandler(record.kind.clone());
                tracing::error!(job_id = %id, %error, "Finalizing job as failed");
                self.queue.remove(&id);
                if let Err(e) = self.store.remove(&id).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to remove job record");
                }
                continue;
            };

            let cmd_tx = self.cmd_tx.clone();
            tokio::spawn(async move {
                tracing::debug!(
                    job_id = %record.id,
                    kind = %record.kind,
                    attempt = record.run_count,
                    "Job dispatched"
                );
                let outcome = match handler.run(&record).await {
                    Ok(()) => WorkerOutcome::Succeeded,
                    Err(failure) => WorkerOutcome::Failed(failure),
                };
                let _ = cmd_tx.send(Command::JobFinished {
                    id: record.id,
                    outcome,
                });
                drop(permit);
            });
        }
    }

    /// Route a worker outcome: finalize, or schedule a retry with backoff.
    async fn finish(&mut self, id: Uuid, outcome: WorkerOutcome) {
        match outcome {
            WorkerOutcome::Succeeded => {
                let Some(record) = self.queue.remove(&id) else {
                    return;
                };
                if let Err(e) = self.store.remove(&id).await {
                    tracing::error!(job_id = %id, error = %e, "Failed to remove record for succeeded job");
                }
                tracing::info!(job_id = %id, kind = %record.kind, "Job succeeded");
                if let Some(handler) = self.handlers.get(&record.kind) {
                    tokio::spawn(async move { handler.on_success(&record).await });
                }
            }
            WorkerOutcome::Failed(failure) => {
                let Some(record) = self.queue.get(&id).cloned() else {
                    return;
                };
                let retryable = matches!(failure, JobFailure::Transient(_))
                    && !record.attempts_exhausted();

                if retryable {
                    let delay = record.retry_policy.backoff_delay(record.run_count);
                    if let Err(e) = self.store.persist(&record).await {
                        // The on-disk record keeps its previous run count;
                        // the in-memory retry still proceeds.
                        tracing::error!(job_id = %id, error = %e, "Failed to persist updated run count");
                    }
                    self.queue.park(&id, Instant::now() + delay);
                    tracing::warn!(
                        job_id = %id,
                        kind = %record.kind,
                        attempt = record.run_count,
                        delay_ms = delay.as_millis() as u64,
                        %failure,
                        "Job failed, retry scheduled"
                    );
                    if let Some(handler) = self.handlers.get(&record.kind) {
                        tokio::spawn(async move { handler.on_retry(&record, &failure).await });
                    }
                } else {
                    self.queue.remove(&id);
                    if let Err(e) = self.store.remove(&id).await {
                        tracing::error!(job_id = %id, error = %e, "Failed to remove record for failed job");
                    }
                    tracing::error!(
                        job_id = %id,
                        kind = %record.kind,
                        attempts = record.run_count,
                        %failure,
                        "Job permanently failed"
                    );
                    if let Some(handler) = self.handlers.get(&record.kind) {
                        tokio::spawn(
                            async move { handler.on_permanent_failure(&record, &failure).await },
                        );
                    }
                }
            }
        }
    }

    /// Post-cancellation drain: keep processing worker completions until no
    /// job is Running. The grace bound is enforced by `shutdown`, which
    /// aborts this task if the drain takes too long.
    async fn drain(&mut self, cmd_rx: &mut mpsc::UnboundedReceiver<Command>) {
        let running = self.queue.running_count();
        if running > 0 {
            tracing::info!(running, "Draining in-flight jobs");
        }
        while self.queue.running_count() > 0 {
            match cmd_rx.recv().await {
                Some(Command::JobFinished { id, outcome }) => self.finish(id, outcome).await,
                Some(Command::Add { respond, .. }) => {
                    let _ = respond.send(Err(JobError::ShuttingDown));
                }
                Some(Command::PendingCount { respond }) => {
                    let _ = respond.send(self.queue.len());
                }
                None => break,
            }
        }
    }
}
