use std::collections::{HashMap, VecDeque};

use tokio::time::Instant;
use uuid::Uuid;

use crate::job::record::{JobRecord, JobStatus};

struct QueueEntry {
    record: JobRecord,
    status: JobStatus,
    /// Earliest instant a blocked job may be promoted; set while a retry
    /// backoff is pending.
    not_before: Option<Instant>,
}

/// Blocked/Ready/Running bookkeeping for the manager's coordinator.
///
/// The ready queue is FIFO; a job enters it only through promotion and
/// leaves it only by being dispatched or removed. At most one entry exists
/// per job id, so a job can never be handed to two workers.
#[derive(Default)]
pub struct JobQueue {
    jobs: HashMap<Uuid, QueueEntry>,
    ready: VecDeque<Uuid>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a job in Ready or Blocked state. Replaces any stale entry with
    /// the same id.
    pub fn insert(&mut self, record: JobRecord, ready: bool) {
        let id = record.id;
        let status = if ready {
            JobStatus::Ready
        } else {
            JobStatus::Blocked
        };
        self.jobs.insert(
            id,
            QueueEntry {
                record,
                status,
                not_before: None,
            },
        );
        if ready {
            self.ready.push_back(id);
        }
    }

    /// Pop the oldest Ready job, mark it Running, and count the attempt.
    /// Returns a snapshot of the record for the worker.
    pub fn pop_ready(&mut self) -> Option<JobRecord> {
        let id = self.ready.pop_front()?;
        let entry = self.jobs.get_mut(&id)?;
        entry.status = JobStatus::Running;
        entry.record.run_count += 1;
        Some(entry.record.clone())
    }

    /// Park a Running job as Blocked until `not_before` (retry backoff).
    pub fn park(&mut self, id: &Uuid, not_before: Instant) -> bool {
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.status = JobStatus::Blocked;
            entry.not_before = Some(not_before);
            true
        } else {
            false
        }
    }

    /// Return a just-popped job to Blocked without counting the attempt.
    /// Used when a dispatch-time requirement check fails before the worker
    /// ever runs.
    pub fn demote(&mut self, id: &Uuid) -> bool {
        if let Some(entry) = self.jobs.get_mut(id) {
            entry.status = JobStatus::Blocked;
            entry.not_before = None;
            entry.record.run_count = entry.record.run_count.saturating_sub(1);
            true
        } else {
            false
        }
    }

    /// Remove a job in any state. Returns the record if it was present.
    pub fn remove(&mut self, id: &Uuid) -> Option<JobRecord> {
        let entry = self.jobs.remove(id)?;
        if entry.status == JobStatus::Ready {
            self.ready.retain(|queued| queued != id);
        }
        Some(entry.record)
    }

    /// Promote blocked jobs whose backoff (if any) has expired and for which
    /// `eligible` holds. Promotions happen oldest-first so that jobs becoming
    /// Ready together keep FIFO order. Returns the number promoted.
    pub fn promote_where<F>(&mut self, now: Instant, eligible: F) -> usize
    where
        F: Fn(&JobRecord) -> bool,
    {
        let mut candidates: Vec<Uuid> = self
            .jobs
            .values()
            .filter(|entry| {
                entry.status == JobStatus::Blocked && entry.not_before.map_or(true, |t| t <= now)
            })
            .map(|entry| entry.record.id)
            .collect();
        candidates.sort_by_key(|id| self.jobs[id].record.created_at);

        let mut promoted = 0;
        for id in candidates {
            let Some(entry) = self.jobs.get_mut(&id) else {
                continue;
            };
            if eligible(&entry.record) {
                entry.status = JobStatus::Ready;
                entry.not_before = None;
                self.ready.push_back(id);
                promoted += 1;
            }
        }
        promoted
    }

    pub fn get(&self, id: &Uuid) -> Option<&JobRecord> {
        self.jobs.get(id).map(|entry| &entry.record)
    }

    pub fn status(&self, id: &Uuid) -> Option<JobStatus> {
        self.jobs.get(id).map(|entry| entry.status)
    }

    /// Number of jobs in any scheduling state.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    pub fn running_count(&self) -> usize {
        self.jobs
            .values()
            .filter(|entry| entry.status == JobStatus::Running)
            .count()
    }
}
