use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::job::record::JobRecord;

/// Outcome of a failed execution attempt, chosen by the handler.
#[derive(Debug)]
pub enum JobFailure {
    /// Retryable; the manager re-queues with backoff until attempts run out.
    Transient(String),
    /// Non-retryable; the manager finalizes the job immediately.
    Permanent(String),
}

impl std::fmt::Display for JobFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobFailure::Transient(reason) => write!(f, "transient: {}", reason),
            JobFailure::Permanent(reason) => write!(f, "permanent: {}", reason),
        }
    }
}

/// Lifecycle hooks for a job kind.
///
/// `run` executes in a worker task outside the manager's coordinator, so it
/// may block on I/O without stalling scheduling. The remaining hooks are
/// notifications; they run after the manager has already recorded the
/// outcome, and their errors cannot affect job state.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute one attempt. The record carries the attempt number in
    /// `run_count` and the job's opaque payload.
    async fn run(&self, job: &JobRecord) -> Result<(), JobFailure>;

    /// Called after the record has been removed from the store.
    async fn on_success(&self, _job: &JobRecord) {}

    /// Called when an attempt failed but a retry has been scheduled.
    async fn on_retry(&self, _job: &JobRecord, _failure: &JobFailure) {}

    /// Called exactly once when the job is finalized as failed, either
    /// because the handler returned a permanent failure or because retries
    /// were exhausted.
    async fn on_permanent_failure(&self, _job: &JobRecord, _failure: &JobFailure) {}
}

/// Maps job kinds to their handlers. Populated once before the manager
/// starts; the set of kinds is fixed for the manager's lifetime.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(kind.into(), handler);
    }

    pub fn get(&self, kind: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(kind).cloned()
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }
}
