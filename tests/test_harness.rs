//! Shared fixtures for job manager integration tests.
//!
//! Provides toggleable requirement providers, a recording job handler with
//! injectable failures, and polling helpers.
#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use uuid::Uuid;

use jobkeep::config::ManagerConfig;
use jobkeep::crypto::AesGcmEncryption;
use jobkeep::job::handler::{JobFailure, JobHandler};
use jobkeep::job::record::JobRecord;
use jobkeep::requirements::{ChangeNotifier, ProviderFault, RequirementProvider};
use jobkeep::store::FileJobStore;

/// Manager configuration with short timings for fast tests.
pub fn test_config() -> ManagerConfig {
    ManagerConfig::new(2)
        .with_sweep_interval_ms(20)
        .with_shutdown_grace_ms(2_000)
}

pub fn test_key() -> [u8; 32] {
    [7u8; 32]
}

pub async fn open_test_store(dir: &Path) -> FileJobStore {
    FileJobStore::open(dir, Arc::new(AesGcmEncryption::new(&test_key())))
        .await
        .expect("open test store")
}

/// Requirement provider whose truth value is flipped by the test. Fires its
/// change notifier on every `set`, like a real connectivity callback would.
pub struct ToggleProvider {
    id: String,
    satisfied: AtomicBool,
    notifier: Mutex<Option<ChangeNotifier>>,
}

impl ToggleProvider {
    pub fn new(id: &str, initially_satisfied: bool) -> Arc<Self> {
        Arc::new(Self {
            id: id.to_string(),
            satisfied: AtomicBool::new(initially_satisfied),
            notifier: Mutex::new(None),
        })
    }

    pub fn set(&self, satisfied: bool) {
        self.satisfied.store(satisfied, Ordering::SeqCst);
        if let Some(notifier) = self.notifier.lock().unwrap().as_ref() {
            notifier.notify();
        }
    }
}

impl RequirementProvider for ToggleProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self) -> Result<bool, ProviderFault> {
        Ok(self.satisfied.load(Ordering::SeqCst))
    }

    fn subscribe(&self, notifier: ChangeNotifier) {
        *self.notifier.lock().unwrap() = Some(notifier);
    }
}

/// Provider that always fails to evaluate. The manager must treat this as
/// "requirement unsatisfied".
pub struct FaultyProvider {
    id: String,
}

impl FaultyProvider {
    pub fn new(id: &str) -> Arc<Self> {
        Arc::new(Self { id: id.to_string() })
    }
}

impl RequirementProvider for FaultyProvider {
    fn id(&self) -> &str {
        &self.id
    }

    fn evaluate(&self) -> Result<bool, ProviderFault> {
        Err(ProviderFault("sensor unavailable".to_string()))
    }
}

/// Handler that records every lifecycle event and can inject failures.
#[derive(Default)]
pub struct RecordingHandler {
    pub runs: AtomicUsize,
    pub successes: AtomicUsize,
    pub retries: AtomicUsize,
    pub permanent_failures: AtomicUsize,
    /// Number of leading attempts that fail transiently.
    pub transient_failures_to_inject: AtomicUsize,
    pub fail_permanently: AtomicBool,
    pub run_delay_ms: AtomicUsize,
    /// Job ids in the order their attempts started.
    pub run_order: Mutex<Vec<Uuid>>,
    in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing_transiently(times: usize) -> Arc<Self> {
        let handler = Self::default();
        handler
            .transient_failures_to_inject
            .store(times, Ordering::SeqCst);
        Arc::new(handler)
    }

    pub fn failing_permanently() -> Arc<Self> {
        let handler = Self::default();
        handler.fail_permanently.store(true, Ordering::SeqCst);
        Arc::new(handler)
    }

    pub fn set_run_delay(&self, delay: Duration) {
        self.run_delay_ms
            .store(delay.as_millis() as usize, Ordering::SeqCst);
    }
}

#[async_trait]
impl JobHandler for RecordingHandler {
    async fn run(&self, job: &JobRecord) -> Result<(), JobFailure> {
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        self.run_order.lock().unwrap().push(job.id);
        self.runs.fetch_add(1, Ordering::SeqCst);

        let delay_ms = self.run_delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(delay_ms as u64)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.fail_permanently.load(Ordering::SeqCst) {
            return Err(JobFailure::Permanent("injected permanent failure".into()));
        }
        let remaining = self.transient_failures_to_inject.load(Ordering::SeqCst);
        if remaining > 0 {
            self.transient_failures_to_inject
                .store(remaining - 1, Ordering::SeqCst);
            return Err(JobFailure::Transient("injected transient failure".into()));
        }
        Ok(())
    }

    async fn on_success(&self, _job: &JobRecord) {
        self.successes.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_retry(&self, _job: &JobRecord, _failure: &JobFailure) {
        self.retries.fetch_add(1, Ordering::SeqCst);
    }

    async fn on_permanent_failure(&self, _job: &JobRecord, _failure: &JobFailure) {
        self.permanent_failures.fetch_add(1, Ordering::SeqCst);
    }
}

/// Wait for a condition to become true with timeout
pub async fn wait_for<F, Fut>(
    condition: F,
    timeout_duration: Duration,
    poll_interval: Duration,
) -> bool
where
    F: Fn() -> Fut,
    Fut: Future<Output = bool>,
{
    let start = tokio::time::Instant::now();
    while start.elapsed() < timeout_duration {
        if condition().await {
            return true;
        }
        tokio::time::sleep(poll_interval).await;
    }
    false
}
