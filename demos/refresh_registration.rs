//! The conditional enqueue-at-startup pattern.
//!
//! On boot, the host checks whether it is push-registered but missing a
//! local registration id; if so it enqueues a single idempotent refresh job
//! gated on network connectivity. The manager needs no special-casing for
//! this — it is ordinary caller logic in front of `add`.
//!
//! Run with: `cargo run --example refresh_registration`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use jobkeep::config::ManagerConfig;
use jobkeep::crypto::AesGcmEncryption;
use jobkeep::job::handler::{HandlerRegistry, JobFailure, JobHandler};
use jobkeep::job::record::{JobRecord, RetryPolicy};
use jobkeep::manager::JobManager;
use jobkeep::requirements::network::{
    NetworkConnectivity, NetworkRequirementProvider, NETWORK_TAG,
};
use jobkeep::requirements::RequirementRegistry;
use jobkeep::store::FileJobStore;

const REFRESH_KIND: &str = "refresh-registration";

/// Connectivity source flipped by hand in this demo.
struct ManualConnectivity {
    reachable: AtomicBool,
    on_change: Mutex<Option<Box<dyn Fn() + Send + Sync>>>,
}

impl ManualConnectivity {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            reachable: AtomicBool::new(false),
            on_change: Mutex::new(None),
        })
    }

    fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
        if let Some(on_change) = self.on_change.lock().unwrap().as_ref() {
            on_change();
        }
    }
}

impl NetworkConnectivity for ManualConnectivity {
    fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    fn subscribe(&self, on_change: Box<dyn Fn() + Send + Sync>) {
        *self.on_change.lock().unwrap() = Some(on_change);
    }
}

/// Push-registration state living outside the job system.
struct RegistrationState {
    push_registered: bool,
    registration_id: Mutex<Option<String>>,
}

struct RefreshRegistrationHandler {
    state: Arc<RegistrationState>,
}

#[async_trait]
impl JobHandler for RefreshRegistrationHandler {
    async fn run(&self, _job: &JobRecord) -> Result<(), JobFailure> {
        let mut registration_id = self.state.registration_id.lock().unwrap();
        if registration_id.is_some() {
            // Already refreshed; a duplicate run must be harmless.
            return Ok(());
        }
        *registration_id = Some("registration-7f3a".to_string());
        println!("refreshed push registration");
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let state = Arc::new(RegistrationState {
        push_registered: true,
        registration_id: Mutex::new(None),
    });
    let connectivity = ManualConnectivity::new();

    let store_dir = tempfile::tempdir()?;
    let store = FileJobStore::open(
        store_dir.path(),
        Arc::new(AesGcmEncryption::new(&[1u8; 32])),
    )
    .await?;

    let mut handlers = HandlerRegistry::new();
    handlers.register(
        REFRESH_KIND,
        Arc::new(RefreshRegistrationHandler {
            state: state.clone(),
        }),
    );

    let mut requirements = RequirementRegistry::new();
    requirements.register(Arc::new(NetworkRequirementProvider::new(
        connectivity.clone(),
    )));

    let manager = JobManager::initialize(
        ManagerConfig::default().with_sweep_interval_ms(100),
        store,
        handlers,
        requirements,
    )
    .await?;

    // Registered but missing a registration id: enqueue exactly one refresh.
    let needs_refresh =
        state.push_registered && state.registration_id.lock().unwrap().is_none();
    if needs_refresh {
        let job_id = manager
            .add(
                REFRESH_KIND,
                Vec::new(),
                vec![NETWORK_TAG.to_string()],
                RetryPolicy::default(),
            )
            .await?;
        println!("enqueued refresh job {job_id} (device is offline)");
    }

    tokio::time::sleep(Duration::from_millis(300)).await;
    println!(
        "pending while offline: {}",
        manager.pending_count().await
    );

    connectivity.set_reachable(true);
    tokio::time::sleep(Duration::from_millis(300)).await;
    println!(
        "pending after connectivity: {}",
        manager.pending_count().await
    );
    println!(
        "registration id: {:?}",
        state.registration_id.lock().unwrap()
    );

    manager.shutdown().await;
    Ok(())
}
