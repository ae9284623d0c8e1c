use std::sync::Arc;

use super::{ChangeNotifier, ProviderFault, RequirementProvider};

/// Tag jobs use to require the user's master secret to be unlocked.
pub const MASTER_SECRET_TAG: &str = "master_secret";

/// Host-supplied view of credential/key availability.
pub trait MasterSecretAvailability: Send + Sync {
    /// True iff the master secret is currently unlocked in memory.
    fn is_unlocked(&self) -> bool;

    fn subscribe(&self, _on_change: Box<dyn Fn() + Send + Sync>) {}
}

/// Standing provider: satisfied iff the user's key material is unlocked.
pub struct MasterSecretRequirementProvider {
    source: Arc<dyn MasterSecretAvailability>,
}

impl MasterSecretRequirementProvider {
    pub fn new(source: Arc<dyn MasterSecretAvailability>) -> Self {
        Self { source }
    }
}

impl RequirementProvider for MasterSecretRequirementProvider {
    fn id(&self) -> &str {
        MASTER_SECRET_TAG
    }

    fn evaluate(&self) -> Result<bool, ProviderFault> {
        Ok(self.source.is_unlocked())
    }

    fn subscribe(&self, notifier: ChangeNotifier) {
        self.source.subscribe(Box::new(move || notifier.notify()));
    }
}
