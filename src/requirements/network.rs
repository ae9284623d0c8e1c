use std::sync::Arc;

use super::{ChangeNotifier, ProviderFault, RequirementProvider};

/// Tag jobs use to require network reachability.
pub const NETWORK_TAG: &str = "network";

/// Host-supplied view of device connectivity.
///
/// `subscribe` registers a callback the source invokes whenever
/// reachability may have changed; sources without push signaling can leave
/// the default and rely on the manager's sweep.
pub trait NetworkConnectivity: Send + Sync {
    fn is_reachable(&self) -> bool;

    fn subscribe(&self, _on_change: Box<dyn Fn() + Send + Sync>) {}
}

/// Standing provider: satisfied iff the device currently has network
/// reachability.
pub struct NetworkRequirementProvider {
    source: Arc<dyn NetworkConnectivity>,
}

impl NetworkRequirementProvider {
    pub fn new(source: Arc<dyn NetworkConnectivity>) -> Self {
        Self { source }
    }
}

impl RequirementProvider for NetworkRequirementProvider {
    fn id(&self) -> &str {
        NETWORK_TAG
    }

    fn evaluate(&self) -> Result<bool, ProviderFault> {
        Ok(self.source.is_reachable())
    }

    fn subscribe(&self, notifier: ChangeNotifier) {
        self.source.subscribe(Box::new(move || notifier.notify()));
    }
}
