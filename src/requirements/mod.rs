//! Requirement gating: runtime preconditions for job dispatch.
//!
//! A job names requirement tags; each tag is the discriminator of a
//! [`RequirementProvider`] registered with the manager. A job is promoted to
//! Ready only when every tagged provider reports satisfied at the same
//! evaluation (AND semantics). Providers push change notifications through a
//! [`ChangeNotifier`]; a periodic sweep in the manager backstops missed
//! notifications.

pub mod master_secret;
pub mod network;

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::mpsc;

/// A provider failed while evaluating. Treated as "requirement currently
/// unsatisfied" by the manager; never propagated.
#[derive(Error, Debug)]
#[error("Requirement provider fault: {0}")]
pub struct ProviderFault(pub String);

/// Observes one runtime condition and answers whether it currently holds.
///
/// `evaluate` sits on the dispatch-critical path: it must be fast and must
/// not block. Providers may fire their [`ChangeNotifier`] at any time, from
/// any thread; the manager treats notifications as asynchronous events.
pub trait RequirementProvider: Send + Sync {
    /// Discriminator that requirement tags resolve against.
    fn id(&self) -> &str;

    /// Current truth value of the condition. An error is fail-closed.
    fn evaluate(&self) -> Result<bool, ProviderFault>;

    /// One-time wiring at manager construction. The default keeps the
    /// provider silent; such a provider is only re-checked by the sweep.
    fn subscribe(&self, _notifier: ChangeNotifier) {}
}

/// Cheap handle a provider fires when its condition may have flipped.
/// `notify` is synchronous and never blocks.
#[derive(Clone)]
pub struct ChangeNotifier {
    provider_id: String,
    tx: mpsc::UnboundedSender<String>,
}

impl ChangeNotifier {
    pub(crate) fn new(provider_id: String, tx: mpsc::UnboundedSender<String>) -> Self {
        Self { provider_id, tx }
    }

    pub fn notify(&self) {
        // Send fails only after manager shutdown; nothing left to wake.
        let _ = self.tx.send(self.provider_id.clone());
    }
}

/// Maps requirement tags to providers. Populated once before the manager
/// starts; additional providers plug in without manager changes.
#[derive(Default)]
pub struct RequirementRegistry {
    providers: HashMap<String, Arc<dyn RequirementProvider>>,
}

impl RequirementRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn RequirementProvider>) {
        self.providers.insert(provider.id().to_string(), provider);
    }

    /// Evaluate a single tag, fail-closed: unknown tags and provider faults
    /// both count as unsatisfied.
    pub fn is_satisfied(&self, tag: &str) -> bool {
        match self.providers.get(tag) {
            Some(provider) => match provider.evaluate() {
                Ok(satisfied) => satisfied,
                Err(fault) => {
                    tracing::warn!(tag, %fault, "Requirement provider fault, treating as unsatisfied");
                    false
                }
            },
            None => {
                tracing::warn!(tag, "No provider registered for requirement tag");
                false
            }
        }
    }

    /// AND semantics: all tags must hold at this single evaluation.
    pub fn all_satisfied(&self, tags: &[String]) -> bool {
        tags.iter().all(|tag| self.is_satisfied(tag))
    }

    /// Hand every provider its notifier. Called once by the manager.
    pub(crate) fn subscribe_all(&self, tx: &mpsc::UnboundedSender<String>) {
        for (id, provider) in &self.providers {
            provider.subscribe(ChangeNotifier::new(id.clone(), tx.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedProvider {
        id: &'static str,
        value: bool,
    }

    impl RequirementProvider for FixedProvider {
        fn id(&self) -> &str {
            self.id
        }

        fn evaluate(&self) -> Result<bool, ProviderFault> {
            Ok(self.value)
        }
    }

    struct BrokenProvider;

    impl RequirementProvider for BrokenProvider {
        fn id(&self) -> &str {
            "broken"
        }

        fn evaluate(&self) -> Result<bool, ProviderFault> {
            Err(ProviderFault("sensor unavailable".to_string()))
        }
    }

    fn tags(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn and_semantics_over_tags() {
        let mut registry = RequirementRegistry::new();
        registry.register(Arc::new(FixedProvider {
            id: "a",
            value: true,
        }));
        registry.register(Arc::new(FixedProvider {
            id: "b",
            value: false,
        }));

        assert!(registry.all_satisfied(&tags(&["a"])));
        assert!(!registry.all_satisfied(&tags(&["a", "b"])));
        assert!(registry.all_satisfied(&[]));
    }

    #[test]
    fn unknown_tag_is_unsatisfied() {
        let registry = RequirementRegistry::new();
        assert!(!registry.is_satisfied("nope"));
    }

    #[test]
    fn provider_fault_is_fail_closed() {
        let mut registry = RequirementRegistry::new();
        registry.register(Arc::new(BrokenProvider));
        assert!(!registry.is_satisfied("broken"));
    }
}
