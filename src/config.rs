/// Configuration for the job manager.
///
/// Controls worker-pool sizing, the defensive requirement sweep, and the
/// graceful-shutdown drain window.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of jobs executing concurrently.
    pub concurrency: usize,
    /// Interval of the periodic sweep that re-evaluates blocked jobs.
    ///
    /// The sweep is a backstop against missed provider notifications and is
    /// also what promotes jobs whose retry backoff has expired.
    pub sweep_interval_ms: u64,
    /// How long `shutdown` waits for in-flight jobs before abandoning them.
    ///
    /// Abandoned jobs keep their persisted record and are picked up by
    /// reconciliation on the next startup.
    pub shutdown_grace_ms: u64,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            sweep_interval_ms: 500,
            shutdown_grace_ms: 5_000,
        }
    }
}

impl ManagerConfig {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency,
            ..Default::default()
        }
    }

    pub fn with_sweep_interval_ms(mut self, interval_ms: u64) -> Self {
        self.sweep_interval_ms = interval_ms;
        self
    }

    pub fn with_shutdown_grace_ms(mut self, grace_ms: u64) -> Self {
        self.shutdown_grace_ms = grace_ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manager_config_default() {
        let cfg = ManagerConfig::default();
        assert_eq!(cfg.concurrency, 5);
        assert_eq!(cfg.sweep_interval_ms, 500);
        assert_eq!(cfg.shutdown_grace_ms, 5_000);
    }

    #[test]
    fn manager_config_new() {
        let cfg = ManagerConfig::new(2);
        assert_eq!(cfg.concurrency, 2);
        assert_eq!(cfg.sweep_interval_ms, 500);
    }

    #[test]
    fn manager_config_builders() {
        let cfg = ManagerConfig::new(1)
            .with_sweep_interval_ms(50)
            .with_shutdown_grace_ms(100);
        assert_eq!(cfg.sweep_interval_ms, 50);
        assert_eq!(cfg.shutdown_grace_ms, 100);
    }
}
