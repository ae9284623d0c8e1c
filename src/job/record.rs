use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Ceiling for retry backoff delays.
pub const MAX_BACKOFF_MS: u64 = 300_000;

/// Scheduling state of a job held by the manager.
///
/// Terminal outcomes (succeeded, permanently failed) are not states; a
/// finished job leaves both memory and the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Blocked,
    Ready,
    Running,
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStatus::Blocked => write!(f, "blocked"),
            JobStatus::Ready => write!(f, "ready"),
            JobStatus::Running => write!(f, "running"),
        }
    }
}

/// Retry behavior for a job: how many attempts, and how long to back off
/// between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 1_000,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_backoff_ms: u64) -> Self {
        Self {
            max_attempts,
            base_backoff_ms,
        }
    }

    /// Delay before the next attempt after `run_count` completed attempts.
    ///
    /// Exponential in the attempt number with ±10% jitter, clamped to
    /// [`MAX_BACKOFF_MS`]. Successive delays are non-decreasing up to the
    /// ceiling: the jitter span of one step never overlaps the next.
    pub fn backoff_delay(&self, run_count: u32) -> Duration {
        let exp = run_count.saturating_sub(1).min(16);
        let nominal = self.base_backoff_ms.saturating_mul(1u64 << exp);
        if nominal >= MAX_BACKOFF_MS {
            return Duration::from_millis(MAX_BACKOFF_MS);
        }

        let span = nominal / 10;
        let jittered = if span > 0 {
            rand::thread_rng().gen_range(nominal - span..=nominal + span)
        } else {
            nominal
        };
        Duration::from_millis(jittered.min(MAX_BACKOFF_MS))
    }
}

/// The persisted form of a job. This is exactly what is serialized,
/// encrypted, and written to the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: Uuid,
    /// Discriminator selecting the registered handler for this job.
    pub kind: String,
    /// Requirement tags gating dispatch. All must hold simultaneously.
    pub requirement_tags: Vec<String>,
    /// Opaque job-specific state, interpreted only by the handler.
    pub payload: Vec<u8>,
    pub retry_policy: RetryPolicy,
    /// Number of completed execution attempts.
    pub run_count: u32,
    pub created_at: DateTime<Utc>,
}

impl JobRecord {
    pub fn new(
        kind: impl Into<String>,
        payload: Vec<u8>,
        requirement_tags: Vec<String>,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: kind.into(),
            requirement_tags,
            payload,
            retry_policy,
            run_count: 0,
            created_at: Utc::now(),
        }
    }

    pub fn attempts_exhausted(&self) -> bool {
        self.run_count >= self.retry_policy.max_attempts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_new_defaults() {
        let record = JobRecord::new(
            "refresh",
            vec![1, 2, 3],
            vec!["network".to_string()],
            RetryPolicy::default(),
        );
        assert_eq!(record.kind, "refresh");
        assert_eq!(record.run_count, 0);
        assert!(!record.attempts_exhausted());
    }

    #[test]
    fn attempts_exhausted_at_max() {
        let mut record = JobRecord::new("x", vec![], vec![], RetryPolicy::new(3, 10));
        record.run_count = 2;
        assert!(!record.attempts_exhausted());
        record.run_count = 3;
        assert!(record.attempts_exhausted());
    }

    #[test]
    fn backoff_is_monotonic_up_to_ceiling() {
        let policy = RetryPolicy::new(20, 100);
        let mut previous = Duration::ZERO;
        for run_count in 1..=20 {
            let delay = policy.backoff_delay(run_count);
            assert!(
                delay >= previous,
                "delay for attempt {} went backwards: {:?} < {:?}",
                run_count,
                delay,
                previous
            );
            assert!(delay <= Duration::from_millis(MAX_BACKOFF_MS));
            previous = delay;
        }
    }

    #[test]
    fn backoff_clamps_to_ceiling() {
        let policy = RetryPolicy::new(64, 1_000);
        assert_eq!(
            policy.backoff_delay(40),
            Duration::from_millis(MAX_BACKOFF_MS)
        );
    }

    #[test]
    fn backoff_first_attempt_near_base() {
        let policy = RetryPolicy::new(3, 1_000);
        let delay = policy.backoff_delay(1);
        assert!(delay >= Duration::from_millis(900));
        assert!(delay <= Duration::from_millis(1_100));
    }

    #[test]
    fn record_serde_round_trip() {
        let record = JobRecord::new(
            "refresh",
            b"payload".to_vec(),
            vec!["network".to_string(), "master_secret".to_string()],
            RetryPolicy::new(5, 250),
        );
        let json = serde_json::to_vec(&record).unwrap();
        let back: JobRecord = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.id, record.id);
        assert_eq!(back.kind, record.kind);
        assert_eq!(back.requirement_tags, record.requirement_tags);
        assert_eq!(back.payload, record.payload);
        assert_eq!(back.retry_policy, record.retry_policy);
        assert_eq!(back.created_at, record.created_at);
    }
}
