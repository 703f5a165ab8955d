//! Job manager configuration

use crate::error::{JobError, JobResult};
use serde::{Deserialize, Serialize};

/// Default capacity of each worker's transaction queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Job manager configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Number of worker threads; 0 runs every job inline on the thread that
    /// made it ready
    pub worker_count: usize,
    /// Transaction slots per worker queue (power of two)
    pub queue_capacity: usize,
    /// Prefix for worker and scheduler thread names
    pub thread_name_prefix: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get().saturating_sub(1).max(1))
            .unwrap_or(1);
        Self {
            worker_count,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            thread_name_prefix: "strand".to_string(),
        }
    }
}

impl JobConfig {
    /// Configuration with `worker_count` workers and default queue sizes
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    /// Zero-worker configuration: jobs run inline
    pub fn inline() -> Self {
        Self::with_workers(0)
    }

    /// Check the configuration before threads are started
    pub fn validate(&self) -> JobResult<()> {
        if !self.queue_capacity.is_power_of_two() {
            return Err(JobError::InvalidConfig(format!(
                "queue_capacity must be a non-zero power of two, got {}",
                self.queue_capacity
            )));
        }
        if self.thread_name_prefix.is_empty() {
            return Err(JobError::InvalidConfig(
                "thread_name_prefix must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = JobConfig::default();
        assert!(config.worker_count >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_inline_has_no_workers() {
        assert_eq!(JobConfig::inline().worker_count, 0);
    }

    #[test]
    fn test_rejects_bad_capacity() {
        let config = JobConfig {
            queue_capacity: 48,
            ..JobConfig::default()
        };
        assert!(matches!(config.validate(), Err(JobError::InvalidConfig(_))));
    }

    #[test]
    fn test_rejects_empty_prefix() {
        let config = JobConfig {
            thread_name_prefix: String::new(),
            ..JobConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
