//! Configuration for transfer operations

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration for a [`Transfer`](crate::Transfer)
///
/// The defaults reproduce the engine's intended production behavior: up to
/// four parallel range fetches for files large enough to bother, ten fixed-delay
/// attempts per operation, and a 10 second stall cutoff on every read.
#[derive(Debug, Clone)]
pub struct TransferConfig {
    /// Hard cap on parallel range fetches
    pub max_chunks: u32,
    /// Below this size per chunk, a single unranged fetch is used instead
    pub min_chunk_size: u64,
    /// Attempt cap shared by the probe and every chunk
    pub max_attempts: u32,
    /// Fixed delay between attempts (not exponential)
    pub retry_delay: Duration,
    /// A read that yields no bytes within this window fails the whole attempt
    pub read_timeout: Duration,
    /// Per-attempt limit for the metadata probe
    pub probe_timeout: Duration,
    /// Progress emission interval
    pub progress_interval: Duration,
    /// Span of samples retained for the moving-average throughput
    pub speed_window: Duration,
    pub user_agent: String,
}

impl TransferConfig {
    /// Retry policy for chunk fetches; stall detection happens per read,
    /// so no whole-attempt timeout is applied here.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.retry_delay,
            attempt_timeout: None,
        }
    }

    /// Retry policy for the metadata probe, with a whole-attempt timeout.
    pub fn probe_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: self.retry_delay,
            attempt_timeout: Some(self.probe_timeout),
        }
    }

    /// Number of samples the throughput window retains.
    pub fn window_samples(&self) -> usize {
        let interval = self.progress_interval.as_millis().max(1);
        (self.speed_window.as_millis() / interval).max(1) as usize
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_chunks: 4,
            min_chunk_size: 100 * 1024 * 1024,
            max_attempts: 10,
            retry_delay: Duration::from_millis(500),
            read_timeout: Duration::from_secs(10),
            probe_timeout: Duration::from_secs(10),
            progress_interval: Duration::from_millis(200),
            speed_window: Duration::from_secs(10),
            user_agent: concat!("rangefetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.max_chunks, 4);
        assert_eq!(config.min_chunk_size, 100 * 1024 * 1024);
        assert_eq!(config.max_attempts, 10);
        assert_eq!(config.retry_delay, Duration::from_millis(500));
        assert_eq!(config.read_timeout, Duration::from_secs(10));
    }

    #[test]
    fn window_holds_ten_seconds_of_samples() {
        let config = TransferConfig::default();
        // 10s of history at one sample per 200ms
        assert_eq!(config.window_samples(), 50);
    }

    #[test]
    fn probe_policy_carries_attempt_timeout() {
        let config = TransferConfig::default();
        assert_eq!(
            config.probe_policy().attempt_timeout,
            Some(Duration::from_secs(10))
        );
        assert_eq!(config.retry_policy().attempt_timeout, None);
    }
}
