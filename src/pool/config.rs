//! Tuning knobs for the connection pool.

use std::time::Duration;

use crate::error::{DeepgramError, DeepgramResult};

const DEFAULT_INITIAL_SIZE: usize = 5;
const DEFAULT_MAX_SIZE: usize = 10;
const DEFAULT_KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(3600);
const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_RETRIES: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Pool configuration with chainable, validating setters.
///
/// `initial_size` may never exceed `max_size`; both setters enforce the
/// relation against the current value of the other field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    initial_size: usize,
    max_size: usize,
    keep_alive_interval: Duration,
    connection_timeout: Duration,
    acquire_timeout: Duration,
    max_retries: u32,
    retry_delay: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: DEFAULT_INITIAL_SIZE,
            max_size: DEFAULT_MAX_SIZE,
            keep_alive_interval: DEFAULT_KEEP_ALIVE_INTERVAL,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            acquire_timeout: DEFAULT_ACQUIRE_TIMEOUT,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl PoolConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of connections created eagerly at pool construction.
    pub fn with_initial_size(mut self, initial_size: usize) -> DeepgramResult<Self> {
        if initial_size > self.max_size {
            return Err(DeepgramError::InvalidArgument(
                "Initial size cannot be greater than max size".to_string(),
            ));
        }
        self.initial_size = initial_size;
        Ok(self)
    }

    /// Upper bound on live connections (idle + active).
    pub fn with_max_size(mut self, max_size: usize) -> DeepgramResult<Self> {
        if max_size < self.initial_size {
            return Err(DeepgramError::InvalidArgument(
                "Max size cannot be less than initial size".to_string(),
            ));
        }
        self.max_size = max_size;
        Ok(self)
    }

    /// Cadence of application-level KeepAlive frames. Zero disables them.
    pub fn with_keep_alive_interval(mut self, interval: Duration) -> Self {
        self.keep_alive_interval = interval;
        self
    }

    /// How long a connection may sit idle before the pool retires it.
    /// Zero disables idle retirement.
    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Deadline a caller is willing to wait in `acquire`.
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// Connect attempts per session creation beyond the first.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Pause between connect attempts during session creation.
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn initial_size(&self) -> usize {
        self.initial_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn keep_alive_interval(&self) -> Duration {
        self.keep_alive_interval
    }

    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = PoolConfig::default();
        assert_eq!(config.initial_size(), 5);
        assert_eq!(config.max_size(), 10);
        assert_eq!(config.keep_alive_interval(), Duration::from_secs(30));
        assert_eq!(config.connection_timeout(), Duration::from_secs(3600));
        assert_eq!(config.acquire_timeout(), Duration::from_secs(5));
        assert_eq!(config.max_retries(), 3);
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn setters_chain() {
        let config = PoolConfig::new()
            .with_initial_size(2)
            .unwrap()
            .with_max_size(4)
            .unwrap()
            .with_acquire_timeout(Duration::from_millis(500));
        assert_eq!(config.initial_size(), 2);
        assert_eq!(config.max_size(), 4);
        assert_eq!(config.acquire_timeout(), Duration::from_millis(500));
    }

    #[test]
    fn initial_size_cannot_exceed_max_size() {
        assert!(PoolConfig::new().with_initial_size(11).is_err());
        assert!(PoolConfig::new().with_initial_size(10).is_ok());
    }

    #[test]
    fn max_size_cannot_undercut_initial_size() {
        assert!(PoolConfig::new().with_max_size(4).is_err());
        assert!(PoolConfig::new().with_max_size(5).is_ok());

        let shrunk = PoolConfig::new()
            .with_initial_size(0)
            .unwrap()
            .with_max_size(1)
            .unwrap();
        assert_eq!(shrunk.max_size(), 1);
    }

    #[test]
    fn zero_initial_size_is_allowed() {
        let config = PoolConfig::new().with_initial_size(0).unwrap();
        assert_eq!(config.initial_size(), 0);
    }
}
