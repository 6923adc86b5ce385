//! Configuration for the reference store
//!
//! Covers the write-lock wait policy and the default distribution family
//! used when a caller does not name one explicitly.

use crate::error::{Result, StoreError};
use crate::model::ModelFamily;
use std::time::Duration;

/// Tunables for a [`Store`](crate::store::Store) instance
///
/// # Example
/// ```
/// use remarca::StoreConfig;
/// use std::time::Duration;
///
/// let config = StoreConfig::default().with_lock_timeout(Duration::from_secs(10));
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Maximum time to wait for the write-side advisory lock.
    ///
    /// Exceeding this yields `StoreError::LockTimeout`; the caller decides
    /// the retry policy.
    ///
    /// Default: 5 seconds
    pub lock_timeout: Duration,

    /// Poll interval while the lock is held by another process.
    ///
    /// Default: 50 milliseconds
    pub lock_poll: Duration,

    /// Distribution family used by `create_reference` when none is given.
    ///
    /// Default: gamma. Runtime distributions are right-skewed, so a gamma
    /// fit absorbs the tail better than a normal fit.
    pub default_family: ModelFamily,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_secs(5),
            lock_poll: Duration::from_millis(50),
            default_family: ModelFamily::Gamma,
        }
    }
}

impl StoreConfig {
    /// Set the lock acquisition timeout
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the lock poll interval
    pub fn with_lock_poll(mut self, poll: Duration) -> Self {
        self.lock_poll = poll;
        self
    }

    /// Set the default distribution family
    pub fn with_default_family(mut self, family: ModelFamily) -> Self {
        self.default_family = family;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.lock_timeout.is_zero() {
            return Err(StoreError::Config(
                "lock_timeout must be non-zero".to_string(),
            ));
        }
        if self.lock_poll.is_zero() {
            return Err(StoreError::Config("lock_poll must be non-zero".to_string()));
        }
        if self.lock_poll > self.lock_timeout {
            return Err(StoreError::Config(format!(
                "lock_poll ({:?}) must not exceed lock_timeout ({:?})",
                self.lock_poll, self.lock_timeout
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StoreConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.lock_poll, Duration::from_millis(50));
        assert_eq!(config.default_family, ModelFamily::Gamma);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = StoreConfig::default()
            .with_lock_timeout(Duration::from_secs(1))
            .with_lock_poll(Duration::from_millis(10))
            .with_default_family(ModelFamily::Normal);
        assert_eq!(config.lock_timeout, Duration::from_secs(1));
        assert_eq!(config.lock_poll, Duration::from_millis(10));
        assert_eq!(config.default_family, ModelFamily::Normal);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let config = StoreConfig::default().with_lock_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_poll_longer_than_timeout_rejected() {
        let config = StoreConfig::default()
            .with_lock_timeout(Duration::from_millis(10))
            .with_lock_poll(Duration::from_millis(100));
        assert!(config.validate().is_err());
    }
}
