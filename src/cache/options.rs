//! Cache configuration and the expiry rule

use super::CacheError;

/// Default time-to-live for cached records, in seconds
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 300;

/// Options fixed when a cache is constructed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheOptions {
    cache_timeout: u64,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            cache_timeout: DEFAULT_CACHE_TIMEOUT_SECS,
        }
    }
}

impl CacheOptions {
    /// Creates options with the given timeout in seconds
    ///
    /// # Returns
    /// * `Err(CacheError::InvalidTimeout)` if `cache_timeout_secs` is zero
    pub fn new(cache_timeout_secs: u64) -> Result<Self, CacheError> {
        if cache_timeout_secs == 0 {
            return Err(CacheError::InvalidTimeout(cache_timeout_secs));
        }
        Ok(Self {
            cache_timeout: cache_timeout_secs,
        })
    }

    /// Time-to-live in seconds
    pub fn cache_timeout(&self) -> u64 {
        self.cache_timeout
    }

    /// Whether a record stamped at `timestamp` has expired at `now` (both in ms)
    ///
    /// A record is expired once its age in seconds strictly exceeds the
    /// timeout. The comparison is done in milliseconds so that an age of
    /// `timeout * 1000 + 1` counts as expired.
    pub fn is_expired(&self, timestamp: i64, now: i64) -> bool {
        let age = i128::from(now) - i128::from(timestamp);
        age > i128::from(self.cache_timeout) * 1000
    }
}
