//! Pool configuration options

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Immutable configuration for a pool.
///
/// All timeouts default to `None`, meaning infinite: a lease waits forever,
/// preparation is unbounded, and idle instances are never evicted.
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolOptions {
    /// Number of instances pre-created at construction and after `clear`
    pub min_size: usize,
    /// Hard cap on the total number of allocated instances
    pub max_size: usize,
    /// How long a lease may wait for an instance before failing
    pub lease_timeout: Option<Duration>,
    /// Bound on a single readiness check + prepare pass
    pub preparation_timeout: Option<Duration>,
    /// Age after which an unused idle instance is evicted on the next lease
    pub idle_timeout: Option<Duration>,
    /// Install the no-op preparation strategy when none is configured
    pub use_default_preparation_strategy: bool,
    /// Install the `Default`-backed factory when none is configured
    pub use_default_factory: bool,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            min_size: 0,
            max_size: usize::MAX,
            lease_timeout: None,
            preparation_timeout: None,
            idle_timeout: None,
            use_default_preparation_strategy: false,
            use_default_factory: false,
        }
    }
}

impl PoolOptions {
    /// Validate pool options, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::configuration("max_size must be greater than 0"));
        }
        if self.min_size > self.max_size {
            return Err(Error::configuration(format!(
                "min_size ({}) must not exceed max_size ({})",
                self.min_size, self.max_size
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = PoolOptions::default();
        assert_eq!(options.min_size, 0);
        assert_eq!(options.max_size, usize::MAX);
        assert!(options.lease_timeout.is_none());
        assert!(options.preparation_timeout.is_none());
        assert!(options.idle_timeout.is_none());
        assert!(!options.use_default_preparation_strategy);
        assert!(!options.use_default_factory);
    }

    #[test]
    fn options_validation() {
        assert!(
            PoolOptions {
                max_size: 0,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(
            PoolOptions {
                min_size: 11,
                max_size: 10,
                ..Default::default()
            }
            .validate()
            .is_err()
        );
        assert!(PoolOptions::default().validate().is_ok());
    }
}
