//! Error types for pool operations
use thiserror::Error;

/// Result type for pool operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type covering every failure a pool operation can surface
#[derive(Error, Debug)]
pub enum Error {
    /// Pool options are invalid
    #[error("Configuration error: {message}")]
    Configuration {
        /// The error message
        message: String,
    },

    /// Operation attempted on a disposed pool
    #[error("Pool '{pool}' is disposed")]
    Disposed {
        /// The pool name
        pool: String,
    },

    /// A lease wait ended by timeout or caller cancellation
    #[error("Lease on pool '{pool}' was cancelled: {reason}")]
    Cancelled {
        /// The pool name
        pool: String,
        /// What fired: the lease timeout, the caller token, or dispose
        reason: String,
    },

    /// The item factory failed to produce a fresh instance
    #[error("Factory for pool '{pool}' failed: {reason}")]
    FactoryFailed {
        /// The pool name
        pool: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The readiness check or prepare call failed or timed out
    #[error("Preparation failed for pool '{pool}': {reason}")]
    PreparationFailed {
        /// The pool name
        pool: String,
        /// The failure reason
        reason: String,
        /// The underlying error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a disposed error
    pub fn disposed(pool: impl Into<String>) -> Self {
        Self::Disposed { pool: pool.into() }
    }

    /// Create a cancellation error
    pub fn cancelled(pool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Cancelled {
            pool: pool.into(),
            reason: reason.into(),
        }
    }

    /// Create a factory failure
    pub fn factory(pool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FactoryFailed {
            pool: pool.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a factory failure wrapping an underlying error
    pub fn factory_source(
        pool: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FactoryFailed {
            pool: pool.into(),
            reason: source.to_string(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a preparation failure
    pub fn preparation(pool: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::PreparationFailed {
            pool: pool.into(),
            reason: reason.into(),
            source: None,
        }
    }

    /// Create a preparation failure for an elapsed preparation timeout
    pub fn preparation_timeout(pool: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::PreparationFailed {
            pool: pool.into(),
            reason: format!("timed out after {limit:?}"),
            source: None,
        }
    }

    /// Short stable label for this error kind, used for metric labels
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Disposed { .. } => "disposed",
            Self::Cancelled { .. } => "cancelled",
            Self::FactoryFailed { .. } => "factory-failed",
            Self::PreparationFailed { .. } => "preparation-failed",
        }
    }

    /// Check if this error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// Get the pool name associated with this error (if any)
    #[must_use]
    pub fn pool(&self) -> Option<&str> {
        match self {
            Self::Configuration { .. } => None,
            Self::Disposed { pool }
            | Self::Cancelled { pool, .. }
            | Self::FactoryFailed { pool, .. }
            | Self::PreparationFailed { pool, .. } => Some(pool),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancelled_is_retryable() {
        assert!(Error::cancelled("smtp", "lease timeout elapsed").is_retryable());
        assert!(!Error::disposed("smtp").is_retryable());
        assert!(!Error::factory("smtp", "connect refused").is_retryable());
    }

    #[test]
    fn kind_labels_are_stable() {
        assert_eq!(Error::disposed("p").kind(), "disposed");
        assert_eq!(Error::cancelled("p", "r").kind(), "cancelled");
        assert_eq!(Error::factory("p", "r").kind(), "factory-failed");
        assert_eq!(Error::preparation("p", "r").kind(), "preparation-failed");
        assert_eq!(Error::configuration("bad").kind(), "configuration");
    }

    #[test]
    fn pool_accessor() {
        assert_eq!(Error::disposed("smtp").pool(), Some("smtp"));
        assert_eq!(Error::configuration("bad").pool(), None);
    }
}
