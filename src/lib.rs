//! # leasepool
//!
//! Concurrent lease/release object pool for expensive-to-construct,
//! reusable resources (authenticated mail transports, database sessions,
//! RPC channels). Callers lease an instance, use it, and release it; the
//! pool keeps a bounded population alive, reuses idle instances, and
//! optionally verifies and reinitializes an instance before it is handed
//! out.
//!
//! ```rust,ignore
//! let pool = Pool::builder()
//!     .factory(SmtpFactory::new(config))
//!     .preparation(SmtpHandshake)
//!     .options(PoolOptions {
//!         min_size: 2,
//!         max_size: 16,
//!         lease_timeout: Some(Duration::from_secs(10)),
//!         ..Default::default()
//!     })
//!     .build()?;
//!
//! let client = pool.lease(&cancel).await?;
//! client.send(message).await?;
//! pool.release(client, &cancel).await?;
//! ```

pub mod error;
pub mod factory;
pub mod metrics;
pub mod options;
pub mod pool;
pub mod prepare;

mod request;

pub use error::{Error, Result};
pub use factory::{DefaultFactory, ItemFactory};
#[cfg(feature = "metrics")]
pub use metrics::RecorderSink;
pub use metrics::{MetricsSink, NoopSink, Sampler};
pub use options::PoolOptions;
pub use pool::{Pool, PoolBuilder};
pub use prepare::{NoopPreparation, PreparationStrategy};
