//! Preparation strategy — verify and reinitialize instances before hand-out

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Verifies and reinitializes an instance just before it is handed to a
/// caller.
///
/// When a strategy is configured, the pool calls [`is_ready`] on every
/// instance about to be handed out; if it reports `false`, [`prepare`] runs
/// before the hand-out completes. Both calls are bounded by the pool's
/// preparation timeout composed with the caller's cancellation token, which
/// is passed through so long-running implementations can abort early.
///
/// An error from either call fails the lease: the instance is dropped and
/// never returned to the idle store.
///
/// [`is_ready`]: PreparationStrategy::is_ready
/// [`prepare`]: PreparationStrategy::prepare
#[async_trait]
pub trait PreparationStrategy<T>: Send + Sync {
    /// Cheap liveness check (e.g. a protocol no-op).
    async fn is_ready(&self, item: &T, cancel: &CancellationToken) -> Result<bool>;

    /// Heavyweight initialization (e.g. TCP connect + authenticate).
    async fn prepare(&self, item: &mut T, cancel: &CancellationToken) -> Result<()>;
}

/// Strategy that reports every instance ready and prepares nothing.
///
/// Installed by
/// [`PoolBuilder::default_preparation`](crate::pool::PoolBuilder::default_preparation).
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreparation;

#[async_trait]
impl<T: Send + Sync> PreparationStrategy<T> for NoopPreparation {
    async fn is_ready(&self, _item: &T, _cancel: &CancellationToken) -> Result<bool> {
        Ok(true)
    }

    async fn prepare(&self, _item: &mut T, _cancel: &CancellationToken) -> Result<()> {
        Ok(())
    }
}
