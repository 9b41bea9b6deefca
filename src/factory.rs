//! Item factory trait and the `Default`-backed implementation

use std::marker::PhantomData;

use crate::error::Result;

/// Produces fresh instances of the pooled resource on demand.
///
/// `create` is synchronous and must not block on the network; expensive
/// initialization (connect, authenticate) belongs in a
/// [`PreparationStrategy`](crate::prepare::PreparationStrategy). A failure
/// during a lease surfaces to the caller and rolls back the allocation
/// count.
pub trait ItemFactory: Send + Sync {
    /// The instance type produced by this factory.
    type Item: Send;

    /// Produce a fresh instance.
    fn create(&self) -> Result<Self::Item>;
}

/// Factory producing `T::default()`, installed by
/// [`PoolBuilder::default_factory`](crate::pool::PoolBuilder::default_factory).
pub struct DefaultFactory<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> DefaultFactory<T> {
    /// Create a new default factory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for DefaultFactory<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for DefaultFactory<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefaultFactory").finish()
    }
}

impl<T: Default + Send> ItemFactory for DefaultFactory<T> {
    type Item = T;

    fn create(&self) -> Result<T> {
        Ok(T::default())
    }
}
