//! Concurrent lease/release pool core.
//!
//! `Pool<T>` owns a bounded population of instances produced by an
//! [`ItemFactory`], hands them to callers via [`lease`](Pool::lease), and
//! takes them back via [`release`](Pool::release). Idle instances are kept
//! in a FIFO store and re-used; when the store is empty and the pool is at
//! `max_size`, leases park in a FIFO waiter queue and are fulfilled
//! directly by releases.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};
use crate::factory::{DefaultFactory, ItemFactory};
use crate::metrics::{MetricsSink, NoopSink, Sampler};
use crate::options::PoolOptions;
use crate::prepare::{NoopPreparation, PreparationStrategy};
use crate::request::{lease_request, LeaseRequest, LeaseWait};

// ---------------------------------------------------------------------------
// Pool internals
// ---------------------------------------------------------------------------

/// An idle-store record wrapping an instance.
struct IdleEntry<T> {
    instance: T,
    idle_since: Instant,
}

impl<T> IdleEntry<T> {
    fn new(instance: T) -> Self {
        Self {
            instance,
            idle_since: Instant::now(),
        }
    }

    fn is_stale(&self, options: &PoolOptions) -> bool {
        options
            .idle_timeout
            .is_some_and(|limit| self.idle_since.elapsed() > limit)
    }
}

/// Idle store + waiter queue + allocation counter under a single lock.
///
/// Never held across an await; every lock section is straight-line code
/// with no I/O and no user callbacks.
struct PoolState<T> {
    idle: VecDeque<IdleEntry<T>>,
    waiters: VecDeque<LeaseRequest<T>>,
    allocated: usize,
    disposed: bool,
}

impl<T> PoolState<T> {
    fn active(&self) -> usize {
        self.allocated.saturating_sub(self.idle.len())
    }

    fn live_waiters(&self) -> usize {
        self.waiters.iter().filter(|w| !w.is_settled()).count()
    }
}

/// Inner shared state for the pool.
struct PoolInner<T> {
    name: String,
    options: PoolOptions,
    factory: Arc<dyn ItemFactory<Item = T>>,
    preparation: Option<Arc<dyn PreparationStrategy<T>>>,
    metrics: Arc<dyn MetricsSink>,
    state: Mutex<PoolState<T>>,
}

/// Outcome of the non-waiting acquisition attempt inside `lease`.
enum Claim<T> {
    /// A usable entry was taken from the idle store.
    Idle(T),
    /// Headroom below `max_size` was reserved; the factory runs next.
    Allocate,
    /// The pool is full; the lease parked in the waiter queue.
    Queued(LeaseWait<T>),
}

// ---------------------------------------------------------------------------
// Pool<T>
// ---------------------------------------------------------------------------

/// Generic concurrent object pool.
///
/// Cloning is cheap and shares the underlying pool.
pub struct Pool<T: Send + Sync + 'static> {
    inner: Arc<PoolInner<T>>,
}

impl<T: Send + Sync + 'static> Clone for Pool<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for Pool<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Pool")
            .field("name", &self.inner.name)
            .field("allocated", &state.allocated)
            .field("available", &state.idle.len())
            .field("queued", &state.live_waiters())
            .field("disposed", &state.disposed)
            .finish()
    }
}

impl<T: Send + Sync + 'static> Pool<T> {
    /// Start building a pool.
    #[must_use]
    pub fn builder() -> PoolBuilder<T> {
        PoolBuilder::new()
    }

    /// Create a pool from a factory and options.
    ///
    /// # Errors
    /// Returns an error if the options are invalid or the factory fails
    /// while pre-creating `min_size` instances.
    pub fn new<F>(factory: F, options: PoolOptions) -> Result<Self>
    where
        F: ItemFactory<Item = T> + 'static,
    {
        Self::builder().factory(factory).options(options).build()
    }

    /// The pool name used in errors and metric names.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// True when a preparation strategy is configured.
    #[must_use]
    pub fn preparation_required(&self) -> bool {
        self.inner.preparation.is_some()
    }

    // -- Observables -------------------------------------------------------

    /// Number of instances currently owned by the pool (idle + leased).
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.inner.state.lock().allocated
    }

    /// Number of instances currently in the idle store.
    #[must_use]
    pub fn available(&self) -> usize {
        self.inner.state.lock().idle.len()
    }

    /// Number of instances currently on loan to callers.
    #[must_use]
    pub fn active_leases(&self) -> usize {
        self.inner.state.lock().active()
    }

    /// Number of leases parked in the waiter queue and still live.
    #[must_use]
    pub fn queued_leases(&self) -> usize {
        self.inner.state.lock().live_waiters()
    }

    /// Fraction of allocated instances currently on loan (0.0 when the
    /// pool owns nothing).
    #[must_use]
    pub fn utilization_rate(&self) -> f64 {
        let state = self.inner.state.lock();
        if state.allocated == 0 {
            0.0
        } else {
            state.active() as f64 / state.allocated as f64
        }
    }

    /// True once [`dispose`](Pool::dispose) has run.
    #[must_use]
    pub fn is_disposed(&self) -> bool {
        self.inner.state.lock().disposed
    }

    // -- Lease -------------------------------------------------------------

    /// Lease an instance from the pool.
    ///
    /// Takes the oldest usable idle instance, or allocates a fresh one
    /// while under `max_size`, or parks until a release hands one over.
    /// The instance is prepared before it is returned. Stale idle entries
    /// encountered on the way are evicted.
    ///
    /// # Errors
    /// `Disposed` on a disposed pool; `Cancelled` when the lease timeout
    /// elapses or `cancel` fires; `FactoryFailed` / `PreparationFailed`
    /// as surfaced by the collaborators.
    pub async fn lease(&self, cancel: &CancellationToken) -> Result<T> {
        let start = Instant::now();
        if cancel.is_cancelled() {
            let err = Error::cancelled(&self.inner.name, "cancelled before lease");
            self.inner.metrics.record_lease_error(&err);
            return Err(err);
        }

        let claim = match self.claim(cancel) {
            Ok(claim) => claim,
            Err(err) => {
                self.inner.metrics.record_lease_error(&err);
                return Err(err);
            }
        };

        match claim {
            Claim::Idle(item) => self.prepare_and_deliver(item, cancel, start).await,
            Claim::Allocate => {
                let item = match self.inner.factory.create() {
                    Ok(item) => item,
                    Err(err) => {
                        // Roll back the reservation taken in claim().
                        {
                            let mut state = self.inner.state.lock();
                            state.allocated = state.allocated.saturating_sub(1);
                        }
                        self.inner.metrics.record_lease_error(&err);
                        return Err(err);
                    }
                };
                #[cfg(feature = "tracing")]
                tracing::debug!(pool = %self.inner.name, "created new instance");
                self.prepare_and_deliver(item, cancel, start).await
            }
            Claim::Queued(wait) => match wait.wait().await {
                Ok(item) => {
                    // Prepared by the release side before hand-off.
                    self.inner.metrics.record_lease_wait_time(start.elapsed());
                    Ok(item)
                }
                Err(err) => {
                    self.inner.metrics.record_lease_error(&err);
                    Err(err)
                }
            },
        }
    }

    /// Non-waiting acquisition attempt: idle store, then allocation
    /// headroom, then the waiter queue. Eviction of stale idle entries
    /// happens here, opportunistically.
    fn claim(&self, cancel: &CancellationToken) -> Result<Claim<T>> {
        let mut evicted = Vec::new();
        let claim = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(Error::disposed(&self.inner.name));
            }
            loop {
                match state.idle.pop_front() {
                    Some(entry) if entry.is_stale(&self.inner.options) => {
                        state.allocated = state.allocated.saturating_sub(1);
                        evicted.push(entry.instance);
                    }
                    Some(entry) => break Claim::Idle(entry.instance),
                    None => {
                        if state.allocated < self.inner.options.max_size {
                            state.allocated += 1;
                            break Claim::Allocate;
                        }
                        let (request, wait) = lease_request(
                            self.inner.options.lease_timeout,
                            cancel.clone(),
                            self.inner.name.clone(),
                        );
                        state.waiters.push_back(request);
                        break Claim::Queued(wait);
                    }
                }
            }
        };
        if !evicted.is_empty() {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                pool = %self.inner.name,
                count = evicted.len(),
                "evicted stale idle instances"
            );
            drop(evicted);
        }
        Ok(claim)
    }

    async fn prepare_and_deliver(
        &self,
        mut item: T,
        cancel: &CancellationToken,
        start: Instant,
    ) -> Result<T> {
        if let Err(err) = self.prepare_instance(&mut item, cancel).await {
            self.discard(item);
            return Err(err);
        }
        self.inner.metrics.record_lease_wait_time(start.elapsed());
        Ok(item)
    }

    /// Run the preparation strategy on an instance about to be handed out.
    ///
    /// No-op when no strategy is configured. Otherwise `is_ready` runs
    /// first and `prepare` only if it reported false, both bounded by the
    /// preparation timeout composed with the caller token.
    async fn prepare_instance(&self, item: &mut T, cancel: &CancellationToken) -> Result<()> {
        let Some(strategy) = self.inner.preparation.as_ref() else {
            return Ok(());
        };
        // Child token: caller cancellation propagates to the strategy, and
        // the timeout arm cancels it explicitly.
        let effective = cancel.child_token();
        let limit = self.inner.options.preparation_timeout;
        let name = self.inner.name.as_str();
        let metrics = &self.inner.metrics;

        let steps = async {
            if strategy.is_ready(&*item, &effective).await? {
                return Ok(());
            }
            let begin = Instant::now();
            strategy.prepare(item, &effective).await?;
            metrics.record_preparation_time(begin.elapsed());
            Ok(())
        };
        let bounded = async {
            match limit {
                Some(limit) => match tokio::time::timeout(limit, steps).await {
                    Ok(result) => result,
                    Err(_) => {
                        effective.cancel();
                        Err(Error::preparation_timeout(name, limit))
                    }
                },
                None => steps.await,
            }
        };
        let result = tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Error::cancelled(name, "cancelled during preparation")),
            result = bounded => result,
        };
        if let Err(err) = &result {
            self.inner.metrics.record_preparation_error(err);
            #[cfg(feature = "tracing")]
            tracing::debug!(pool = %self.inner.name, error = %err, "preparation failed");
        }
        result
    }

    /// Destroy an instance the pool owns and give up its allocation slot.
    fn discard(&self, item: T) {
        {
            let mut state = self.inner.state.lock();
            state.allocated = state.allocated.saturating_sub(1);
        }
        drop(item);
    }

    // -- Release -----------------------------------------------------------

    /// Return a previously leased instance to the pool.
    ///
    /// The instance goes to the oldest live waiter if one is parked
    /// (prepared first, at most once per release), otherwise to the tail
    /// of the idle store. Waiters that settled while parked are purged on
    /// the way.
    ///
    /// # Errors
    /// `Disposed` on a disposed pool (the instance is destroyed);
    /// `PreparationFailed` when preparing for a hand-off fails (the
    /// instance is destroyed, the waiter keeps its place in the queue).
    pub async fn release(&self, item: T, cancel: &CancellationToken) -> Result<()> {
        let mut item = item;
        let mut prepared = false;
        loop {
            let waiter = {
                let mut state = self.inner.state.lock();
                if state.disposed {
                    state.allocated = state.allocated.saturating_sub(1);
                    drop(state);
                    drop(item);
                    return Err(Error::disposed(&self.inner.name));
                }
                let mut live = None;
                while let Some(request) = state.waiters.pop_front() {
                    if request.is_settled() {
                        // Purge: a waiter that timed out or cancelled
                        // between enqueue and this scan.
                        continue;
                    }
                    live = Some(request);
                    break;
                }
                match live {
                    Some(request) => request,
                    None => {
                        state.idle.push_back(IdleEntry::new(item));
                        return Ok(());
                    }
                }
            };

            if !prepared {
                if let Err(err) = self.prepare_instance(&mut item, cancel).await {
                    self.discard(item);
                    // The waiter keeps its FIFO position for the next release.
                    self.inner.state.lock().waiters.push_front(waiter);
                    return Err(err);
                }
                prepared = true;
            }

            match waiter.try_fulfill(item) {
                Ok(()) => return Ok(()),
                // Lost the race against the waiter's cancellation; offer
                // the already-prepared instance to the next one.
                Err(back) => item = back,
            }
        }
    }

    // -- Clear -------------------------------------------------------------

    /// Discard every idle instance and rebuild a fresh population.
    ///
    /// Destroys the idle store, then recreates `max(queued_leases,
    /// min_size)` fresh instances (capped at `max_size`) and funnels each
    /// through the release path so pending waiters are satisfied first.
    /// Instances currently on loan are not revoked.
    ///
    /// # Errors
    /// `Disposed` on a disposed pool; factory and preparation failures
    /// during the rebuild propagate.
    pub async fn clear(&self, cancel: &CancellationToken) -> Result<()> {
        let (drained, target) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return Err(Error::disposed(&self.inner.name));
            }
            let drained: Vec<IdleEntry<T>> = state.idle.drain(..).collect();
            state.allocated = 0;
            let target = state
                .live_waiters()
                .max(self.inner.options.min_size)
                .min(self.inner.options.max_size);
            (drained, target)
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pool = %self.inner.name,
            destroyed = drained.len(),
            recreate = target,
            "clearing pool"
        );
        drop(drained);

        for _ in 0..target {
            {
                let mut state = self.inner.state.lock();
                if state.allocated >= self.inner.options.max_size {
                    break;
                }
                state.allocated += 1;
            }
            let item = match self.inner.factory.create() {
                Ok(item) => item,
                Err(err) => {
                    let mut state = self.inner.state.lock();
                    state.allocated = state.allocated.saturating_sub(1);
                    return Err(err);
                }
            };
            self.release(item, cancel).await?;
        }
        Ok(())
    }

    // -- Dispose -----------------------------------------------------------

    /// Permanently shut the pool down. Idempotent.
    ///
    /// Every parked waiter is settled with cancellation, every idle
    /// instance is destroyed, and all subsequent operations fail with
    /// `Disposed`. Instances on loan are destroyed when their holders
    /// attempt to release them.
    pub fn dispose(&self) {
        let (waiters, idle) = {
            let mut state = self.inner.state.lock();
            if state.disposed {
                return;
            }
            state.disposed = true;
            let waiters: Vec<LeaseRequest<T>> = state.waiters.drain(..).collect();
            let idle: Vec<IdleEntry<T>> = state.idle.drain(..).collect();
            state.allocated = state.allocated.saturating_sub(idle.len());
            (waiters, idle)
        };
        #[cfg(feature = "tracing")]
        tracing::debug!(
            pool = %self.inner.name,
            cancelled_waiters = waiters.len(),
            destroyed = idle.len(),
            "disposed pool"
        );
        for waiter in waiters {
            waiter.settle_cancelled();
        }
        drop(idle);
    }
}

// ---------------------------------------------------------------------------
// PoolBuilder
// ---------------------------------------------------------------------------

/// Builder for [`Pool`].
pub struct PoolBuilder<T: Send + Sync + 'static> {
    name: Option<String>,
    options: PoolOptions,
    factory: Option<Arc<dyn ItemFactory<Item = T>>>,
    preparation: Option<Arc<dyn PreparationStrategy<T>>>,
    metrics: Option<Arc<dyn MetricsSink>>,
}

impl<T: Send + Sync + 'static> Default for PoolBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + Sync + 'static> PoolBuilder<T> {
    /// Create an empty builder with default options.
    #[must_use]
    pub fn new() -> Self {
        Self {
            name: None,
            options: PoolOptions::default(),
            factory: None,
            preparation: None,
            metrics: None,
        }
    }

    /// Override the pool name (defaults to the item type name).
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the pool options.
    #[must_use]
    pub fn options(mut self, options: PoolOptions) -> Self {
        self.options = options;
        self
    }

    /// Set the item factory.
    #[must_use]
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: ItemFactory<Item = T> + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Install the [`DefaultFactory`], producing `T::default()`.
    #[must_use]
    pub fn default_factory(mut self) -> Self
    where
        T: Default,
    {
        self.options.use_default_factory = true;
        self.factory = Some(Arc::new(DefaultFactory::<T>::new()));
        self
    }

    /// Set the preparation strategy.
    #[must_use]
    pub fn preparation<P>(mut self, strategy: P) -> Self
    where
        P: PreparationStrategy<T> + 'static,
    {
        self.preparation = Some(Arc::new(strategy));
        self
    }

    /// Install the no-op preparation strategy.
    #[must_use]
    pub fn default_preparation(mut self) -> Self {
        self.options.use_default_preparation_strategy = true;
        self.preparation = Some(Arc::new(NoopPreparation));
        self
    }

    /// Set the metrics sink.
    #[must_use]
    pub fn metrics<M>(mut self, sink: M) -> Self
    where
        M: MetricsSink + 'static,
    {
        self.metrics = Some(Arc::new(sink));
        self
    }

    /// Validate the options, wire the collaborators, register the gauge
    /// samplers, and pre-create `min_size` instances.
    ///
    /// # Errors
    /// Configuration errors from [`PoolOptions::validate`] or a missing
    /// factory; factory errors from the warmup.
    pub fn build(self) -> Result<Pool<T>> {
        self.options.validate()?;
        let name = self
            .name
            .unwrap_or_else(|| derive_pool_name::<T>());
        let Some(factory) = self.factory else {
            return Err(Error::configuration(
                "no item factory configured; set one with factory() or default_factory()",
            ));
        };
        let preparation = match self.preparation {
            Some(strategy) => Some(strategy),
            None if self.options.use_default_preparation_strategy => {
                Some(Arc::new(NoopPreparation) as Arc<dyn PreparationStrategy<T>>)
            }
            None => None,
        };
        let metrics = self
            .metrics
            .unwrap_or_else(|| Arc::new(NoopSink));

        let inner = Arc::new(PoolInner {
            name,
            options: self.options,
            factory,
            preparation,
            metrics,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                waiters: VecDeque::new(),
                allocated: 0,
                disposed: false,
            }),
        });
        register_observers(&inner);

        // Warmup: pre-create min_size instances into the idle store.
        for _ in 0..inner.options.min_size {
            let item = inner.factory.create()?;
            let mut state = inner.state.lock();
            state.idle.push_back(IdleEntry::new(item));
            state.allocated += 1;
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(
            pool = %inner.name,
            min_size = inner.options.min_size,
            max_size = inner.options.max_size,
            "created pool"
        );

        Ok(Pool { inner })
    }
}

impl<T: Send + Sync + 'static> std::fmt::Debug for PoolBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolBuilder")
            .field("name", &self.name)
            .field("options", &self.options)
            .field("factory", &self.factory.is_some())
            .field("preparation", &self.preparation.is_some())
            .field("metrics", &self.metrics.is_some())
            .finish()
    }
}

/// Pool name derived from the item type name (last path segment).
fn derive_pool_name<T>() -> String {
    let full = std::any::type_name::<T>();
    full.rsplit("::").next().unwrap_or(full).to_ascii_lowercase()
}

/// Register one sampler per observable on the sink. Samplers hold a weak
/// reference so a dropped pool reads as zero instead of keeping the state
/// alive.
fn register_observers<T: Send + Sync + 'static>(inner: &Arc<PoolInner<T>>) {
    fn sampler<T, F>(inner: &Arc<PoolInner<T>>, read: F) -> Sampler
    where
        T: Send + Sync + 'static,
        F: Fn(&PoolState<T>) -> f64 + Send + Sync + 'static,
    {
        let weak: Weak<PoolInner<T>> = Arc::downgrade(inner);
        Box::new(move || weak.upgrade().map_or(0.0, |inner| read(&inner.state.lock())))
    }

    let metrics = &inner.metrics;
    metrics.register_items_allocated_observer(sampler(inner, |s| s.allocated as f64));
    metrics.register_items_available_observer(sampler(inner, |s| s.idle.len() as f64));
    metrics.register_active_leases_observer(sampler(inner, |s| s.active() as f64));
    metrics.register_queued_leases_observer(sampler(inner, |s| s.live_waiters() as f64));
    metrics.register_utilization_rate_observer(sampler(inner, |s| {
        if s.allocated == 0 {
            0.0
        } else {
            s.active() as f64 / s.allocated as f64
        }
    }));
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
