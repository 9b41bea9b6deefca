//! Basic lease/release flow tests.
//!
//! Covers warmup, reuse, direct hand-off to a blocked lease, and the
//! no-leak accounting after matched lease/release pairs.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use leasepool::error::Result;
use leasepool::factory::ItemFactory;
use leasepool::options::PoolOptions;
use leasepool::pool::Pool;
use tokio_util::sync::CancellationToken;

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

struct CountingFactory {
    created: Arc<AtomicU32>,
}

impl CountingFactory {
    fn new() -> Self {
        Self {
            created: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl ItemFactory for CountingFactory {
    type Item = u32;

    fn create(&self) -> Result<u32> {
        Ok(self.created.fetch_add(1, Ordering::SeqCst))
    }
}

fn cancel() -> CancellationToken {
    CancellationToken::new()
}

// ---------------------------------------------------------------------------
// Warmup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn warmup_creates_min_size_instances() {
    let factory = CountingFactory::new();
    let created = factory.created.clone();
    let pool = Pool::new(
        factory,
        PoolOptions {
            min_size: 4,
            max_size: 8,
            ..Default::default()
        },
    )
    .unwrap();

    assert_eq!(created.load(Ordering::SeqCst), 4);
    assert_eq!(pool.allocated(), 4);
    assert_eq!(pool.available(), 4);
    assert_eq!(pool.active_leases(), 0);
}

// ---------------------------------------------------------------------------
// Reuse and accounting
// ---------------------------------------------------------------------------

#[tokio::test]
async fn released_instance_is_reused() {
    let factory = CountingFactory::new();
    let created = factory.created.clone();
    let pool = Pool::new(
        factory,
        PoolOptions {
            max_size: 4,
            ..Default::default()
        },
    )
    .unwrap();

    let a = pool.lease(&cancel()).await.unwrap();
    pool.release(a, &cancel()).await.unwrap();
    let b = pool.lease(&cancel()).await.unwrap();

    assert_eq!(b, a, "idle instance should be handed out again");
    assert_eq!(created.load(Ordering::SeqCst), 1, "no second create");
}

#[tokio::test]
async fn matched_pairs_leave_no_leases_behind() {
    let pool = Pool::new(
        CountingFactory::new(),
        PoolOptions {
            max_size: 3,
            ..Default::default()
        },
    )
    .unwrap();

    let mut held = Vec::new();
    for _ in 0..3 {
        held.push(pool.lease(&cancel()).await.unwrap());
    }
    assert_eq!(pool.active_leases(), 3);
    assert_eq!(pool.utilization_rate(), 1.0);

    for item in held {
        pool.release(item, &cancel()).await.unwrap();
    }

    assert_eq!(pool.active_leases(), 0);
    assert_eq!(pool.available(), pool.allocated());
    assert!(pool.allocated() <= 3);
    assert_eq!(pool.utilization_rate(), 0.0);
}

// ---------------------------------------------------------------------------
// Direct hand-off to a blocked lease
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn blocked_lease_receives_released_instance() {
    let pool = Pool::new(
        CountingFactory::new(),
        PoolOptions {
            min_size: 1,
            max_size: 1,
            ..Default::default()
        },
    )
    .unwrap();

    let a = pool.lease(&cancel()).await.unwrap();

    let waiter_pool = pool.clone();
    let waiter = tokio::spawn(async move {
        waiter_pool.lease(&CancellationToken::new()).await
    });

    // Let the second lease park in the waiter queue.
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(pool.queued_leases(), 1);
    assert_eq!(pool.available(), 0);

    pool.release(a, &cancel()).await.unwrap();

    let b = waiter.await.unwrap().unwrap();
    assert_eq!(b, a, "the released instance goes straight to the waiter");
    assert_eq!(pool.active_leases(), 1);
    assert_eq!(pool.available(), 0);
    assert_eq!(pool.queued_leases(), 0);
}

#[tokio::test(start_paused = true)]
async fn release_with_no_waiters_parks_idle() {
    let pool = Pool::new(
        CountingFactory::new(),
        PoolOptions {
            max_size: 2,
            ..Default::default()
        },
    )
    .unwrap();

    let a = pool.lease(&cancel()).await.unwrap();
    pool.release(a, &cancel()).await.unwrap();

    assert_eq!(pool.available(), 1);
    assert_eq!(pool.active_leases(), 0);
    assert_eq!(pool.allocated(), 1);
}
