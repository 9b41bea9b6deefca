//! Waiting-lease requests.
//!
//! When a lease finds no idle instance and the pool is at its maximum size,
//! it parks as a [`LeaseRequest`] in the waiter queue. The request is a
//! one-shot slot: the release side settles it with an instance via
//! [`try_fulfill`](LeaseRequest::try_fulfill), or the waiting side settles
//! it by giving up (lease timeout, caller cancellation, dispose). Whichever
//! fires first wins; the loser observes that the slot is already settled.

use std::time::Duration;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// Queue-side half of a waiting lease.
pub(crate) struct LeaseRequest<T> {
    tx: oneshot::Sender<T>,
}

/// Caller-side half: awaits fulfillment, bounded by the lease timeout and
/// the caller's cancellation token.
pub(crate) struct LeaseWait<T> {
    rx: oneshot::Receiver<T>,
    timeout: Option<Duration>,
    cancel: CancellationToken,
    pool: String,
}

/// Create a linked request/wait pair.
pub(crate) fn lease_request<T>(
    timeout: Option<Duration>,
    cancel: CancellationToken,
    pool: String,
) -> (LeaseRequest<T>, LeaseWait<T>) {
    let (tx, rx) = oneshot::channel();
    (
        LeaseRequest { tx },
        LeaseWait {
            rx,
            timeout,
            cancel,
            pool,
        },
    )
}

impl<T> LeaseRequest<T> {
    /// True once the waiting side has settled (timed out, cancelled, or
    /// dropped). A settled request can never be fulfilled; release uses
    /// this to purge dead entries without touching the instance.
    pub(crate) fn is_settled(&self) -> bool {
        self.tx.is_closed()
    }

    /// Atomically attempt to settle the request with `item`.
    ///
    /// Returns the item back if the waiting side settled first, so the
    /// caller can offer it to the next waiter or park it idle.
    pub(crate) fn try_fulfill(self, item: T) -> std::result::Result<(), T> {
        self.tx.send(item)
    }

    /// Settle the request with cancellation (used by dispose). The waiting
    /// side observes the closed channel and fails its lease.
    pub(crate) fn settle_cancelled(self) {
        drop(self.tx);
    }
}

impl<T> LeaseWait<T> {
    /// Await fulfillment.
    ///
    /// Resolves with the prepared instance, or with a cancellation error
    /// when the lease timeout elapses, the caller token fires, or the pool
    /// is disposed. Returning drops the receiver, which synchronously
    /// invalidates the queue slot.
    pub(crate) async fn wait(self) -> Result<T> {
        let LeaseWait {
            mut rx,
            timeout,
            cancel,
            pool,
        } = self;

        let deadline = async {
            match timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            settled = &mut rx => {
                settled.map_err(|_| Error::cancelled(&pool, "pool disposed while waiting"))
            }
            () = cancel.cancelled() => {
                Self::give_up(rx).ok_or_else(|| {
                    Error::cancelled(&pool, "caller cancelled while waiting")
                })
            }
            () = deadline => {
                Self::give_up(rx).ok_or_else(|| {
                    Error::cancelled(&pool, "lease timeout elapsed")
                })
            }
        }
    }

    /// Settle the request from the waiting side.
    ///
    /// Closing the channel first makes the settlement atomic: any
    /// fulfillment that raced in before the close is consumed here (the
    /// delivery won, the caller gets the instance); anything after fails
    /// on the sender side, which keeps the instance with the release.
    fn give_up(mut rx: oneshot::Receiver<T>) -> Option<T> {
        rx.close();
        rx.try_recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(
        timeout: Option<Duration>,
        cancel: CancellationToken,
    ) -> (LeaseRequest<u32>, LeaseWait<u32>) {
        lease_request(timeout, cancel, "test".to_string())
    }

    #[tokio::test]
    async fn fulfillment_resolves_wait() {
        let (request, wait) = pair(None, CancellationToken::new());
        assert!(!request.is_settled());
        request.try_fulfill(7).unwrap();
        assert_eq!(wait.wait().await.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_settles_with_cancellation() {
        let (request, wait) = pair(Some(Duration::from_millis(10)), CancellationToken::new());
        let err = wait.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(request.is_settled());
    }

    #[tokio::test]
    async fn caller_cancellation_settles() {
        let token = CancellationToken::new();
        let (request, wait) = pair(None, token.clone());
        token.cancel();
        let err = wait.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
        assert!(request.is_settled());
    }

    #[tokio::test]
    async fn settled_request_rejects_fulfillment() {
        let (request, wait) = pair(None, CancellationToken::new());
        drop(wait);
        assert!(request.is_settled());
        // The instance comes back so release can keep scanning.
        assert_eq!(request.try_fulfill(9).unwrap_err(), 9);
    }

    #[tokio::test]
    async fn dispose_settles_with_cancellation() {
        let (request, wait) = pair(None, CancellationToken::new());
        request.settle_cancelled();
        let err = wait.wait().await.unwrap_err();
        assert!(matches!(err, Error::Cancelled { .. }));
    }
}
