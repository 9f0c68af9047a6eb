//! Output queues fed by the reader loop.
//!
//! The reader loop fans every incoming frame out to two independent queues:
//! unsolicited frames go to the event queue, and every frame goes to the raw
//! queue behind `Broker::receive`. Recoverable decode errors go to both. A
//! frame that arrives before anyone asks for it is kept.
//!
//! The event queue is unbounded. The raw queue has a capacity and drops its
//! oldest item when full, so a broker whose raw side is never read holds at
//! most that many frames.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::{BrokerError, Result};

struct Shared<T> {
    state: Mutex<State<T>>,
    notify: Notify,
}

struct State<T> {
    items: VecDeque<T>,
    closed: bool,
    overflowing: bool,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn recv(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.lock();
                if let Some(item) = state.items.pop_front() {
                    state.overflowing = false;
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }
}

/// Producer side, owned by the reader loop. Dropping it closes the queue.
pub(crate) struct QueueSender<T> {
    shared: Arc<Shared<T>>,
    capacity: Option<usize>,
    name: &'static str,
}

impl<T> QueueSender<T> {
    /// Append `item`, evicting the oldest item if the queue is full.
    pub(crate) fn push(&self, item: T) {
        {
            let mut state = self.shared.lock();
            if let Some(capacity) = self.capacity {
                if state.items.len() >= capacity {
                    state.items.pop_front();
                    if !state.overflowing {
                        state.overflowing = true;
                        warn!(queue = self.name, capacity, "queue full, dropping oldest frames");
                    }
                }
            }
            state.items.push_back(item);
        }
        self.shared.notify.notify_one();
    }
}

impl<T> Drop for QueueSender<T> {
    fn drop(&mut self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_one();
    }
}

/// Consumer side of a reader-loop queue.
///
/// Designed for one logical consumer. Concurrent callers are served one at a
/// time in lock order.
pub struct FrameQueue<T> {
    shared: Arc<Shared<T>>,
    turn: tokio::sync::Mutex<()>,
}

/// Create a queue and the sender the reader loop pushes into.
///
/// `capacity` of `None` means unbounded.
pub(crate) fn frame_queue<T>(
    name: &'static str,
    capacity: Option<usize>,
) -> (QueueSender<T>, FrameQueue<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(State {
            items: VecDeque::new(),
            closed: false,
            overflowing: false,
        }),
        notify: Notify::new(),
    });
    let sender = QueueSender {
        shared: Arc::clone(&shared),
        capacity: capacity.map(|capacity| capacity.max(1)),
        name,
    };
    let queue = FrameQueue {
        shared,
        turn: tokio::sync::Mutex::new(()),
    };
    (sender, queue)
}

impl<T> FrameQueue<T> {
    /// Wait for the next item.
    ///
    /// Returns `Cancelled` if `cancel` fires first, `TimedOut` if `timeout`
    /// elapses first, and `Terminated` once the producer is gone and the
    /// queue is drained.
    pub async fn next(
        &self,
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<T> {
        let recv = async {
            let _turn = self.turn.lock().await;
            self.shared.recv().await
        };

        tokio::select! {
            biased;
            item = recv => item.ok_or(BrokerError::Terminated),
            _ = cancelled(cancel) => Err(BrokerError::Cancelled),
            _ = expired(timeout) => Err(BrokerError::TimedOut(timeout.unwrap_or_default())),
        }
    }

    /// Number of items waiting to be consumed.
    pub fn len(&self) -> usize {
        self.shared.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves when `token` is cancelled; never resolves without a token.
pub(crate) fn cancelled(token: Option<&CancellationToken>) -> impl Future<Output = ()> + Send + '_ {
    async move {
        match token {
            Some(token) => token.cancelled().await,
            None => std::future::pending().await,
        }
    }
}

/// Resolves after `timeout`; never resolves without one.
pub(crate) fn expired(timeout: Option<Duration>) -> impl Future<Output = ()> + Send {
    async move {
        match timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn items_queued_before_the_call_are_delivered_in_order() {
        let (tx, queue) = frame_queue::<u8>("test", None);
        tx.push(1);
        tx.push(2);

        assert_eq!(queue.next(None, None).await.unwrap(), 1);
        assert_eq!(queue.next(None, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn waiter_is_woken_by_later_push() {
        let (tx, queue) = frame_queue::<u8>("test", None);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            tx.push(9);
            tx
        });

        assert_eq!(queue.next(None, None).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn cancellation_unblocks_waiter() {
        let (_tx, queue) = frame_queue::<u8>("test", None);
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move { trigger.cancel() });

        assert!(matches!(
            queue.next(Some(&token), None).await,
            Err(BrokerError::Cancelled)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_unblocks_waiter() {
        let (_tx, queue) = frame_queue::<u8>("test", None);
        let err = queue
            .next(None, Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TimedOut(d) if d == Duration::from_millis(50)));
    }

    #[tokio::test]
    async fn closed_queue_drains_then_terminates() {
        let (tx, queue) = frame_queue::<u8>("test", None);
        tx.push(7);
        drop(tx);

        assert_eq!(queue.next(None, None).await.unwrap(), 7);
        assert!(matches!(
            queue.next(None, None).await,
            Err(BrokerError::Terminated)
        ));
    }

    #[tokio::test]
    async fn closing_wakes_a_parked_waiter() {
        let (tx, queue) = frame_queue::<u8>("test", None);
        tokio::spawn(async move {
            tokio::task::yield_now().await;
            drop(tx);
        });

        assert!(matches!(
            queue.next(None, None).await,
            Err(BrokerError::Terminated)
        ));
    }

    #[tokio::test]
    async fn item_wins_over_already_cancelled_token() {
        let (tx, queue) = frame_queue::<u8>("test", None);
        tx.push(3);
        let token = CancellationToken::new();
        token.cancel();

        assert_eq!(queue.next(Some(&token), None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn bounded_queue_keeps_newest_items() {
        let (tx, queue) = frame_queue::<u32>("test", Some(3));
        for i in 0..10 {
            tx.push(i);
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.next(None, None).await.unwrap(), 7);
        assert_eq!(queue.next(None, None).await.unwrap(), 8);
        assert_eq!(queue.next(None, None).await.unwrap(), 9);
        assert!(queue.is_empty());
    }
}
