//! Pending-call table.
//!
//! The protocol carries no transaction id, so a synchronous response is
//! matched to its request by `(subsystem, command id)` alone. At most one call
//! per key may be outstanding; a second registration is rejected.
//!
//! Every entry leaves the table exactly once: fulfilled by the reader loop,
//! removed by its [`Waiter`] being dropped (cancellation, timeout, write
//! failure), or completed with `Terminated` when the table closes. All three
//! paths remove the entry under the same mutex, so whichever runs first wins.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, trace};
use unpi_frame::{Frame, Subsystem};

use crate::error::{BrokerError, Result};

/// Key used to match a synchronous response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    pub subsystem: Subsystem,
    pub command_id: u8,
}

impl CorrelationKey {
    pub fn new(subsystem: Subsystem, command_id: u8) -> Self {
        Self {
            subsystem,
            command_id,
        }
    }

    /// The key a frame would be correlated under.
    pub fn of(frame: &Frame) -> Self {
        Self::new(frame.subsystem, frame.command_id)
    }
}

impl fmt::Display for CorrelationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:#04x}", self.subsystem, self.command_id)
    }
}

struct PendingCall {
    id: u64,
    slot: oneshot::Sender<Result<Frame>>,
    created_at: Instant,
}

#[derive(Default)]
struct Table {
    calls: HashMap<CorrelationKey, PendingCall>,
    next_id: u64,
    closed: bool,
}

/// Outstanding synchronous calls keyed by correlation key.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<Table>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Table> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `key`.
    ///
    /// Fails with `DuplicatePending` while another call on the same key is
    /// outstanding, and with `Terminated` once the table is closed.
    pub fn register(self: &Arc<Self>, key: CorrelationKey) -> Result<Waiter> {
        let mut table = self.lock();
        if table.closed {
            return Err(BrokerError::Terminated);
        }
        if table.calls.contains_key(&key) {
            return Err(BrokerError::DuplicatePending {
                subsystem: key.subsystem,
                command_id: key.command_id,
            });
        }

        let id = table.next_id;
        table.next_id = table.next_id.wrapping_add(1);
        let (slot, rx) = oneshot::channel();
        table.calls.insert(
            key,
            PendingCall {
                id,
                slot,
                created_at: Instant::now(),
            },
        );
        trace!(%key, id, "pending call registered");

        Ok(Waiter {
            key,
            id,
            table: Arc::clone(self),
            rx,
        })
    }

    /// Complete the call waiting on the frame's key.
    ///
    /// Returns `false` when nobody is waiting (no request issued, or it already
    /// gave up). The frame is dropped in that case.
    pub fn fulfill(&self, frame: Frame) -> bool {
        let key = CorrelationKey::of(&frame);
        let Some(call) = self.lock().calls.remove(&key) else {
            return false;
        };
        debug!(%key, elapsed = ?call.created_at.elapsed(), "pending call fulfilled");
        call.slot.send(Ok(frame)).is_ok()
    }

    /// Remove the entry registered as `id`, leaving newer registrations alone.
    fn cancel(&self, key: CorrelationKey, id: u64) -> bool {
        let mut table = self.lock();
        match table.calls.get(&key) {
            Some(call) if call.id == id => {
                if let Some(call) = table.calls.remove(&key) {
                    trace!(%key, id, elapsed = ?call.created_at.elapsed(), "pending call cancelled");
                }
                true
            }
            _ => false,
        }
    }

    /// Refuse new registrations and release every waiter with `Terminated`.
    ///
    /// Returns the number of released waiters, or `None` if the table was
    /// already closed.
    pub fn close(&self) -> Option<usize> {
        let drained: Vec<PendingCall> = {
            let mut table = self.lock();
            if table.closed {
                return None;
            }
            table.closed = true;
            table.calls.drain().map(|(_, call)| call).collect()
        };
        let released = drained.len();
        for call in drained {
            let _ = call.slot.send(Err(BrokerError::Terminated));
        }
        Some(released)
    }

    /// Number of outstanding calls.
    pub fn len(&self) -> usize {
        self.lock().calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` has an outstanding call.
    pub fn contains(&self, key: CorrelationKey) -> bool {
        self.lock().calls.contains_key(&key)
    }
}

/// The caller's side of a pending call.
///
/// Dropping the waiter before it completes removes its entry from the table.
pub struct Waiter {
    key: CorrelationKey,
    id: u64,
    table: Arc<PendingCalls>,
    rx: oneshot::Receiver<Result<Frame>>,
}

impl Waiter {
    /// Correlation key this waiter is registered under.
    pub fn key(&self) -> CorrelationKey {
        self.key
    }

    /// Wait for the response. Cancel-safe.
    pub async fn wait(&mut self) -> Result<Frame> {
        match (&mut self.rx).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Terminated),
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.table.cancel(self.key, self.id);
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;
    use unpi_frame::MessageKind;

    use super::*;

    fn srsp(subsystem: Subsystem, command_id: u8) -> Frame {
        Frame::new(MessageKind::SyncResponse, subsystem, command_id, Bytes::new())
    }

    #[tokio::test]
    async fn fulfill_completes_waiter_and_removes_entry() {
        let table = Arc::new(PendingCalls::new());
        let key = CorrelationKey::new(Subsystem::ZDO, 1);
        let mut waiter = table.register(key).unwrap();
        assert!(table.contains(key));

        assert!(table.fulfill(srsp(Subsystem::ZDO, 1)));
        assert!(table.is_empty());
        assert_eq!(waiter.wait().await.unwrap(), srsp(Subsystem::ZDO, 1));
    }

    #[test]
    fn fulfill_without_waiter_is_dropped() {
        let table = PendingCalls::new();
        assert!(!table.fulfill(srsp(Subsystem::SYS, 2)));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = Arc::new(PendingCalls::new());
        let key = CorrelationKey::new(Subsystem::SYS, 2);
        let _first = table.register(key).unwrap();

        let err = table.register(key).err().unwrap();
        assert!(matches!(
            err,
            BrokerError::DuplicatePending {
                subsystem: Subsystem::SYS,
                command_id: 2
            }
        ));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn dropping_waiter_removes_entry() {
        let table = Arc::new(PendingCalls::new());
        let key = CorrelationKey::new(Subsystem::AF, 9);
        let waiter = table.register(key).unwrap();
        drop(waiter);

        assert!(table.is_empty());
        assert!(!table.fulfill(srsp(Subsystem::AF, 9)));
        assert!(table.register(key).is_ok());
    }

    #[test]
    fn stale_waiter_does_not_remove_newer_registration() {
        let table = Arc::new(PendingCalls::new());
        let key = CorrelationKey::new(Subsystem::UTIL, 3);
        let first = table.register(key).unwrap();
        assert!(table.fulfill(srsp(Subsystem::UTIL, 3)));

        let _second = table.register(key).unwrap();
        drop(first);

        assert!(table.contains(key));
    }

    #[tokio::test]
    async fn close_releases_waiters_with_terminated() {
        let table = Arc::new(PendingCalls::new());
        let mut a = table.register(CorrelationKey::new(Subsystem::SYS, 1)).unwrap();
        let mut b = table.register(CorrelationKey::new(Subsystem::ZDO, 1)).unwrap();

        assert_eq!(table.close(), Some(2));
        assert_eq!(table.close(), None);

        assert!(matches!(a.wait().await, Err(BrokerError::Terminated)));
        assert!(matches!(b.wait().await, Err(BrokerError::Terminated)));
        assert!(matches!(
            table.register(CorrelationKey::new(Subsystem::SYS, 1)),
            Err(BrokerError::Terminated)
        ));
    }

    #[tokio::test]
    async fn fulfill_after_close_finds_nothing() {
        let table = Arc::new(PendingCalls::new());
        let mut waiter = table
            .register(CorrelationKey::new(Subsystem::SAPI, 6))
            .unwrap();
        table.close();

        assert!(!table.fulfill(srsp(Subsystem::SAPI, 6)));
        assert!(matches!(waiter.wait().await, Err(BrokerError::Terminated)));
    }
}
