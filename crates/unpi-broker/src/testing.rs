//! Test double for code built on [`SyncRequester`].
//!
//! ```ignore
//! let mock = MockAdapter::new();
//! let call = mock
//!     .on(MessageKind::SyncRequest, Subsystem::SYS, 0x02)
//!     .returns(version_reply)
//!     .times(2);
//! // ... exercise code holding `mock` ...
//! mock.assert_calls();
//! ```

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use unpi_frame::{Frame, MessageKind, Subsystem};

use crate::error::{BrokerError, Result};
use crate::responder::SyncRequester;

/// One expected request and its canned answer.
#[derive(Debug)]
pub struct MockCall {
    kind: MessageKind,
    subsystem: Subsystem,
    command_id: u8,
    state: Mutex<CallState>,
}

#[derive(Debug)]
struct CallState {
    response: Option<Frame>,
    times: usize,
    captured: Vec<Frame>,
}

impl MockCall {
    fn state(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn matches(&self, frame: &Frame) -> bool {
        self.kind == frame.kind
            && self.subsystem == frame.subsystem
            && self.command_id == frame.command_id
    }

    /// Answer matching requests with `response`.
    ///
    /// Without a response the call times out, like a silent device.
    pub fn returns(self: Arc<Self>, response: Frame) -> Arc<Self> {
        self.state().response = Some(response);
        self
    }

    /// Expect exactly `n` matching requests. Defaults to one.
    pub fn times(self: Arc<Self>, n: usize) -> Arc<Self> {
        self.state().times = n;
        self
    }

    /// Requests received so far, in order.
    pub fn captured(&self) -> Vec<Frame> {
        self.state().captured.clone()
    }
}

/// Stands in for a [`Broker`](crate::Broker) in unit tests.
///
/// Requests that match no registered call panic.
#[derive(Debug, Default)]
pub struct MockAdapter {
    calls: Mutex<Vec<Arc<MockCall>>>,
}

impl MockAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an expected request.
    pub fn on(&self, kind: MessageKind, subsystem: Subsystem, command_id: u8) -> Arc<MockCall> {
        let call = Arc::new(MockCall {
            kind,
            subsystem,
            command_id,
            state: Mutex::new(CallState {
                response: None,
                times: 1,
                captured: Vec::new(),
            }),
        });
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Arc::clone(&call));
        call
    }

    /// Panic unless every registered call was made the expected number of times.
    pub fn assert_calls(&self) {
        let calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
        for call in calls.iter() {
            let state = call.state();
            assert_eq!(
                state.captured.len(),
                state.times,
                "{} {}/{:#04x}: expected {} call(s), got {}",
                call.kind,
                call.subsystem,
                call.command_id,
                state.times,
                state.captured.len()
            );
        }
    }

    fn answer(&self, frame: Frame, timeout: Duration) -> Result<Frame> {
        if frame.kind != MessageKind::SyncRequest {
            return Err(BrokerError::NotSynchronous(frame.kind));
        }

        let call = self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|call| call.matches(&frame))
            .cloned();
        let Some(call) = call else {
            panic!(
                "unexpected request {} {}/{:#04x}",
                frame.kind, frame.subsystem, frame.command_id
            );
        };

        let mut state = call.state();
        state.captured.push(frame);
        state.response.clone().ok_or(BrokerError::TimedOut(timeout))
    }
}

impl SyncRequester for MockAdapter {
    fn sync_request_within(
        &self,
        frame: Frame,
        timeout: Duration,
        _cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Frame>> + Send {
        std::future::ready(self.answer(frame, timeout))
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    fn sreq(command_id: u8) -> Frame {
        Frame::new(MessageKind::SyncRequest, Subsystem::SYS, command_id, Bytes::new())
    }

    #[tokio::test]
    async fn returns_configured_response_and_records_request() {
        let mock = MockAdapter::new();
        let response = Frame::new(
            MessageKind::SyncResponse,
            Subsystem::SYS,
            0x02,
            Bytes::from_static(&[0x02, 0x00]),
        );
        let call = mock
            .on(MessageKind::SyncRequest, Subsystem::SYS, 0x02)
            .returns(response.clone());

        let got = mock
            .sync_request_within(sreq(0x02), Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(got, response);
        assert_eq!(call.captured(), vec![sreq(0x02)]);
        mock.assert_calls();
    }

    #[tokio::test]
    async fn missing_response_times_out() {
        let mock = MockAdapter::new();
        mock.on(MessageKind::SyncRequest, Subsystem::SYS, 0x01);

        let err = mock
            .sync_request_within(sreq(0x01), Duration::from_secs(2), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::TimedOut(d) if d == Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn rejects_asynchronous_frames() {
        let mock = MockAdapter::new();
        let frame = Frame::new(MessageKind::AsyncRequest, Subsystem::SYS, 0x00, Bytes::new());

        let err = mock
            .sync_request_within(frame, Duration::from_secs(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, BrokerError::NotSynchronous(MessageKind::AsyncRequest)));
    }

    #[test]
    #[should_panic(expected = "expected 2 call(s), got 0")]
    fn unmet_expectation_panics() {
        let mock = MockAdapter::new();
        mock.on(MessageKind::SyncRequest, Subsystem::SYS, 0x02).times(2);
        mock.assert_calls();
    }

    #[tokio::test]
    #[should_panic(expected = "unexpected request")]
    async fn unregistered_request_panics() {
        let mock = MockAdapter::new();
        let _ = mock
            .sync_request_within(sreq(0x09), Duration::from_secs(1), &CancellationToken::new())
            .await;
    }
}
