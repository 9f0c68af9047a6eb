//! Timeout/retry façade for typed synchronous commands.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unpi_frame::{Frame, MessageKind, Subsystem};

use crate::broker::Broker;
use crate::config::RetryPolicy;
use crate::error::{BrokerError, CommandError, Result};

/// Something that can perform one bounded SREQ/SRSP exchange.
pub trait SyncRequester: Send + Sync {
    /// Send `frame` and wait for its response for at most `timeout`, or until
    /// `cancel` fires.
    fn sync_request_within(
        &self,
        frame: Frame,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Frame>> + Send;
}

impl SyncRequester for Broker {
    fn sync_request_within(
        &self,
        frame: Frame,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Frame>> + Send {
        self.exchange(frame, Some(cancel), Some(timeout))
    }
}

impl<T: SyncRequester> SyncRequester for Arc<T> {
    fn sync_request_within(
        &self,
        frame: Frame,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> impl Future<Output = Result<Frame>> + Send {
        (**self).sync_request_within(frame, timeout, cancel)
    }
}

/// Identifies a command by its correlation key.
pub trait Command {
    const SUBSYSTEM: Subsystem;
    const COMMAND_ID: u8;
}

/// A command that can be written as a request payload.
pub trait EncodeCommand: Command {
    fn encode_payload(&self, dst: &mut BytesMut) -> std::result::Result<(), CommandError>;
}

/// A command that can be read back from a response payload.
pub trait DecodeCommand: Command + Sized {
    fn decode_payload(payload: &[u8]) -> std::result::Result<Self, CommandError>;
}

/// Build the SREQ frame for a typed command.
pub fn sync_request_frame<C: EncodeCommand>(command: &C) -> Result<Frame> {
    let mut payload = BytesMut::new();
    command.encode_payload(&mut payload)?;
    Ok(Frame::new(
        MessageKind::SyncRequest,
        C::SUBSYSTEM,
        C::COMMAND_ID,
        payload.freeze(),
    ))
}

/// Applies a [`RetryPolicy`] to synchronous exchanges.
///
/// Each attempt gets a fresh pending-call registration and a fresh deadline.
/// Only attempts that time out are retried. Write failures, validation
/// errors, termination and the caller's own cancellation end the call at once.
#[derive(Debug)]
pub struct RequestResponder<T> {
    requester: T,
    policy: RetryPolicy,
}

impl<T: SyncRequester> RequestResponder<T> {
    /// Wrap `requester` with the default policy (5s per attempt, 3 retries).
    pub fn new(requester: T) -> Self {
        Self::with_policy(requester, RetryPolicy::default())
    }

    pub fn with_policy(requester: T, policy: RetryPolicy) -> Self {
        Self { requester, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Borrow the wrapped requester.
    pub fn requester(&self) -> &T {
        &self.requester
    }

    /// Send a raw SREQ frame under the retry policy.
    pub async fn request_frame(&self, frame: Frame, cancel: &CancellationToken) -> Result<Frame> {
        let attempts = self.policy.attempts();
        let mut attempt = 1;
        loop {
            let result = self
                .requester
                .sync_request_within(frame.clone(), self.policy.timeout, cancel)
                .await;
            match result {
                Err(err) if err.is_retryable() && attempt < attempts && !cancel.is_cancelled() => {
                    debug!(
                        subsystem = %frame.subsystem,
                        command_id = frame.command_id,
                        attempt,
                        attempts,
                        "no response, retrying"
                    );
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Send a typed request and decode the typed response.
    ///
    /// The response must carry `Resp`'s subsystem and command id, otherwise
    /// `UnexpectedResponse` is returned.
    pub async fn request_response<Req, Resp>(
        &self,
        request: &Req,
        cancel: &CancellationToken,
    ) -> Result<Resp>
    where
        Req: EncodeCommand,
        Resp: DecodeCommand,
    {
        let frame = sync_request_frame(request)?;
        let response = self.request_frame(frame, cancel).await?;

        if response.subsystem != Resp::SUBSYSTEM || response.command_id != Resp::COMMAND_ID {
            return Err(BrokerError::UnexpectedResponse {
                expected_subsystem: Resp::SUBSYSTEM,
                expected_command: Resp::COMMAND_ID,
                actual_subsystem: response.subsystem,
                actual_command: response.command_id,
            });
        }

        Ok(Resp::decode_payload(&response.payload)?)
    }
}
