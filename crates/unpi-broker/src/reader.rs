//! Reader loop: the only consumer of the incoming stream.

use std::sync::Arc;

use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use unpi_frame::{Frame, FrameError, FrameReader, MessageKind};

use crate::dispatch::QueueSender;
use crate::error::{BrokerError, Result};
use crate::pending::PendingCalls;

/// Decodes frames one at a time and routes them.
///
/// - SRSP frames complete the matching pending call, or are dropped as late.
/// - Every other kind goes to the event queue.
/// - Recoverable decode errors go to the event queue.
/// - When passthrough is enabled, every frame and every recoverable decode
///   error also goes to the raw queue, in arrival order.
pub(crate) struct ReaderLoop<R> {
    pub(crate) frames: FrameReader<R>,
    pub(crate) pending: Arc<PendingCalls>,
    pub(crate) events: QueueSender<Result<Frame>>,
    pub(crate) raw: Option<QueueSender<Result<Frame>>>,
    pub(crate) shutdown: CancellationToken,
}

impl<R: AsyncRead + Unpin> ReaderLoop<R> {
    /// Run until shutdown, EOF, or an I/O error.
    ///
    /// On exit the pending table is closed, the shutdown token is cancelled,
    /// and both queues close once their buffered items are consumed.
    pub(crate) async fn run(mut self) {
        debug!("reader loop started");

        loop {
            let next = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    debug!("reader loop stopping on shutdown");
                    break;
                }
                next = self.frames.read_frame() => next,
            };

            match next {
                Ok(frame) => self.route(frame),
                Err(FrameError::ConnectionClosed) => {
                    info!("incoming stream closed");
                    break;
                }
                Err(err) if err.is_fatal() => {
                    warn!(error = %err, "incoming stream failed");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "dropping malformed frame");
                    if self.raw.is_some() {
                        self.publish_raw(Err(BrokerError::DecodeFailed(err.clone())));
                    }
                    self.events.push(Err(BrokerError::DecodeFailed(err)));
                }
            }
        }

        if let Some(released) = self.pending.close() {
            if released > 0 {
                debug!(released, "released pending calls");
            }
        }
        self.shutdown.cancel();
        debug!("reader loop exited");
    }

    fn route(&self, frame: Frame) {
        trace!(
            kind = %frame.kind,
            subsystem = %frame.subsystem,
            command_id = frame.command_id,
            len = frame.payload.len(),
            "frame received"
        );

        if self.raw.is_some() {
            self.publish_raw(Ok(frame.clone()));
        }

        if frame.kind == MessageKind::SyncResponse {
            let (subsystem, command_id) = (frame.subsystem, frame.command_id);
            if !self.pending.fulfill(frame) {
                debug!(%subsystem, command_id, "dropping synchronous response with no waiter");
            }
        } else {
            self.events.push(Ok(frame));
        }
    }

    fn publish_raw(&self, item: Result<Frame>) {
        if let Some(raw) = &self.raw {
            raw.push(item);
        }
    }
}
