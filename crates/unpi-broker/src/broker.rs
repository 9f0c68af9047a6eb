use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use unpi_frame::{Frame, FrameReader, MessageKind};

use crate::config::BrokerConfig;
use crate::dispatch::{cancelled, expired, frame_queue, FrameQueue};
use crate::error::{BrokerError, Result};
use crate::gate::WriteGate;
use crate::pending::{CorrelationKey, PendingCalls};
use crate::reader::ReaderLoop;

/// Correlates requests and responses over one full-duplex byte stream.
///
/// Owns the write gate, the pending-call table, both output queues and the
/// reader loop. Created running; stopped by [`Broker::stop`] or drop.
pub struct Broker {
    gate: WriteGate,
    pending: Arc<PendingCalls>,
    events: FrameQueue<Result<Frame>>,
    raw: FrameQueue<Result<Frame>>,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Broker {
    /// Start a broker with default configuration.
    ///
    /// Must be called within a Tokio runtime.
    pub fn new<R, W>(reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        Self::with_config(reader, writer, BrokerConfig::default())
    }

    /// Start a broker with explicit configuration.
    ///
    /// Spawns the reader loop and the writer task. Must be called within a
    /// Tokio runtime.
    pub fn with_config<R, W>(reader: R, writer: W, config: BrokerConfig) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let shutdown = CancellationToken::new();
        let pending = Arc::new(PendingCalls::new());
        let (events_tx, events) = frame_queue("events", None);
        let (raw_tx, raw) = frame_queue("raw", Some(config.raw_capacity));

        let (gate, writer_task) = WriteGate::spawn(writer, shutdown.clone());
        let reader_loop = ReaderLoop {
            frames: FrameReader::with_capacity(reader, config.read_buffer_capacity),
            pending: Arc::clone(&pending),
            events: events_tx,
            raw: config.passthrough.then_some(raw_tx),
            shutdown: shutdown.clone(),
        };
        let reader_task = tokio::spawn(reader_loop.run());

        debug!(
            passthrough = config.passthrough,
            raw_capacity = config.raw_capacity,
            "broker started"
        );

        Self {
            gate,
            pending,
            events,
            raw,
            shutdown,
            tasks: Mutex::new(vec![reader_task, writer_task]),
        }
    }

    /// Send an AREQ frame without waiting for any answer.
    ///
    /// Fails with `NotAsynchronous` for any other kind, without writing.
    pub async fn async_request(&self, frame: &Frame) -> Result<()> {
        if frame.kind != MessageKind::AsyncRequest {
            return Err(BrokerError::NotAsynchronous(frame.kind));
        }
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::Terminated);
        }
        self.gate.send(frame.clone()).await
    }

    /// Send an SREQ frame and wait for the SRSP with the same key.
    ///
    /// Fails with `NotSynchronous` for any other kind, without writing. A
    /// write failure is returned as-is without waiting. Otherwise waits until
    /// the response arrives, `cancel` fires (`Cancelled`), or the broker stops
    /// (`Terminated`).
    pub async fn sync_request(&self, frame: Frame, cancel: &CancellationToken) -> Result<Frame> {
        self.exchange(frame, Some(cancel), None).await
    }

    /// Like [`Broker::sync_request`], bounded by `timeout` (`TimedOut`).
    pub async fn sync_request_timeout(&self, frame: Frame, timeout: Duration) -> Result<Frame> {
        self.exchange(frame, None, Some(timeout)).await
    }

    pub(crate) async fn exchange(
        &self,
        frame: Frame,
        cancel: Option<&CancellationToken>,
        timeout: Option<Duration>,
    ) -> Result<Frame> {
        if frame.kind != MessageKind::SyncRequest {
            return Err(BrokerError::NotSynchronous(frame.kind));
        }
        if self.shutdown.is_cancelled() {
            return Err(BrokerError::Terminated);
        }

        // Register before writing so a fast response cannot overtake us.
        let mut waiter = self.pending.register(CorrelationKey::of(&frame))?;
        let round_trip = async {
            self.gate.send(frame).await?;
            waiter.wait().await
        };

        let result = tokio::select! {
            biased;
            result = round_trip => result,
            _ = self.shutdown.cancelled() => Err(BrokerError::Terminated),
            _ = cancelled(cancel) => Err(BrokerError::Cancelled),
            _ = expired(timeout) => Err(BrokerError::TimedOut(timeout.unwrap_or_default())),
        };
        result
    }

    /// Next incoming frame of any kind, in arrival order.
    ///
    /// Recoverable decode failures surface here as `DecodeFailed`. Holds at
    /// most `BrokerConfig::raw_capacity` unread items; older ones are dropped.
    /// Returns `Terminated` once the broker stopped and the queue is drained,
    /// or immediately when passthrough is disabled.
    pub async fn receive(&self) -> Result<Frame> {
        self.raw.next(None, None).await?
    }

    /// Next unsolicited frame (anything but SRSP), or `Cancelled`.
    ///
    /// Recoverable decode failures surface here as `DecodeFailed`; later
    /// calls keep returning frames.
    pub async fn read_event(&self, cancel: &CancellationToken) -> Result<Frame> {
        self.events.next(Some(cancel), None).await?
    }

    /// Next unsolicited frame, or `TimedOut`.
    pub async fn read_event_timeout(&self, timeout: Duration) -> Result<Frame> {
        self.events.next(None, Some(timeout)).await?
    }

    /// Stop the broker. Idempotent.
    ///
    /// Halts the reader loop and the writer task and releases every pending
    /// call with `Terminated`. Later requests fail with `Terminated`.
    pub fn stop(&self) {
        self.shutdown.cancel();
        if let Some(released) = self.pending.close() {
            info!(released, "broker stopped");
        }
    }

    /// Stop the broker and wait for its tasks to exit.
    pub async fn shutdown(&self) {
        self.stop();
        let tasks: Vec<JoinHandle<()>> = {
            let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
            tasks.drain(..).collect()
        };
        for task in tasks {
            if let Err(err) = task.await {
                debug!(error = %err, "broker task ended abnormally");
            }
        }
    }

    /// True until the broker is stopped or the incoming stream ends.
    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// Number of synchronous requests awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Broker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Broker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Broker")
            .field("running", &self.is_running())
            .field("pending_calls", &self.pending_calls())
            .finish()
    }
}
