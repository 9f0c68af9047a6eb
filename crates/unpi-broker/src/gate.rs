//! Single-writer gate.
//!
//! All outbound frames funnel through one writer task that owns the write half
//! of the stream. A frame handed to the task is written and flushed in full
//! before the next one starts, even if the caller stops waiting halfway. Only
//! shutdown abandons a write in progress, so a stalled stream cannot keep the
//! task alive.
//!
//! ```text
//! async_request ─┐
//! sync_request  ─┼─► mpsc::Sender<WriteJob> ─► writer task ─► stream
//! sync_request  ─┘
//! ```

use std::io::ErrorKind;

use tokio::io::AsyncWrite;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use unpi_frame::{Frame, FrameError, FrameWriter};

use crate::error::{BrokerError, Result};

/// Frames queued ahead of the writer before `send` waits.
const WRITE_QUEUE_DEPTH: usize = 32;

struct WriteJob {
    frame: Frame,
    done: oneshot::Sender<Result<()>>,
}

/// Handle serializing frame writes onto the stream.
#[derive(Clone)]
pub struct WriteGate {
    tx: mpsc::Sender<WriteJob>,
}

impl WriteGate {
    /// Spawn the writer task for `writer`.
    ///
    /// The task exits when `shutdown` fires or every gate handle is dropped.
    /// Must be called within a Tokio runtime.
    pub fn spawn<W>(writer: W, shutdown: CancellationToken) -> (Self, JoinHandle<()>)
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE_DEPTH);
        let task = tokio::spawn(run_writer(FrameWriter::new(writer), rx, shutdown));
        (Self { tx }, task)
    }

    /// Write one frame as an atomic unit.
    ///
    /// Stream errors come back as [`BrokerError::WriteFailed`] carrying the
    /// original I/O error. Nothing is retried here.
    pub async fn send(&self, frame: Frame) -> Result<()> {
        let (done, result) = oneshot::channel();
        self.tx
            .send(WriteJob { frame, done })
            .await
            .map_err(|_| BrokerError::Terminated)?;
        result.await.map_err(|_| BrokerError::Terminated)?
    }
}

async fn run_writer<W>(
    mut writer: FrameWriter<W>,
    mut rx: mpsc::Receiver<WriteJob>,
    shutdown: CancellationToken,
) where
    W: AsyncWrite + Unpin,
{
    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            job = rx.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let WriteJob { frame, done } = job;
        let result = tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("shutdown abandoned an in-flight write");
                let _ = done.send(Err(BrokerError::Terminated));
                break;
            }
            result = writer.write_frame(&frame) => result.map_err(write_error),
        };
        match &result {
            Ok(()) => debug!(
                kind = %frame.kind,
                subsystem = %frame.subsystem,
                command_id = frame.command_id,
                len = frame.payload.len(),
                "frame written"
            ),
            Err(err) => debug!(error = %err, "frame write failed"),
        }
        let _ = done.send(result);
    }

    debug!("write gate closed");
}

fn write_error(err: FrameError) -> BrokerError {
    match err {
        FrameError::Io(io) => BrokerError::WriteFailed(io),
        FrameError::ConnectionClosed => {
            BrokerError::WriteFailed(std::io::Error::from(ErrorKind::WriteZero))
        }
        other => BrokerError::InvalidFrame(other),
    }
}
