use std::time::Duration;

use unpi_frame::{FrameError, MessageKind, Subsystem};

/// Errors that can occur in broker operations.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A non-AREQ frame was passed to `async_request`.
    #[error("frame is not asynchronous ({0})")]
    NotAsynchronous(MessageKind),

    /// A non-SREQ frame was passed to `sync_request`.
    #[error("frame is not synchronous ({0})")]
    NotSynchronous(MessageKind),

    /// The outgoing frame could not be encoded; nothing was written.
    #[error("invalid frame: {0}")]
    InvalidFrame(#[source] FrameError),

    /// The stream write failed. The I/O error is carried unmodified.
    #[error("write failed: {0}")]
    WriteFailed(#[source] std::io::Error),

    /// The caller's cancellation token fired before a result arrived.
    #[error("request cancelled")]
    Cancelled,

    /// The caller's deadline passed before a result arrived.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    /// The broker stopped while the caller was waiting.
    #[error("broker terminated")]
    Terminated,

    /// Malformed bytes arrived on the stream.
    #[error("decode failed: {0}")]
    DecodeFailed(#[source] FrameError),

    /// A synchronous request with the same correlation key is still in flight.
    #[error("synchronous request already pending for {subsystem}/{command_id:#04x}")]
    DuplicatePending { subsystem: Subsystem, command_id: u8 },

    /// The response's correlation key does not match the typed command.
    #[error(
        "unexpected response {actual_subsystem}/{actual_command:#04x} (expected {expected_subsystem}/{expected_command:#04x})"
    )]
    UnexpectedResponse {
        expected_subsystem: Subsystem,
        expected_command: u8,
        actual_subsystem: Subsystem,
        actual_command: u8,
    },

    /// A typed command payload could not be encoded or decoded.
    #[error("command error: {0}")]
    Command(#[from] CommandError),
}

impl BrokerError {
    /// True when a fresh attempt of the same request may succeed.
    ///
    /// Only a missing or late response qualifies. Transport and validation
    /// failures are returned to the caller as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BrokerError::TimedOut(_))
    }
}

/// Errors raised by typed command encoders/decoders.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The payload is shorter than the command layout requires.
    #[error("payload too short ({len} bytes, need {need})")]
    Truncated { len: usize, need: usize },

    /// A field holds a value the command does not accept.
    #[error("invalid field {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
}

pub type Result<T> = std::result::Result<T, BrokerError>;
