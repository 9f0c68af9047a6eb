//! Request/response correlation over a UNPI byte stream.
//!
//! A [`Broker`] owns one full-duplex link to a radio coprocessor and lets
//! many tasks share it:
//!
//! - [`Broker::async_request`] writes an AREQ and returns once it is on the wire.
//! - [`Broker::sync_request`] writes an SREQ and waits for the SRSP carrying
//!   the same subsystem and command id.
//! - [`Broker::read_event`] yields unsolicited frames (AREQ from the device).
//! - [`Broker::receive`] yields every incoming frame and decode error, in
//!   arrival order.
//!
//! Writes go through a single writer task so frames never interleave. A
//! single reader task decodes the incoming stream and routes each frame.
//!
//! # Crate Structure
//!
//! - [`broker`]: The broker handle and its lifecycle
//! - [`gate`]: Single-writer gate
//! - [`pending`]: Pending-call table keyed by `(subsystem, command id)`
//! - [`dispatch`]: Event and raw queues fed by the reader loop
//! - [`responder`]: Timeout/retry façade and typed-command traits
//! - [`testing`]: `MockAdapter` (behind the `testing` feature)

pub mod broker;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod pending;
mod reader;
pub mod responder;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use broker::Broker;
pub use config::{
    BrokerConfig, RetryPolicy, DEFAULT_RAW_CAPACITY, DEFAULT_RETRIES, DEFAULT_TIMEOUT,
};
pub use dispatch::FrameQueue;
pub use error::{BrokerError, CommandError, Result};
pub use gate::WriteGate;
pub use pending::{CorrelationKey, PendingCalls, Waiter};
pub use responder::{
    sync_request_frame, Command, DecodeCommand, EncodeCommand, RequestResponder, SyncRequester,
};
#[cfg(any(test, feature = "testing"))]
pub use testing::{MockAdapter, MockCall};

pub use tokio_util::sync::CancellationToken;
pub use unpi_frame::{Frame, MessageKind, Subsystem};
