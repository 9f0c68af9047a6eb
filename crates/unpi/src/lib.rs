//! UNPI transport for radio coprocessors.
//!
//! # Crate Structure
//!
//! - [`frame`]: Frame model and the UNPI wire codec
//! - [`broker`]: Request/response correlation and event dispatch over one link

/// Re-export frame types.
pub mod frame {
    pub use unpi_frame::*;
}

/// Re-export broker types.
pub mod broker {
    pub use unpi_broker::*;
}

pub use unpi_broker::{Broker, BrokerConfig, BrokerError, CancellationToken, RequestResponder};
pub use unpi_frame::{Frame, MessageKind, Subsystem};
