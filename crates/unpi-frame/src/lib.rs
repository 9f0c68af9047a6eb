//! UNPI frame model and wire codec.
//!
//! Every frame on the wire is laid out as:
//! - A start-of-frame byte (`0xFE`)
//! - A 1-byte payload length (0..=250)
//! - A 1-byte command header combining message kind and subsystem
//! - A 1-byte command id
//! - The payload
//! - A 1-byte XOR checksum
//!
//! There is no transaction id. Correlating responses is left to the broker.

pub mod codec;
pub mod error;
pub mod kind;
pub mod reader;
pub mod subsystem;
pub mod writer;

pub use codec::{decode_frame, encode_frame, Frame, HEADER_SIZE, MAX_PAYLOAD, SOF, TRAILER_SIZE};
pub use error::{FrameError, Result};
pub use kind::MessageKind;
pub use reader::FrameReader;
pub use subsystem::Subsystem;
pub use writer::FrameWriter;
