//! In-process unidirectional byte channel for length-prefixed frames.
//!
//! A [`ChannelEndpoint`] joins one producer to one consumer over a bounded
//! pipe. Units on the wire are either a complete frame, whose first four
//! big-endian bytes give its total length, or the 4-byte stop sentinel.
//!
//! [`UnitReader`] and [`UnitWriter`] carry the wire protocol and work over
//! any tokio byte stream, including files of length-prefixed records.

pub mod config;
pub mod endpoint;
pub mod error;
pub mod reader;
pub mod writer;

pub use config::{EndpointConfig, DEFAULT_MAX_FRAME_LEN, DEFAULT_PIPE_CAPACITY};
pub use endpoint::{ChannelEndpoint, ReadHandle, WriteHandle};
pub use error::{ChannelError, Result};
pub use reader::{Unit, UnitReader};
pub use writer::UnitWriter;
