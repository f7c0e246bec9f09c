//! Fixed-header test frames for load-testing data-acquisition pipelines.
//!
//! Every frame is laid out as:
//! - A 4-byte big-endian total length (including itself)
//! - A 32-byte header: header length, sequence number, body pattern,
//!   random-body checksum, last-message flag
//! - A 4-byte body length followed by the pattern-filled body
//!
//! A bare 4-byte unit holding the value 4 is the stop sentinel.

pub mod codec;
pub mod compare;
pub mod error;
pub mod pattern;

pub use codec::{
    body, body_length, body_mut, build_frame, checksum, create_frame, fill_body, fill_header,
    frame_length, header_length, is_last_message, is_stop, pattern_type, required_capacity,
    sequence_number, set_last_flag, set_not_last_flag, set_sequence_number, stop_unit,
    FrameHeader, DEFAULT_BUFFER_CAPACITY, HEADER_LEN, INT_LEN, MIN_FRAME_LEN, STOP_LEN,
};
pub use compare::{compare_bodies, compare_frames, compare_headers, verify_body, Comparison, Verification};
pub use error::{FrameError, Result};
pub use pattern::Pattern;
