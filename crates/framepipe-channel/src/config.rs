use serde::{Deserialize, Serialize};

use framepipe_frame::DEFAULT_BUFFER_CAPACITY;

/// Default maximum declared frame length: 16 MiB.
pub const DEFAULT_MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Default in-process pipe capacity: 64 KiB.
pub const DEFAULT_PIPE_CAPACITY: usize = 64 * 1024;

/// Channel endpoint configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Size of the reusable receive buffer. Larger frames get a one-off buffer.
    pub default_buffer_capacity: usize,
    /// Largest length prefix the reader or writer will accept.
    pub max_frame_len: usize,
    /// Bytes the pipe buffers before a writer waits for the reader.
    pub pipe_capacity: usize,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            default_buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            max_frame_len: DEFAULT_MAX_FRAME_LEN,
            pipe_capacity: DEFAULT_PIPE_CAPACITY,
        }
    }
}
