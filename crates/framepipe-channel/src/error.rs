/// Errors that can occur while moving units over a channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// An I/O error occurred on the underlying byte stream.
    #[error("channel I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The stream ended between two units.
    #[error("end of stream")]
    EndOfStream,

    /// The stream ended before a complete unit was received.
    #[error("connection closed (incomplete unit)")]
    ConnectionClosed,

    /// A length prefix that no unit can carry.
    #[error("invalid unit length {0}")]
    InvalidLength(i64),

    /// A declared frame exceeds the configured maximum.
    #[error("frame too large ({size} bytes, max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// The read or write was abandoned because its token was cancelled.
    #[error("channel operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, ChannelError>;
