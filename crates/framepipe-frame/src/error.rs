/// Errors that can occur while building or reading frames.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum FrameError {
    /// The buffer cannot hold what its own declared lengths require.
    #[error("frame capacity too small ({required} bytes required, {available} available)")]
    Capacity { required: usize, available: usize },

    /// A fixed-offset field lies past the end of the buffer.
    #[error("frame truncated (field at offset {offset} needs {needed} bytes, buffer has {len})")]
    Truncated {
        offset: usize,
        needed: usize,
        len: usize,
    },

    /// The pattern field holds a value outside the known pattern set.
    #[error("unknown body pattern {0}")]
    UnknownPattern(i32),

    /// A declared length field is negative or otherwise unusable.
    #[error("invalid {field} value {value}")]
    InvalidLength { field: &'static str, value: i32 },
}

pub type Result<T> = std::result::Result<T, FrameError>;
