use std::path::PathBuf;

use framepipe_channel::ChannelError;
use framepipe_frame::FrameError;

use crate::config::ConfigError;

/// Errors that can occur while building or running producer/consumer pairs.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    /// A frame could not be built or read.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// The channel between a producer and its consumer failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// A descriptor or config file was rejected.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A payload file or sink file could not be read or written.
    #[error("storage error on {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A spawned task ended without returning a result.
    #[error("task {name} aborted: {message}")]
    TaskAborted { name: String, message: String },
}

impl HarnessError {
    pub(crate) fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        HarnessError::Storage {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
