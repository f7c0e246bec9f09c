use std::fmt;
use std::io;

use framepipe_channel::ChannelError;
use framepipe_frame::FrameError;
use framepipe_harness::{ConfigError, HarnessError};

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const CHANNEL_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const NOT_FOUND: i32 = 66;
pub const INTERRUPTED: i32 = 130;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: &io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::NotFound => NOT_FOUND,
        io::ErrorKind::UnexpectedEof | io::ErrorKind::InvalidData => DATA_INVALID,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn frame_error(context: &str, err: &FrameError) -> CliError {
    CliError::new(DATA_INVALID, format!("{context}: {err}"))
}

pub fn channel_error(context: &str, err: &ChannelError) -> CliError {
    match err {
        ChannelError::Io(source) => io_error(context, source),
        ChannelError::InvalidLength(_) | ChannelError::FrameTooLarge { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        ChannelError::Cancelled => CliError::new(INTERRUPTED, format!("{context}: {err}")),
        other => CliError::new(CHANNEL_ERROR, format!("{context}: {other}")),
    }
}

pub fn config_error(context: &str, err: &ConfigError) -> CliError {
    match err {
        ConfigError::Read { source, .. } => io_error(context, source),
        other => CliError::new(USAGE, format!("{context}: {other}")),
    }
}

pub fn harness_error(context: &str, err: &HarnessError) -> CliError {
    match err {
        HarnessError::Frame(err) => frame_error(context, err),
        HarnessError::Channel(err) => channel_error(context, err),
        HarnessError::Config(err) => config_error(context, err),
        HarnessError::Storage { source, .. } => {
            let mut mapped = io_error(context, source);
            mapped.message = format!("{context}: {err}");
            mapped
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
