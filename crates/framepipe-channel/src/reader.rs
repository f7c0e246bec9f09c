use std::io::ErrorKind;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use framepipe_frame::{INT_LEN, STOP_LEN};

use crate::config::EndpointConfig;
use crate::error::{ChannelError, Result};

/// One unit read off the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit<'a> {
    /// A complete frame, length prefix included.
    Frame(&'a [u8]),
    /// The 4-byte stop sentinel.
    Stop,
}

/// Reads length-prefixed units from any `AsyncRead` stream.
///
/// Frames are assembled into a reusable buffer of
/// `default_buffer_capacity` bytes. A frame that does not fit gets a buffer
/// of exactly its declared length, used for that frame only.
pub struct UnitReader<T> {
    inner: T,
    buf: Vec<u8>,
    oversized: Vec<u8>,
    oversized_allocations: u64,
    config: EndpointConfig,
}

impl<T: AsyncRead + Unpin> UnitReader<T> {
    /// Create a new unit reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, EndpointConfig::default())
    }

    /// Create a new unit reader with explicit configuration.
    pub fn with_config(inner: T, config: EndpointConfig) -> Self {
        Self {
            inner,
            buf: vec![0u8; config.default_buffer_capacity],
            oversized: Vec::new(),
            oversized_allocations: 0,
            config,
        }
    }

    /// Read the next unit.
    ///
    /// Returns `Err(ChannelError::EndOfStream)` when the stream ends between
    /// units and `Err(ChannelError::ConnectionClosed)` when it ends inside one.
    pub async fn read_unit(&mut self) -> Result<Unit<'_>> {
        let mut prefix = [0u8; INT_LEN];
        match read_full(&mut self.inner, &mut prefix).await? {
            0 => return Err(ChannelError::EndOfStream),
            n if n < INT_LEN => return Err(ChannelError::ConnectionClosed),
            _ => {}
        }

        let declared = i32::from_be_bytes(prefix);
        if declared == STOP_LEN as i32 {
            return Ok(Unit::Stop);
        }
        if declared < STOP_LEN as i32 {
            return Err(ChannelError::InvalidLength(declared.into()));
        }
        let len = declared as usize;
        if len > self.config.max_frame_len {
            return Err(ChannelError::FrameTooLarge {
                size: len,
                max: self.config.max_frame_len,
            });
        }

        let Self {
            inner,
            buf,
            oversized,
            oversized_allocations,
            ..
        } = self;
        let target = if len > buf.len() {
            debug!(len, capacity = buf.len(), "allocating buffer for oversized frame");
            *oversized = vec![0u8; len];
            *oversized_allocations += 1;
            oversized
        } else {
            if !oversized.is_empty() {
                *oversized = Vec::new();
            }
            buf
        };

        target[..INT_LEN].copy_from_slice(&prefix);
        if read_full(inner, &mut target[INT_LEN..len]).await? < len - INT_LEN {
            return Err(ChannelError::ConnectionClosed);
        }
        Ok(Unit::Frame(&target[..len]))
    }

    /// Read the next unit, giving up as soon as `cancel` fires.
    ///
    /// A unit interrupted by cancellation is lost; the reader should not be
    /// used again afterwards.
    pub async fn read_unit_cancellable(&mut self, cancel: &CancellationToken) -> Result<Unit<'_>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ChannelError::Cancelled),
            unit = self.read_unit() => unit,
        }
    }

    /// Number of frames that needed a buffer larger than the default.
    pub fn oversized_allocations(&self) -> u64 {
        self.oversized_allocations
    }

    /// Size of the reusable receive buffer.
    pub fn buffer_capacity(&self) -> usize {
        self.buf.len()
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }
}

/// Fill `dst` from `reader`, stopping early only at end of stream.
async fn read_full<R: AsyncRead + Unpin>(reader: &mut R, dst: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < dst.len() {
        match reader.read(&mut dst[filled..]).await {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(ChannelError::Io(err)),
        }
    }
    Ok(filled)
}
