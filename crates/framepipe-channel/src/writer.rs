use std::io::ErrorKind;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use framepipe_frame::{frame_length, stop_unit, INT_LEN};

use crate::config::EndpointConfig;
use crate::error::{ChannelError, Result};

/// Writes complete frames and the stop sentinel to any `AsyncWrite` stream.
pub struct UnitWriter<T> {
    inner: T,
    config: EndpointConfig,
}

impl<T: AsyncWrite + Unpin> UnitWriter<T> {
    /// Create a new unit writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, EndpointConfig::default())
    }

    /// Create a new unit writer with explicit configuration.
    pub fn with_config(inner: T, config: EndpointConfig) -> Self {
        Self { inner, config }
    }

    /// Send exactly the frame's declared total length.
    ///
    /// Bytes in `frame` past its total-length field are not sent.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        let declared = frame_length(frame)
            .map_err(|_| ChannelError::InvalidLength(frame.len() as i64))?;
        if declared < (2 * INT_LEN) as i32 || declared as usize > frame.len() {
            return Err(ChannelError::InvalidLength(declared.into()));
        }
        let len = declared as usize;
        if len > self.config.max_frame_len {
            return Err(ChannelError::FrameTooLarge {
                size: len,
                max: self.config.max_frame_len,
            });
        }

        self.write_bytes(&frame[..len]).await?;
        self.flush().await
    }

    /// Send the 4-byte stop sentinel.
    pub async fn send_stop(&mut self) -> Result<()> {
        self.write_bytes(&stop_unit()).await?;
        self.flush().await
    }

    async fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.write(&bytes[offset..]).await {
                Ok(0) => return Err(ChannelError::ConnectionClosed),
                Ok(n) => offset += n,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_closed(&err) => return Err(ChannelError::ConnectionClosed),
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }
        Ok(())
    }

    /// Flush the underlying stream.
    pub async fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush().await {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if is_closed(&err) => return Err(ChannelError::ConnectionClosed),
                Err(err) => return Err(ChannelError::Io(err)),
            }
        }
    }

    /// Shut down the write side so the reader sees end of stream.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.inner.shutdown().await.map_err(ChannelError::Io)
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &EndpointConfig {
        &self.config
    }
}

fn is_closed(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WriteZero | ErrorKind::BrokenPipe)
}
