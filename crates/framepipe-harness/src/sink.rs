//! Where a consumer puts the frames it receives.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::config::SinkKind;
use crate::error::{HarnessError, Result};

/// Appends raw frame bytes to a file through a write buffer.
pub struct FileSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl FileSink {
    /// Create (or truncate) the output file.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)
            .await
            .map_err(|err| HarnessError::storage(&path, err))?;
        debug!(path = %path.display(), "opened file sink");
        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn accept(&mut self, frame: &[u8]) -> Result<()> {
        self.writer
            .write_all(frame)
            .await
            .map_err(|err| HarnessError::storage(&self.path, err))
    }

    async fn finish(&mut self) -> Result<()> {
        self.writer
            .shutdown()
            .await
            .map_err(|err| HarnessError::storage(&self.path, err))
    }
}

/// Drops frames, optionally after a delay that stands in for a slow
/// downstream stage.
#[derive(Debug, Clone, Copy, Default)]
pub struct Disposer {
    delay: Duration,
}

impl Disposer {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    async fn accept(&mut self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

/// A consumer's output stage.
pub enum Sink {
    File(FileSink),
    Disposer(Disposer),
}

impl Sink {
    /// Build the sink a descriptor names.
    pub async fn open(kind: &SinkKind) -> Result<Self> {
        Ok(match kind {
            SinkKind::File { path } => Sink::File(FileSink::create(path).await?),
            SinkKind::Discard { delay } => Sink::Disposer(Disposer::new(*delay)),
        })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Sink::File(_) => "file",
            Sink::Disposer(_) => "discard",
        }
    }

    /// Hand one complete frame to the sink.
    pub async fn accept(&mut self, frame: &[u8]) -> Result<()> {
        match self {
            Sink::File(sink) => sink.accept(frame).await,
            Sink::Disposer(sink) => {
                sink.accept().await;
                Ok(())
            }
        }
    }

    /// Flush anything buffered. Called once, when the consumer stops.
    pub async fn finish(&mut self) -> Result<()> {
        match self {
            Sink::File(sink) => sink.finish().await,
            Sink::Disposer(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::unique_temp_dir;

    #[tokio::test]
    async fn file_sink_persists_after_finish() {
        let dir = unique_temp_dir("file-sink");
        let path = dir.join("out.dat");
        let mut sink = Sink::open(&SinkKind::File { path: path.clone() }).await.unwrap();
        assert_eq!(sink.kind(), "file");

        sink.accept(b"abc").await.unwrap();
        sink.accept(b"def").await.unwrap();
        sink.finish().await.unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn file_sink_in_missing_dir_fails() {
        let dir = unique_temp_dir("file-sink-missing");
        let err = Sink::open(&SinkKind::File {
            path: dir.join("no/such/dir/out.dat"),
        })
        .await
        .err()
        .unwrap();
        assert!(matches!(err, HarnessError::Storage { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn disposer_waits_its_delay() {
        let mut sink = Sink::open(&SinkKind::Discard {
            delay: Duration::from_millis(30),
        })
        .await
        .unwrap();
        let start = tokio::time::Instant::now();
        sink.accept(b"frame").await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(30));
        sink.finish().await.unwrap();
    }
}
