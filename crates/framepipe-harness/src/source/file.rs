use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufReader, BufWriter};
use tracing::{debug, info};

use framepipe_channel::{ChannelError, EndpointConfig, Unit, UnitReader};

use super::{PayloadSource, SourceFuture};
use crate::config::ConfigError;
use crate::error::{HarnessError, Result};

/// Replays length-prefixed records from a file, in order.
///
/// Each record is a complete unit whose first four big-endian bytes give its
/// own length. A clean end of file between records exhausts the source; a
/// record cut short by end of file is an error.
pub struct FileSource {
    path: PathBuf,
    reader: UnitReader<BufReader<File>>,
    records: u64,
    done: bool,
}

impl FileSource {
    pub async fn open(path: impl AsRef<Path>, endpoint: &EndpointConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)
            .await
            .map_err(|err| HarnessError::storage(&path, err))?;
        debug!(path = %path.display(), "opened record file");
        Ok(Self {
            path,
            reader: UnitReader::with_config(BufReader::new(file), *endpoint),
            records: 0,
            done: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Records returned so far.
    pub fn records_read(&self) -> u64 {
        self.records
    }

    /// Next record, or `None` at end of file.
    pub async fn read_record(&mut self) -> Result<Option<BytesMut>> {
        if self.done {
            return Ok(None);
        }
        match self.reader.read_unit().await {
            Ok(Unit::Frame(record)) => {
                self.records += 1;
                Ok(Some(BytesMut::from(record)))
            }
            Ok(Unit::Stop) => {
                debug!(path = %self.path.display(), records = self.records, "stop unit in record file");
                self.done = true;
                Ok(None)
            }
            Err(ChannelError::EndOfStream) => {
                self.done = true;
                Ok(None)
            }
            Err(ChannelError::ConnectionClosed) => Err(HarnessError::storage(
                &self.path,
                std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    format!("record {} truncated", self.records + 1),
                ),
            )),
            Err(ChannelError::Io(err)) => Err(HarnessError::storage(&self.path, err)),
            Err(other) => Err(other.into()),
        }
    }
}

impl PayloadSource for FileSource {
    fn next_frame(&mut self, _seq: i32) -> SourceFuture<'_> {
        Box::pin(self.read_record())
    }

    fn kind(&self) -> &'static str {
        "file"
    }
}

/// Result of [`split_records`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitSummary {
    /// Output files, in distribution order.
    pub paths: Vec<PathBuf>,
    /// Records read from the input.
    pub records: u64,
}

/// Deal the records of one file round-robin into `parts` files in `out_dir`.
///
/// Part `i` is named `{i}{input file name}`, so `hits.dat` split three ways
/// gives `0hits.dat`, `1hits.dat` and `2hits.dat`.
pub async fn split_records(
    path: impl AsRef<Path>,
    parts: usize,
    out_dir: impl AsRef<Path>,
    endpoint: &EndpointConfig,
) -> Result<SplitSummary> {
    let path = path.as_ref();
    if parts == 0 {
        return Err(ConfigError::InvalidArgument {
            field: "parts",
            reason: "must be greater than zero".into(),
        }
        .into());
    }
    let name = path.file_name().ok_or_else(|| ConfigError::InvalidArgument {
        field: "path",
        reason: format!("{} has no file name", path.display()),
    })?;

    let mut source = FileSource::open(path, endpoint).await?;
    let mut writers = Vec::with_capacity(parts);
    let mut paths = Vec::with_capacity(parts);
    for i in 0..parts {
        let mut part_name = OsString::from(i.to_string());
        part_name.push(name);
        let part_path = out_dir.as_ref().join(part_name);
        let file = File::create(&part_path)
            .await
            .map_err(|err| HarnessError::storage(&part_path, err))?;
        writers.push(BufWriter::new(file));
        paths.push(part_path);
    }

    let mut records = 0u64;
    while let Some(record) = source.read_record().await? {
        let idx = (records % parts as u64) as usize;
        writers[idx]
            .write_all(&record)
            .await
            .map_err(|err| HarnessError::storage(&paths[idx], err))?;
        records += 1;
    }
    for (writer, part_path) in writers.iter_mut().zip(&paths) {
        writer
            .shutdown()
            .await
            .map_err(|err| HarnessError::storage(part_path, err))?;
    }

    info!(path = %path.display(), parts, records, "split record file");
    Ok(SplitSummary { paths, records })
}

#[cfg(test)]
mod tests {
    use framepipe_frame::{sequence_number, stop_unit};

    use super::*;
    use crate::test_support::{record_bytes, unique_temp_dir};

    #[tokio::test]
    async fn reads_records_until_clean_eof() {
        let dir = unique_temp_dir("file-source");
        let path = dir.join("records.dat");
        std::fs::write(&path, record_bytes(0..4, 100)).unwrap();

        let mut source = FileSource::open(&path, &EndpointConfig::default()).await.unwrap();
        for expected in 0..4 {
            let record = source.next_frame(99).await.unwrap().unwrap();
            assert_eq!(sequence_number(&record).unwrap(), expected);
            assert_eq!(record.len(), 144);
        }
        assert!(source.next_frame(99).await.unwrap().is_none());
        assert!(source.next_frame(99).await.unwrap().is_none());
        assert_eq!(source.records_read(), 4);
    }

    #[tokio::test]
    async fn empty_file_is_exhausted_immediately() {
        let dir = unique_temp_dir("file-source-empty");
        let path = dir.join("empty.dat");
        std::fs::write(&path, b"").unwrap();

        let mut source = FileSource::open(&path, &EndpointConfig::default()).await.unwrap();
        assert!(source.read_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn truncated_record_is_an_error() {
        let dir = unique_temp_dir("file-source-truncated");
        let path = dir.join("cut.dat");
        let bytes = record_bytes(0..2, 50);
        std::fs::write(&path, &bytes[..bytes.len() - 10]).unwrap();

        let mut source = FileSource::open(&path, &EndpointConfig::default()).await.unwrap();
        assert!(source.read_record().await.unwrap().is_some());
        let err = source.read_record().await.unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Storage { ref source, .. } if source.kind() == ErrorKind::UnexpectedEof
        ));
    }

    #[tokio::test]
    async fn stop_unit_ends_the_file() {
        let dir = unique_temp_dir("file-source-stop");
        let path = dir.join("stop.dat");
        let mut bytes = record_bytes(0..1, 8);
        bytes.extend_from_slice(&stop_unit());
        bytes.extend_from_slice(&record_bytes(1..2, 8));
        std::fs::write(&path, bytes).unwrap();

        let mut source = FileSource::open(&path, &EndpointConfig::default()).await.unwrap();
        assert!(source.read_record().await.unwrap().is_some());
        assert!(source.read_record().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn missing_file_is_storage_error() {
        let dir = unique_temp_dir("file-source-missing");
        let err = FileSource::open(dir.join("nope.dat"), &EndpointConfig::default())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, HarnessError::Storage { .. }));
    }

    #[tokio::test]
    async fn split_deals_round_robin() {
        let dir = unique_temp_dir("split");
        let path = dir.join("hits.dat");
        std::fs::write(&path, record_bytes(0..7, 20)).unwrap();
        let out = dir.join("out");
        std::fs::create_dir_all(&out).unwrap();

        let summary = split_records(&path, 3, &out, &EndpointConfig::default())
            .await
            .unwrap();
        assert_eq!(summary.records, 7);
        assert_eq!(
            summary.paths,
            vec![out.join("0hits.dat"), out.join("1hits.dat"), out.join("2hits.dat")]
        );

        let expected = [vec![0, 3, 6], vec![1, 4], vec![2, 5]];
        for (part, seqs) in summary.paths.iter().zip(expected) {
            let mut source = FileSource::open(part, &EndpointConfig::default()).await.unwrap();
            let mut got = Vec::new();
            while let Some(record) = source.read_record().await.unwrap() {
                got.push(sequence_number(&record).unwrap());
            }
            assert_eq!(got, seqs);
        }
    }

    #[tokio::test]
    async fn split_into_zero_parts_rejected() {
        let dir = unique_temp_dir("split-zero");
        let path = dir.join("hits.dat");
        std::fs::write(&path, record_bytes(0..1, 4)).unwrap();
        let err = split_records(&path, 0, &dir, &EndpointConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            HarnessError::Config(ConfigError::InvalidArgument { field: "parts", .. })
        ));
    }
}
