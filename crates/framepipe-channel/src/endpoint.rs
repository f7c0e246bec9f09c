use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::DuplexStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::config::EndpointConfig;
use crate::error::{ChannelError, Result};
use crate::reader::{Unit, UnitReader};
use crate::writer::UnitWriter;

#[derive(Debug, Clone)]
struct EndpointState {
    id: u32,
    running: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl EndpointState {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn stop(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!(endpoint = self.id, "channel endpoint stopped");
        }
        self.cancel.cancel();
    }
}

/// One unidirectional in-process channel: a write handle feeding a read
/// handle through a bounded pipe.
///
/// The endpoint is running from [`ChannelEndpoint::open`] until either side
/// calls `stop` or the reader observes the stop sentinel.
pub struct ChannelEndpoint {
    state: EndpointState,
    writer: UnitWriter<DuplexStream>,
    reader: UnitReader<DuplexStream>,
}

impl ChannelEndpoint {
    /// Open an endpoint with its own cancellation token.
    pub fn open(id: u32, config: &EndpointConfig) -> Self {
        Self::open_with_cancel(id, config, &CancellationToken::new())
    }

    /// Open an endpoint whose token is a child of `parent`.
    pub fn open_with_cancel(id: u32, config: &EndpointConfig, parent: &CancellationToken) -> Self {
        let (write_side, read_side) = tokio::io::duplex(config.pipe_capacity.max(1));
        debug!(
            endpoint = id,
            pipe_capacity = config.pipe_capacity,
            buffer_capacity = config.default_buffer_capacity,
            "channel endpoint opened"
        );
        Self {
            state: EndpointState {
                id,
                running: Arc::new(AtomicBool::new(true)),
                cancel: parent.child_token(),
            },
            writer: UnitWriter::with_config(write_side, *config),
            reader: UnitReader::with_config(read_side, *config),
        }
    }

    pub fn id(&self) -> u32 {
        self.state.id
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    /// Mark the endpoint stopped and wake any blocked read or write.
    pub fn stop(&self) {
        self.state.stop();
    }

    /// Token cancelled by [`ChannelEndpoint::stop`].
    pub fn cancellation_token(&self) -> CancellationToken {
        self.state.cancel.clone()
    }

    /// Separate the two sides so they can move to different tasks.
    pub fn split(self) -> (WriteHandle, ReadHandle) {
        (
            WriteHandle {
                state: self.state.clone(),
                writer: self.writer,
            },
            ReadHandle {
                state: self.state,
                reader: self.reader,
            },
        )
    }
}

/// Producer side of a [`ChannelEndpoint`].
pub struct WriteHandle {
    state: EndpointState,
    writer: UnitWriter<DuplexStream>,
}

impl WriteHandle {
    pub fn id(&self) -> u32 {
        self.state.id
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn stop(&self) {
        self.state.stop();
    }

    /// Write one frame. A write waiting on a full pipe gives up when the
    /// endpoint is stopped.
    pub async fn write_frame(&mut self, frame: &[u8]) -> Result<()> {
        tokio::select! {
            biased;
            _ = self.state.cancel.cancelled() => Err(ChannelError::Cancelled),
            res = self.writer.write_frame(frame) => res,
        }
    }

    /// Write the stop sentinel.
    ///
    /// The write is tried before cancellation is checked, so a stopped
    /// endpoint with room in its pipe still delivers the sentinel.
    pub async fn send_stop(&mut self) -> Result<()> {
        tokio::select! {
            biased;
            res = self.writer.send_stop() => res,
            _ = self.state.cancel.cancelled() => Err(ChannelError::Cancelled),
        }
    }
}

/// Consumer side of a [`ChannelEndpoint`].
pub struct ReadHandle {
    state: EndpointState,
    reader: UnitReader<DuplexStream>,
}

impl ReadHandle {
    pub fn id(&self) -> u32 {
        self.state.id
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn stop(&self) {
        self.state.stop();
    }

    /// Read the next unit, waking with `Cancelled` when the endpoint stops.
    ///
    /// Observing the stop sentinel marks the endpoint not running.
    pub async fn read_unit(&mut self) -> Result<Unit<'_>> {
        let unit = self
            .reader
            .read_unit_cancellable(&self.state.cancel)
            .await?;
        if unit == Unit::Stop {
            debug!(endpoint = self.state.id, "stop sentinel received");
            self.state.running.store(false, Ordering::Release);
        }
        Ok(unit)
    }

    /// Number of frames that needed a buffer larger than the default.
    pub fn oversized_allocations(&self) -> u64 {
        self.reader.oversized_allocations()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framepipe_frame::{build_frame, sequence_number, Pattern};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    use super::*;

    fn frame(body_len: usize, seq: i32) -> Vec<u8> {
        let mut rng = ChaCha8Rng::seed_from_u64(seq as u64);
        build_frame(body_len, seq, Pattern::Random, &mut rng)
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn frames_and_stop_cross_the_endpoint() {
        let endpoint = ChannelEndpoint::open(7, &EndpointConfig::default());
        assert_eq!(endpoint.id(), 7);
        assert!(endpoint.is_running());
        let (mut tx, mut rx) = endpoint.split();

        let writer = tokio::spawn(async move {
            for seq in 0..10 {
                tx.write_frame(&frame(100, seq)).await.unwrap();
            }
            tx.send_stop().await.unwrap();
            tx
        });

        for expected in 0..10 {
            match rx.read_unit().await.unwrap() {
                Unit::Frame(f) => {
                    assert_eq!(sequence_number(f).unwrap(), expected);
                    assert_eq!(f, &frame(100, expected)[..]);
                }
                Unit::Stop => panic!("stop arrived early"),
            }
        }
        assert!(rx.is_running());
        assert_eq!(rx.read_unit().await.unwrap(), Unit::Stop);
        assert!(!rx.is_running());

        let tx = writer.await.unwrap();
        assert!(!tx.is_running());
    }

    #[tokio::test]
    async fn frames_larger_than_the_pipe_arrive_whole() {
        let cfg = EndpointConfig {
            pipe_capacity: 64,
            ..EndpointConfig::default()
        };
        let (mut tx, mut rx) = ChannelEndpoint::open(1, &cfg).split();
        let sent = frame(5_000, 3);

        let expected = sent.clone();
        let writer = tokio::spawn(async move { tx.write_frame(&sent).await });

        assert_eq!(rx.read_unit().await.unwrap(), Unit::Frame(&expected[..]));
        writer.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn oversized_frame_counts_one_allocation() {
        let cfg = EndpointConfig {
            default_buffer_capacity: 128,
            ..EndpointConfig::default()
        };
        let (mut tx, mut rx) = ChannelEndpoint::open(2, &cfg).split();

        tx.write_frame(&frame(500, 0)).await.unwrap();
        tx.write_frame(&frame(10, 1)).await.unwrap();

        assert!(matches!(rx.read_unit().await.unwrap(), Unit::Frame(f) if f.len() == 544));
        assert!(matches!(rx.read_unit().await.unwrap(), Unit::Frame(f) if f.len() == 54));
        assert_eq!(rx.oversized_allocations(), 1);
    }

    #[tokio::test]
    async fn stop_wakes_blocked_reader() {
        let endpoint = ChannelEndpoint::open(3, &EndpointConfig::default());
        let (tx, mut rx) = endpoint.split();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.stop();
        });

        let err = tokio::time::timeout(Duration::from_secs(5), rx.read_unit())
            .await
            .expect("reader was not woken")
            .unwrap_err();
        assert!(matches!(err, ChannelError::Cancelled));
        assert!(!rx.is_running());
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_endpoint() {
        let parent = CancellationToken::new();
        let endpoint = ChannelEndpoint::open_with_cancel(4, &EndpointConfig::default(), &parent);
        let token = endpoint.cancellation_token();
        let (_tx, mut rx) = endpoint.split();

        parent.cancel();
        assert!(token.is_cancelled());
        assert!(matches!(
            rx.read_unit().await.unwrap_err(),
            ChannelError::Cancelled
        ));
    }

    #[tokio::test]
    async fn stop_sentinel_still_sent_after_stop() {
        let (mut tx, rx) = ChannelEndpoint::open(5, &EndpointConfig::default()).split();
        rx.stop();
        tx.send_stop().await.unwrap();
    }

    #[tokio::test]
    async fn write_blocked_on_full_pipe_gives_up_on_stop() {
        let cfg = EndpointConfig {
            pipe_capacity: 16,
            ..EndpointConfig::default()
        };
        let (mut tx, rx) = ChannelEndpoint::open(6, &cfg).split();

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            rx.stop();
            rx
        });

        let err = tokio::time::timeout(Duration::from_secs(5), tx.write_frame(&frame(200, 0)))
            .await
            .expect("writer was not woken")
            .unwrap_err();
        assert!(matches!(err, ChannelError::Cancelled));
        drop(stopper.await.unwrap());
    }
}
