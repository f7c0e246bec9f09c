//! Consumer task: reads units from a channel and hands frames to a sink
//! until the stop sentinel arrives.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::BytesMut;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use framepipe_channel::{ChannelError, ReadHandle, Unit};
use framepipe_frame::{sequence_number, verify_body, Verification};

use crate::config::SinkDescriptor;
use crate::error::{HarnessError, Result};
use crate::sink::Sink;

/// Why a consumer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The producer's stop sentinel arrived.
    StopSentinel,
    /// The run was cancelled or the endpoint stopped.
    Cancelled,
    /// The write side went away without sending the sentinel.
    Disconnected,
}

impl StopReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::StopSentinel => "stop_sentinel",
            StopReason::Cancelled => "cancelled",
            StopReason::Disconnected => "disconnected",
        }
    }
}

/// Totals reported when a consumer stops.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsumerReport {
    pub endpoint: u32,
    pub frames: u64,
    pub bytes: u64,
    pub oversized_allocations: u64,
    pub verify_failures: u64,
    pub checksum_rewrites: u64,
    pub reason: StopReason,
}

/// Drains one channel into one sink.
pub struct Consumer {
    descriptor: SinkDescriptor,
    channel: ReadHandle,
    sink: Sink,
    running: Arc<AtomicBool>,
    scratch: BytesMut,
    frames: u64,
    bytes: u64,
    verify_failures: u64,
    checksum_rewrites: u64,
}

impl Consumer {
    pub fn new(descriptor: SinkDescriptor, channel: ReadHandle, sink: Sink) -> Self {
        Self {
            descriptor,
            channel,
            sink,
            running: Arc::new(AtomicBool::new(true)),
            scratch: BytesMut::new(),
            frames: 0,
            bytes: 0,
            verify_failures: 0,
            checksum_rewrites: 0,
        }
    }

    /// Open the sink named by `descriptor` and build the consumer.
    pub async fn open(descriptor: SinkDescriptor, channel: ReadHandle) -> Result<Self> {
        let sink = Sink::open(&descriptor.kind).await?;
        Ok(Self::new(descriptor, channel, sink))
    }

    pub fn endpoint_id(&self) -> u32 {
        self.channel.id()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handle to the running flag.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Read and dispatch until the stop sentinel, cancellation, or a failure.
    ///
    /// Sink failures end the consumer and stop the endpoint, which wakes a
    /// producer waiting on a full pipe.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ConsumerReport> {
        debug!(
            endpoint = self.channel.id(),
            sink = self.sink.kind(),
            verify = self.descriptor.verify,
            "consumer started"
        );
        let reason = loop {
            let unit = tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(ChannelError::Cancelled),
                unit = self.channel.read_unit() => unit,
            };
            match unit {
                Ok(Unit::Frame(frame)) => {
                    self.scratch.clear();
                    self.scratch.extend_from_slice(frame);
                }
                Ok(Unit::Stop) => break StopReason::StopSentinel,
                Err(ChannelError::Cancelled) => break StopReason::Cancelled,
                Err(ChannelError::EndOfStream) => {
                    warn!(
                        endpoint = self.channel.id(),
                        frames = self.frames,
                        "channel closed without stop sentinel"
                    );
                    break StopReason::Disconnected;
                }
                Err(err) => return Err(self.fail(err.into()).await),
            }
            if let Err(err) = self.dispatch().await {
                return Err(self.fail(err).await);
            }
        };

        if reason == StopReason::Cancelled {
            self.channel.stop();
        }
        if let Err(err) = self.sink.finish().await {
            return Err(self.fail(err).await);
        }
        self.running.store(false, Ordering::Release);
        let report = self.report(reason);
        info!(
            endpoint = report.endpoint,
            frames = report.frames,
            bytes = report.bytes,
            oversized = report.oversized_allocations,
            verify_failures = report.verify_failures,
            reason = reason.as_str(),
            "consumer stopped"
        );
        Ok(report)
    }

    fn report(&self, reason: StopReason) -> ConsumerReport {
        ConsumerReport {
            endpoint: self.channel.id(),
            frames: self.frames,
            bytes: self.bytes,
            oversized_allocations: self.channel.oversized_allocations(),
            verify_failures: self.verify_failures,
            checksum_rewrites: self.checksum_rewrites,
            reason,
        }
    }

    async fn dispatch(&mut self) -> Result<()> {
        if self.descriptor.verify {
            self.verify_scratch();
        }
        self.sink.accept(&self.scratch).await?;
        self.frames += 1;
        self.bytes += self.scratch.len() as u64;
        Ok(())
    }

    fn verify_scratch(&mut self) {
        let endpoint = self.channel.id();
        let seq = sequence_number(&self.scratch).unwrap_or(-1);
        match verify_body(&mut self.scratch) {
            Ok(Verification::Valid) => {}
            Ok(Verification::ChecksumRewritten { stored, computed }) => {
                self.checksum_rewrites += 1;
                debug!(endpoint, seq, stored, computed, "random-body checksum rewritten");
            }
            Ok(Verification::Corrupt {
                offset,
                expected,
                found,
            }) => {
                self.verify_failures += 1;
                warn!(
                    endpoint,
                    seq, offset, expected, found, "frame body does not match its pattern"
                );
            }
            Err(err) => {
                self.verify_failures += 1;
                warn!(endpoint, seq, error = %err, "frame could not be verified");
            }
        }
    }

    async fn fail(&mut self, err: HarnessError) -> HarnessError {
        error!(
            endpoint = self.channel.id(),
            frames = self.frames,
            error = %err,
            "consumer failed"
        );
        self.channel.stop();
        self.running.store(false, Ordering::Release);
        if let Err(flush_err) = self.sink.finish().await {
            debug!(error = %flush_err, "sink flush after failure also failed");
        }
        err
    }
}
