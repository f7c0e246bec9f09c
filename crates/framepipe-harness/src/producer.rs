//! Producer task: pulls frames from a payload source and writes them to a
//! channel until its bound is reached.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use framepipe_channel::{ChannelError, WriteHandle};

use crate::config::{ConfigError, RunBound, SourceDescriptor};
use crate::error::{HarnessError, Result};
use crate::source::PayloadSource;

/// Why a producer stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    CountReached,
    DurationElapsed,
    SourceExhausted,
    Cancelled,
    Failed,
}

impl FinishReason {
    pub fn as_str(self) -> &'static str {
        match self {
            FinishReason::CountReached => "count_reached",
            FinishReason::DurationElapsed => "duration_elapsed",
            FinishReason::SourceExhausted => "source_exhausted",
            FinishReason::Cancelled => "cancelled",
            FinishReason::Failed => "failed",
        }
    }
}

/// Result of one [`Producer::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// One frame was written.
    Sent { seq: i32, bytes: usize },
    /// Pacing pause; nothing to do before this instant.
    Idle(Instant),
    /// The producer is done. Repeated calls keep returning this.
    Finished(FinishReason),
}

/// Totals reported when a producer finishes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProducerReport {
    pub source_id: u32,
    pub frames_sent: u64,
    pub bytes_sent: u64,
    pub reason: FinishReason,
}

/// Writes frames from one payload source into one channel.
///
/// The producer is running from construction until it finishes. Whatever
/// ends it, it tries once to send the stop sentinel downstream.
pub struct Producer {
    descriptor: SourceDescriptor,
    channel: WriteHandle,
    source: Box<dyn PayloadSource>,
    running: Arc<AtomicBool>,
    deadline: Option<Instant>,
    started: bool,
    next_seq: i32,
    frames_sent: u64,
    bytes_sent: u64,
    burst: u32,
    idle_until: Option<Instant>,
    finished: Option<FinishReason>,
}

impl Producer {
    pub fn new(
        descriptor: SourceDescriptor,
        channel: WriteHandle,
        source: Box<dyn PayloadSource>,
    ) -> Self {
        Self {
            descriptor,
            channel,
            source,
            running: Arc::new(AtomicBool::new(true)),
            deadline: None,
            started: false,
            next_seq: 0,
            frames_sent: 0,
            bytes_sent: 0,
            burst: 0,
            idle_until: None,
            finished: None,
        }
    }

    pub fn source_id(&self) -> u32 {
        self.descriptor.source_id
    }

    pub fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Shared handle to the running flag.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// Do one unit of work: check the bound and pacing, then move one record
    /// from the source to the channel.
    pub async fn step(&mut self) -> Result<StepOutcome> {
        if let Some(reason) = self.finished {
            return Ok(StepOutcome::Finished(reason));
        }

        let now = Instant::now();
        if !self.started {
            self.started = true;
            if let RunBound::Duration(d) = self.descriptor.bound {
                match now.checked_add(d) {
                    Some(deadline) => self.deadline = Some(deadline),
                    None => {
                        let err = ConfigError::InvalidArgument {
                            field: "bound",
                            reason: format!("duration {d:?} overflows the clock"),
                        };
                        return Err(self.fail(err.into()).await);
                    }
                }
            }
            debug!(
                source_id = self.descriptor.source_id,
                source = self.source.kind(),
                "producer started"
            );
        }

        if let Some(reason) = self.bound_reached(now) {
            return Ok(self.finish(reason).await);
        }
        if let Some(until) = self.idle_until {
            if now < until {
                return Ok(StepOutcome::Idle(until));
            }
            self.idle_until = None;
        }

        let seq = self.next_seq;
        let frame = match self.source.next_frame(seq).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(self.finish(FinishReason::SourceExhausted).await),
            Err(err) => return Err(self.fail(err).await),
        };

        match self.channel.write_frame(&frame).await {
            Ok(()) => {}
            Err(ChannelError::Cancelled) => return Ok(self.finish(FinishReason::Cancelled).await),
            Err(err) => return Err(self.fail(err.into()).await),
        }

        self.next_seq = self.next_seq.wrapping_add(1);
        self.frames_sent += 1;
        self.bytes_sent += frame.len() as u64;

        if let Some(interval) = self.descriptor.pacing_interval() {
            self.burst += 1;
            if self.burst >= self.descriptor.num_doms {
                self.burst = 0;
                match Instant::now().checked_add(interval) {
                    Some(until) => self.idle_until = Some(until),
                    None => {
                        let err = ConfigError::InvalidArgument {
                            field: "rate",
                            reason: format!("pause {interval:?} overflows the clock"),
                        };
                        return Err(self.fail(err.into()).await);
                    }
                }
            }
        }

        Ok(StepOutcome::Sent {
            seq,
            bytes: frame.len(),
        })
    }

    /// Step until finished, sleeping through pacing pauses.
    ///
    /// Cancellation is noticed before the next step, or at once while idle.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<ProducerReport> {
        loop {
            if cancel.is_cancelled() {
                self.finish(FinishReason::Cancelled).await;
                break;
            }
            match self.step().await? {
                StepOutcome::Sent { .. } => {}
                StepOutcome::Idle(until) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep_until(until) => {}
                    }
                }
                StepOutcome::Finished(_) => break,
            }
        }
        Ok(self.report())
    }

    /// Finish with `reason` unless already finished.
    pub async fn finish(&mut self, reason: FinishReason) -> StepOutcome {
        if let Some(done) = self.finished {
            return StepOutcome::Finished(done);
        }
        self.finished = Some(reason);
        self.send_stop().await;
        self.running.store(false, Ordering::Release);
        info!(
            source_id = self.descriptor.source_id,
            frames = self.frames_sent,
            bytes = self.bytes_sent,
            reason = reason.as_str(),
            "producer finished"
        );
        StepOutcome::Finished(reason)
    }

    /// Totals so far.
    pub fn report(&self) -> ProducerReport {
        ProducerReport {
            source_id: self.descriptor.source_id,
            frames_sent: self.frames_sent,
            bytes_sent: self.bytes_sent,
            reason: self.finished.unwrap_or(FinishReason::Cancelled),
        }
    }

    fn bound_reached(&self, now: Instant) -> Option<FinishReason> {
        match self.descriptor.bound {
            RunBound::Count(n) if self.frames_sent >= n => Some(FinishReason::CountReached),
            RunBound::Duration(_) => match self.deadline {
                Some(deadline) if now >= deadline => Some(FinishReason::DurationElapsed),
                _ => None,
            },
            _ => None,
        }
    }

    async fn fail(&mut self, err: HarnessError) -> HarnessError {
        error!(
            source_id = self.descriptor.source_id,
            frames = self.frames_sent,
            error = %err,
            "producer failed"
        );
        self.finish(FinishReason::Failed).await;
        err
    }

    async fn send_stop(&mut self) {
        if let Err(err) = self.channel.send_stop().await {
            warn!(
                source_id = self.descriptor.source_id,
                error = %err,
                "failed to send stop sentinel"
            );
        }
    }
}
