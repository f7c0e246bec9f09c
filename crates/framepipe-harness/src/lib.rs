//! Producer/consumer harness for streaming synthetic frames.
//!
//! A run is a set of pairs. Each pair is one [`Producer`] writing frames
//! from a payload source into a channel endpoint, and one [`Consumer`]
//! draining that endpoint into a sink. Pairs run either fully independently
//! or, for file-backed producers, cooperatively on one round-robin task.
//!
//! ```no_run
//! use framepipe_harness::{Harness, HarnessConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = HarnessConfig::from_path("run.json")?;
//! let summary = Harness::build(config)
//!     .await
//!     .run_independent(&CancellationToken::new())
//!     .await;
//! println!("{} failures", summary.failures());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod consumer;
pub mod error;
pub mod harness;
pub mod producer;
pub mod scheduler;
pub mod sink;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::{
    parse_duration, ConfigError, HarnessConfig, PairConfig, PayloadKind, RunBound, SinkDescriptor,
    SinkKind, SourceDescriptor,
};
pub use consumer::{Consumer, ConsumerReport, StopReason};
pub use error::{HarnessError, Result};
pub use harness::{BuiltPair, Harness, PairRejection, RunSummary};
pub use producer::{FinishReason, Producer, ProducerReport, StepOutcome};
pub use scheduler::{IndependentScheduler, RoundRobinScheduler, Task, TaskFuture, TaskOutcome, TaskReport};
pub use sink::{Disposer, FileSink, Sink};
pub use source::{
    open_source, split_records, FileSource, Hit, HitSource, PatternSource, PayloadSource,
    SourceFuture, SplitSummary,
};
