//! Turns a run configuration into running producer/consumer pairs.

use std::collections::HashSet;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use framepipe_channel::{ChannelEndpoint, EndpointConfig};

use crate::config::{ConfigError, HarnessConfig, PairConfig};
use crate::consumer::{Consumer, ConsumerReport};
use crate::error::{HarnessError, Result};
use crate::producer::{Producer, ProducerReport};
use crate::scheduler::{IndependentScheduler, RoundRobinScheduler, TaskOutcome, TaskReport};
use crate::source::open_source;

/// A producer and consumer joined by their own endpoint, ready to run.
pub struct BuiltPair {
    pub index: usize,
    pub producer: Producer,
    pub consumer: Consumer,
}

/// A pair that could not be built. Its siblings are unaffected.
#[derive(Debug)]
pub struct PairRejection {
    pub index: usize,
    pub source_id: u32,
    pub error: HarnessError,
}

/// Everything that happened in one run.
#[derive(Debug)]
pub struct RunSummary {
    pub outcomes: Vec<TaskOutcome>,
    pub rejected: Vec<PairRejection>,
}

impl RunSummary {
    /// Failed tasks plus rejected pairs.
    pub fn failures(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.is_ok()).count() + self.rejected.len()
    }

    pub fn is_success(&self) -> bool {
        self.failures() == 0
    }

    pub fn producer_reports(&self) -> impl Iterator<Item = &ProducerReport> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(TaskReport::Producer(report)) => Some(report),
            _ => None,
        })
    }

    pub fn consumer_reports(&self) -> impl Iterator<Item = &ConsumerReport> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Ok(TaskReport::Consumer(report)) => Some(report),
            _ => None,
        })
    }
}

/// The built pairs of one run configuration.
pub struct Harness {
    pairs: Vec<BuiltPair>,
    rejected: Vec<PairRejection>,
}

impl Harness {
    /// Validate each pair, open its endpoint, source and sink.
    ///
    /// A pair that fails any of these is recorded as rejected and the rest
    /// are still built.
    pub async fn build(config: HarnessConfig) -> Self {
        let endpoint = config.endpoint;
        let mut seen = HashSet::new();
        let mut pairs = Vec::with_capacity(config.pairs.len());
        let mut rejected = Vec::new();

        for (index, pair) in config.pairs.into_iter().enumerate() {
            let source_id = pair.source.source_id;
            match build_pair(index, pair, &endpoint, &mut seen).await {
                Ok(built) => pairs.push(built),
                Err(error) => {
                    warn!(pair = index, source_id, error = %error, "pair rejected");
                    rejected.push(PairRejection {
                        index,
                        source_id,
                        error,
                    });
                }
            }
        }

        info!(pairs = pairs.len(), rejected = rejected.len(), "harness built");
        Self {
            pairs,
            rejected,
        }
    }

    pub fn pairs(&self) -> &[BuiltPair] {
        &self.pairs
    }

    pub fn rejected(&self) -> &[PairRejection] {
        &self.rejected
    }

    /// Run every producer and consumer on its own task.
    pub async fn run_independent(self, cancel: &CancellationToken) -> RunSummary {
        let mut scheduler = IndependentScheduler::new(cancel);
        for pair in self.pairs {
            scheduler.add(Box::new(pair.producer));
            scheduler.add(Box::new(pair.consumer));
        }
        scheduler.start();
        RunSummary {
            outcomes: scheduler.join().await,
            rejected: self.rejected,
        }
    }

    /// Run file-backed producers together on one round-robin task.
    ///
    /// Other producers and every consumer still get a task of their own.
    pub async fn run_cooperative(self, cancel: &CancellationToken) -> RunSummary {
        let mut ring = RoundRobinScheduler::new();
        let mut scheduler = IndependentScheduler::new(cancel);
        for pair in self.pairs {
            if pair.producer.descriptor().payload.is_file() {
                ring.add(pair.producer);
            } else {
                scheduler.add(Box::new(pair.producer));
            }
            scheduler.add(Box::new(pair.consumer));
        }

        scheduler.start();
        let ring_task = tokio::spawn(ring.run(cancel.child_token()));
        let mut outcomes = scheduler.join().await;
        match ring_task.await {
            Ok(ring_outcomes) => outcomes.extend(ring_outcomes),
            Err(err) => outcomes.push(TaskOutcome {
                name: "round-robin".to_string(),
                result: Err(HarnessError::TaskAborted {
                    name: "round-robin".to_string(),
                    message: err.to_string(),
                }),
            }),
        }

        RunSummary {
            outcomes,
            rejected: self.rejected,
        }
    }
}

async fn build_pair(
    index: usize,
    pair: PairConfig,
    endpoint: &EndpointConfig,
    seen: &mut HashSet<u32>,
) -> Result<BuiltPair> {
    pair.validate(index, endpoint)?;
    let source_id = pair.source.source_id;
    if !seen.insert(source_id) {
        return Err(ConfigError::InvalidField {
            pair: index,
            field: "source_id",
            reason: format!("{source_id} is already used by another pair"),
        }
        .into());
    }

    let source = open_source(&pair.source, endpoint).await?;
    let (writer, reader) = ChannelEndpoint::open(source_id, endpoint).split();
    let consumer = Consumer::open(pair.sink, reader).await?;
    let producer = Producer::new(pair.source, writer, source);
    Ok(BuiltPair {
        index,
        producer,
        consumer,
    })
}
