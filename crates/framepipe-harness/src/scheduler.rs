//! Task abstraction and the two ways of running producers and consumers.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::consumer::{Consumer, ConsumerReport};
use crate::error::{HarnessError, Result};
use crate::producer::{FinishReason, Producer, ProducerReport, StepOutcome};

/// Future returned by [`Task::run`].
pub type TaskFuture = Pin<Box<dyn Future<Output = Result<TaskReport>> + Send + 'static>>;

/// Final report of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskReport {
    Producer(ProducerReport),
    Consumer(ConsumerReport),
}

/// A unit of work the schedulers can run.
pub trait Task: Send {
    /// Stable name used in logs and outcomes.
    fn name(&self) -> String;

    /// Flag that stays true until the task is done.
    fn running(&self) -> Arc<AtomicBool>;

    /// Run to completion, observing `cancel`.
    fn run(self: Box<Self>, cancel: CancellationToken) -> TaskFuture;
}

impl Task for Producer {
    fn name(&self) -> String {
        format!("producer-{}", self.source_id())
    }

    fn running(&self) -> Arc<AtomicBool> {
        self.running_flag()
    }

    fn run(self: Box<Self>, cancel: CancellationToken) -> TaskFuture {
        Box::pin(async move { (*self).run(cancel).await.map(TaskReport::Producer) })
    }
}

impl Task for Consumer {
    fn name(&self) -> String {
        format!("consumer-{}", self.endpoint_id())
    }

    fn running(&self) -> Arc<AtomicBool> {
        self.running_flag()
    }

    fn run(self: Box<Self>, cancel: CancellationToken) -> TaskFuture {
        Box::pin(async move { (*self).run(cancel).await.map(TaskReport::Consumer) })
    }
}

/// How one task ended.
#[derive(Debug)]
pub struct TaskOutcome {
    pub name: String,
    pub result: Result<TaskReport>,
}

impl TaskOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

struct RunningTask {
    name: String,
    flag: Arc<AtomicBool>,
    handle: JoinHandle<Result<TaskReport>>,
}

/// Runs every task on its own tokio task.
///
/// Tasks do not affect each other: one failing leaves its siblings running.
pub struct IndependentScheduler {
    pending: Vec<Box<dyn Task>>,
    running: Vec<RunningTask>,
    cancel: CancellationToken,
}

impl IndependentScheduler {
    /// Create a scheduler whose `stop` cancels a child of `parent`.
    pub fn new(parent: &CancellationToken) -> Self {
        Self {
            pending: Vec::new(),
            running: Vec::new(),
            cancel: parent.child_token(),
        }
    }

    pub fn add(&mut self, task: Box<dyn Task>) {
        self.pending.push(task);
    }

    pub fn len(&self) -> usize {
        self.pending.len() + self.running.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Spawn every task added since the last call.
    pub fn start(&mut self) {
        let count = self.pending.len();
        for task in self.pending.drain(..) {
            let name = task.name();
            let flag = task.running();
            debug!(task = %name, "starting task");
            let handle = tokio::spawn(task.run(self.cancel.clone()));
            self.running.push(RunningTask { name, flag, handle });
        }
        info!(tasks = count, "independent scheduler started");
    }

    /// True while any started task is still running.
    pub fn is_running(&self) -> bool {
        self.running
            .iter()
            .any(|task| task.flag.load(Ordering::Acquire) && !task.handle.is_finished())
    }

    /// Cancel every task. Tasks notice at their next read, write or step.
    pub fn stop(&self) {
        info!(tasks = self.running.len(), "stopping independent scheduler");
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Wait for every started task and collect how each one ended.
    pub async fn join(self) -> Vec<TaskOutcome> {
        let mut outcomes = Vec::with_capacity(self.running.len());
        for task in self.running {
            let result = match task.handle.await {
                Ok(result) => result,
                Err(err) => Err(HarnessError::TaskAborted {
                    name: task.name.clone(),
                    message: err.to_string(),
                }),
            };
            outcomes.push(TaskOutcome {
                name: task.name,
                result,
            });
        }
        outcomes
    }
}

/// Runs producers cooperatively on one task, one step per producer per turn.
///
/// A producer leaves the ring as soon as it stops running, whether it
/// finished or failed. When every remaining producer is pacing, the ring
/// sleeps until the earliest one can go again. The ring sends no stop
/// sentinels of its own; each producer sends its own as it finishes.
#[derive(Default)]
pub struct RoundRobinScheduler {
    ring: VecDeque<Producer>,
}

impl RoundRobinScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, producer: Producer) {
        self.ring.push_back(producer);
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Visit producers in ring order until the ring is empty. Outcomes are
    /// returned in removal order.
    pub async fn run(mut self, cancel: CancellationToken) -> Vec<TaskOutcome> {
        let total = self.ring.len();
        info!(producers = total, "round-robin scheduler started");
        let mut outcomes = Vec::with_capacity(total);

        while !self.ring.is_empty() {
            if cancel.is_cancelled() {
                while let Some(mut producer) = self.ring.pop_front() {
                    producer.finish(FinishReason::Cancelled).await;
                    outcomes.push(TaskOutcome {
                        name: Task::name(&producer),
                        result: Ok(TaskReport::Producer(producer.report())),
                    });
                }
                break;
            }

            let mut progressed = false;
            let mut wake: Option<Instant> = None;
            for _ in 0..self.ring.len() {
                let Some(mut producer) = self.ring.pop_front() else {
                    break;
                };
                match producer.step().await {
                    Ok(StepOutcome::Sent { .. }) => {
                        progressed = true;
                        self.ring.push_back(producer);
                    }
                    Ok(StepOutcome::Idle(until)) => {
                        wake = Some(wake.map_or(until, |w| w.min(until)));
                        self.ring.push_back(producer);
                    }
                    Ok(StepOutcome::Finished(reason)) => {
                        progressed = true;
                        debug!(
                            source_id = producer.source_id(),
                            reason = reason.as_str(),
                            remaining = self.ring.len(),
                            "producer left the ring"
                        );
                        outcomes.push(TaskOutcome {
                            name: Task::name(&producer),
                            result: Ok(TaskReport::Producer(producer.report())),
                        });
                    }
                    Err(err) => {
                        progressed = true;
                        outcomes.push(TaskOutcome {
                            name: Task::name(&producer),
                            result: Err(err),
                        });
                    }
                }
            }

            if !progressed {
                if let Some(until) = wake {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep_until(until) => {}
                    }
                }
            }
            tokio::task::yield_now().await;
        }

        info!(producers = total, "round-robin scheduler finished");
        outcomes
    }
}
