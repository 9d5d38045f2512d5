//! Background replication of graph mutations.
//!
//! Every local mutation is submitted as a [`SyncOperation`] and executed on the
//! tokio runtime without blocking the caller. Outcomes are reported through a
//! per-operation [`SyncTicket`] and a broadcast stream of [`SyncEvent`]s.
//! Failed operations never roll back local state.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, mpsc, oneshot, Mutex, Notify};
use tracing::{debug, error, warn};

use crate::domain::events::{SyncEvent, SyncOperation, SyncOutcome};
use crate::domain::graph::{GraphId, NodeId};
use crate::domain::repository::GraphPersistence;
use crate::CoreError;

/// How submitted operations are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// One task per operation; completion order is not guaranteed
    #[default]
    Concurrent,
    /// A single worker applies operations in submission order
    Ordered,
}

/// Retry policy for failed operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Delay before the first retry in milliseconds
    pub initial_delay_ms: u64,
    /// Multiplier applied to the delay after each retry
    pub backoff_multiplier: f64,
    /// Upper bound for the delay in milliseconds
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 250,
            backoff_multiplier: 2.0,
            max_delay_ms: 10_000,
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1) as i32;
        let delay_ms = (self.initial_delay_ms as f64 * self.backoff_multiplier.powi(exponent))
            .min(self.max_delay_ms as f64)
            .max(0.0);
        Duration::from_millis(delay_ms as u64)
    }
}

/// What happens when an operation fails
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Log, report and keep going; no retry and no rollback
    #[default]
    BestEffort,
    /// Retry with exponential backoff, then behave like `BestEffort`
    Retry(RetryPolicy),
}

/// Background sync configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Scheduling mode
    #[serde(default)]
    pub mode: SyncMode,

    /// Failure handling
    #[serde(default)]
    pub failure_policy: FailurePolicy,

    /// Number of terminally failed operations kept for inspection and replay
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,

    /// Buffer size of the event broadcast channel
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_dead_letter_capacity() -> usize {
    100
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::default(),
            failure_policy: FailurePolicy::default(),
            dead_letter_capacity: default_dead_letter_capacity(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// An operation that exhausted its failure policy
#[derive(Debug, Clone, PartialEq)]
pub struct FailedOperation {
    /// Submission sequence number
    pub sequence: u64,
    /// What was left to replicate when the operation gave up
    pub operation: SyncOperation,
    /// Last error message
    pub error: String,
    /// Attempts made
    pub attempts: u32,
    /// When the operation gave up
    pub failed_at: DateTime<Utc>,
}

/// Handle on a submitted operation. Dropping it does not cancel anything.
#[derive(Debug)]
pub struct SyncTicket {
    sequence: u64,
    receiver: oneshot::Receiver<SyncEvent>,
}

impl SyncTicket {
    /// Submission sequence number
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Wait for the terminal outcome of the operation
    pub async fn outcome(self) -> Result<SyncEvent, CoreError> {
        self.receiver.await.map_err(|_| {
            CoreError::SyncError(format!(
                "Background operation {} ended without reporting",
                self.sequence
            ))
        })
    }
}

struct Job {
    sequence: u64,
    operation: SyncOperation,
    reply: oneshot::Sender<SyncEvent>,
    observer: Option<mpsc::UnboundedSender<SyncEvent>>,
}

struct DeadLetter {
    failed: FailedOperation,
    observer: Option<mpsc::UnboundedSender<SyncEvent>>,
}

struct StepFailure {
    error: CoreError,
    // Remaining work when part of the operation already went through
    resume_with: Option<SyncOperation>,
}

impl From<CoreError> for StepFailure {
    fn from(error: CoreError) -> Self {
        Self {
            error,
            resume_with: None,
        }
    }
}

struct Executor {
    graph_id: GraphId,
    persistence: Arc<dyn GraphPersistence>,
    failure_policy: FailurePolicy,
    dead_letter_capacity: usize,
    events: broadcast::Sender<SyncEvent>,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    in_flight: AtomicUsize,
    idle: Notify,
}

impl Executor {
    async fn run(&self, job: Job) {
        let Job {
            sequence,
            operation,
            reply,
            observer,
        } = job;
        let kind = operation.kind();
        let subject = operation.subject();
        let node_id: Option<NodeId> = operation.created_node().cloned();

        let mut pending = operation;
        let mut node_created = false;
        let mut attempts = 0u32;

        let outcome = loop {
            attempts += 1;
            match self.apply(&pending).await {
                Ok(()) => {
                    node_created = node_id.is_some();
                    break SyncOutcome::Succeeded;
                }
                Err(failure) => {
                    if let Some(rest) = failure.resume_with {
                        node_created = true;
                        pending = rest;
                    }

                    match &self.failure_policy {
                        FailurePolicy::Retry(policy) if attempts <= policy.max_retries => {
                            let delay = policy.delay_for(attempts);
                            warn!(
                                sequence,
                                operation = %kind,
                                attempt = attempts,
                                delay_ms = delay.as_millis() as u64,
                                error = %failure.error,
                                "Background sync failed, retrying"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        _ => {
                            error!(
                                sequence,
                                operation = %kind,
                                subject = %subject,
                                attempts,
                                error = %failure.error,
                                "Background sync failed; local state kept without rollback"
                            );
                            let failed = FailedOperation {
                                sequence,
                                operation: pending,
                                error: failure.error.to_string(),
                                attempts,
                                failed_at: Utc::now(),
                            };
                            self.record_dead_letter(failed, observer.clone()).await;
                            break SyncOutcome::Failed {
                                error: failure.error.to_string(),
                            };
                        }
                    }
                }
            }
        };

        let event = SyncEvent {
            sequence,
            operation: kind,
            subject,
            node_id,
            node_created,
            attempts,
            outcome,
            timestamp: Utc::now(),
        };
        debug!(sequence, operation = %kind, event = event.event_type(), "Background sync finished");

        // Nobody listening is fine.
        if let Some(observer) = &observer {
            let _ = observer.send(event.clone());
        }
        let _ = self.events.send(event.clone());
        let _ = reply.send(event);
        self.finish();
    }

    async fn apply(&self, operation: &SyncOperation) -> Result<(), StepFailure> {
        let graph_id = &self.graph_id;
        let persistence = &self.persistence;

        match operation {
            SyncOperation::CreateNode(node) => {
                persistence.create_node(graph_id, node).await?;
            }
            SyncOperation::UpdateNode { id, update } => {
                persistence.update_node(graph_id, id, update).await?;
            }
            SyncOperation::DeleteNode { id } => {
                persistence.delete_node(graph_id, id).await?;
            }
            SyncOperation::CreateEdge(edge) => {
                persistence.create_edge(graph_id, edge).await?;
            }
            SyncOperation::CreateEdges(edges) => {
                persistence.create_edges_bulk(graph_id, edges).await?;
            }
            SyncOperation::DeleteEdges(ids) => {
                persistence.delete_edges(graph_id, ids).await?;
            }
            SyncOperation::UpdateTask { task_id, patch } => {
                persistence.update_task(graph_id, task_id, patch).await?;
            }
            SyncOperation::CreateNodeWithEdges { node, edges } => {
                if let Err(error) = persistence.create_node(graph_id, node).await {
                    warn!(
                        node_id = %node.id,
                        skipped_edges = edges.len(),
                        "Node creation failed, dependent edges not created"
                    );
                    return Err(error.into());
                }
                if !edges.is_empty() {
                    persistence
                        .create_edges_bulk(graph_id, edges)
                        .await
                        .map_err(|error| StepFailure {
                            error,
                            resume_with: Some(SyncOperation::CreateEdges(edges.clone())),
                        })?;
                }
            }
        }

        Ok(())
    }

    async fn record_dead_letter(
        &self,
        failed: FailedOperation,
        observer: Option<mpsc::UnboundedSender<SyncEvent>>,
    ) {
        if self.dead_letter_capacity == 0 {
            return;
        }

        let mut dead_letters = self.dead_letters.lock().await;
        if dead_letters.len() >= self.dead_letter_capacity {
            if let Some(dropped) = dead_letters.pop_front() {
                warn!(sequence = dropped.failed.sequence, "Dead letter buffer full, discarding oldest");
            }
        }
        dead_letters.push_back(DeadLetter { failed, observer });
    }

    fn finish(&self) {
        if self.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Non-blocking replicator for one graph
#[derive(Clone)]
pub struct BackgroundSync {
    executor: Arc<Executor>,
    queue: Option<mpsc::UnboundedSender<Job>>,
    runtime: Handle,
    sequence: Arc<AtomicU64>,
    config: SyncConfig,
}

impl std::fmt::Debug for BackgroundSync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundSync")
            .field("graph_id", &self.executor.graph_id)
            .field("config", &self.config)
            .field("in_flight", &self.in_flight())
            .finish()
    }
}

impl BackgroundSync {
    /// Create a sync handle on the current tokio runtime
    pub fn new(
        graph_id: GraphId,
        persistence: Arc<dyn GraphPersistence>,
        config: SyncConfig,
    ) -> Result<Self, CoreError> {
        let runtime = Handle::try_current().map_err(|e| {
            CoreError::ConfigurationError(format!("Background sync needs a tokio runtime: {}", e))
        })?;
        Ok(Self::with_runtime(graph_id, persistence, config, runtime))
    }

    /// Create a sync handle that spawns onto the given runtime
    pub fn with_runtime(
        graph_id: GraphId,
        persistence: Arc<dyn GraphPersistence>,
        config: SyncConfig,
        runtime: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let executor = Arc::new(Executor {
            graph_id,
            persistence,
            failure_policy: config.failure_policy.clone(),
            dead_letter_capacity: config.dead_letter_capacity,
            events,
            dead_letters: Mutex::new(VecDeque::new()),
            in_flight: AtomicUsize::new(0),
            idle: Notify::new(),
        });

        let queue = match config.mode {
            SyncMode::Concurrent => None,
            SyncMode::Ordered => {
                let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
                let worker = executor.clone();
                runtime.spawn(async move {
                    while let Some(job) = rx.recv().await {
                        worker.run(job).await;
                    }
                    debug!(graph_id = %worker.graph_id, "Ordered sync worker stopped");
                });
                Some(tx)
            }
        };

        Self {
            executor,
            queue,
            runtime,
            sequence: Arc::new(AtomicU64::new(0)),
            config,
        }
    }

    /// Graph this handle replicates
    pub fn graph_id(&self) -> &GraphId {
        &self.executor.graph_id
    }

    /// Persistence backend used for replication
    pub fn persistence(&self) -> Arc<dyn GraphPersistence> {
        self.executor.persistence.clone()
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Submit an operation. Returns immediately.
    pub fn submit(&self, operation: SyncOperation) -> SyncTicket {
        self.dispatch(operation, None)
    }

    /// Submit an operation whose outcome is also sent to `observer`.
    ///
    /// Unlike [`subscribe`](Self::subscribe) the observer channel never drops
    /// events, and the observer follows the operation through dead-letter replay.
    pub fn submit_observed(
        &self,
        operation: SyncOperation,
        observer: mpsc::UnboundedSender<SyncEvent>,
    ) -> SyncTicket {
        self.dispatch(operation, Some(observer))
    }

    fn dispatch(
        &self,
        operation: SyncOperation,
        observer: Option<mpsc::UnboundedSender<SyncEvent>>,
    ) -> SyncTicket {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst) + 1;
        let (reply, receiver) = oneshot::channel();
        debug!(
            sequence,
            operation = %operation.kind(),
            subject = %operation.subject(),
            "Submitting background sync"
        );

        self.executor.in_flight.fetch_add(1, Ordering::SeqCst);
        let job = Job {
            sequence,
            operation,
            reply,
            observer,
        };

        let job = match &self.queue {
            Some(queue) => match queue.send(job) {
                Ok(()) => None,
                Err(mpsc::error::SendError(job)) => {
                    warn!(sequence, "Ordered sync worker unavailable, running detached");
                    Some(job)
                }
            },
            None => Some(job),
        };
        if let Some(job) = job {
            let executor = self.executor.clone();
            self.runtime.spawn(async move {
                executor.run(job).await;
            });
        }

        SyncTicket { sequence, receiver }
    }

    /// Subscribe to outcome events of operations finishing from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.executor.events.subscribe()
    }

    /// Operations submitted but not finished
    pub fn in_flight(&self) -> usize {
        self.executor.in_flight.load(Ordering::SeqCst)
    }

    /// Wait until no operation is in flight
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.executor.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Snapshot of terminally failed operations, oldest first
    pub async fn dead_letters(&self) -> Vec<FailedOperation> {
        self.executor
            .dead_letters
            .lock()
            .await
            .iter()
            .map(|letter| letter.failed.clone())
            .collect()
    }

    /// Resubmit every dead letter, emptying the buffer
    pub async fn replay_dead_letters(&self) -> Vec<SyncTicket> {
        let drained: Vec<DeadLetter> = self.executor.dead_letters.lock().await.drain(..).collect();
        debug!(count = drained.len(), "Replaying dead letters");
        drained
            .into_iter()
            .map(|letter| self.dispatch(letter.failed.operation, letter.observer))
            .collect()
    }
}
