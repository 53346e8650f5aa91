/*!
 * In-process work queue.
 *
 * At-least-once delivery with bounded concurrency and per-task retry:
 * - a failed task is redelivered after `base * 2^(attempt-1)` plus jitter
 * - terminal errors and exhausted tasks go to `TaskHandler::on_exhausted`
 * - a panicking handler counts as a retryable failure
 *
 * Handlers must be idempotent; the same task may run more than once.
 */

use async_trait::async_trait;
use futures::FutureExt;
use log::{debug, error, warn};
use rand::Rng;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify, Semaphore};
use uuid::Uuid;

use crate::app_config::QueueConfig;
use crate::errors::PipelineError;

/// Work performed for each delivered task
#[async_trait]
pub trait TaskHandler<T: Send + Sync + 'static>: Send + Sync + 'static {
    /// Run one delivery; `attempt` starts at 1
    async fn handle(&self, task: &T, attempt: u32) -> Result<(), PipelineError>;

    /// Called once when the task will not be delivered again
    async fn on_exhausted(&self, task: &T, error: PipelineError);
}

/// Queue sizing and retry settings
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Name used in logs
    pub name: &'static str,
    /// Tasks running at once
    pub concurrency: usize,
    /// Deliveries per task
    pub max_attempts: u32,
    /// Base of the exponential backoff
    pub backoff_base: Duration,
}

impl QueueOptions {
    pub fn orchestration(config: &QueueConfig) -> Self {
        Self {
            name: "orchestration",
            concurrency: config.orchestration_concurrency,
            max_attempts: config.orchestration_attempts,
            backoff_base: Duration::from_millis(config.orchestration_backoff_ms),
        }
    }

    pub fn batch(config: &QueueConfig) -> Self {
        Self {
            name: "batch",
            concurrency: config.batch_concurrency,
            max_attempts: config.batch_attempts,
            backoff_base: Duration::from_millis(config.batch_backoff_ms),
        }
    }

    /// Delay before delivery `attempt + 1`
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.backoff_base.saturating_mul(1u32 << exponent);
        let jitter_ceiling = (self.backoff_base.as_millis() as u64) / 4;
        let jitter = if jitter_ceiling > 0 {
            rand::rng().random_range(0..=jitter_ceiling)
        } else {
            0
        };
        base + Duration::from_millis(jitter)
    }
}

/// Counters of one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Pushed and not yet finished, retries included
    pub outstanding: usize,
    pub completed: usize,
    pub exhausted: usize,
    pub retried: usize,
}

struct Envelope<T> {
    id: Uuid,
    task: T,
    attempt: u32,
}

#[derive(Default)]
struct QueueState {
    outstanding: AtomicUsize,
    completed: AtomicUsize,
    exhausted: AtomicUsize,
    retried: AtomicUsize,
    idle: Notify,
}

impl QueueState {
    fn finish(&self) {
        if self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle for pushing tasks; clones share the same queue
pub struct WorkQueue<T> {
    name: &'static str,
    sender: mpsc::UnboundedSender<Envelope<T>>,
    state: Arc<QueueState>,
}

impl<T> Clone for WorkQueue<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            sender: self.sender.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkQueue")
            .field("name", &self.name)
            .field("outstanding", &self.state.outstanding.load(Ordering::SeqCst))
            .finish()
    }
}

impl<T: Send + Sync + 'static> WorkQueue<T> {
    /// Start the dispatcher; must be called inside a tokio runtime
    pub fn start(options: QueueOptions, handler: Arc<dyn TaskHandler<T>>) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Envelope<T>>();
        let state = Arc::new(QueueState::default());
        let slots = Arc::new(Semaphore::new(options.concurrency.max(1)));

        let retry_sender = sender.clone();
        let dispatch_state = Arc::clone(&state);
        let options = Arc::new(options);
        let name = options.name;

        tokio::spawn(async move {
            while let Some(envelope) = receiver.recv().await {
                let Ok(slot) = Arc::clone(&slots).acquire_owned().await else {
                    break;
                };

                let handler = Arc::clone(&handler);
                let state = Arc::clone(&dispatch_state);
                let options = Arc::clone(&options);
                let retry_sender = retry_sender.clone();

                tokio::spawn(async move {
                    let outcome = AssertUnwindSafe(handler.handle(&envelope.task, envelope.attempt))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            Err(PipelineError::Persistence("task handler panicked".to_string()))
                        });
                    drop(slot);

                    match outcome {
                        Ok(()) => {
                            state.completed.fetch_add(1, Ordering::SeqCst);
                            state.finish();
                        }
                        Err(error) if error.is_retryable() && envelope.attempt < options.max_attempts => {
                            let delay = options.backoff(envelope.attempt);
                            warn!(
                                "{} task {} attempt {}/{} failed: {}; retrying in {:?}",
                                options.name, envelope.id, envelope.attempt, options.max_attempts, error, delay
                            );
                            state.retried.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(delay).await;

                            let next = Envelope {
                                id: envelope.id,
                                task: envelope.task,
                                attempt: envelope.attempt + 1,
                            };
                            if retry_sender.send(next).is_err() {
                                error!("{} queue closed, dropping task {}", options.name, envelope.id);
                                state.finish();
                            }
                        }
                        Err(error) => {
                            error!(
                                "{} task {} gave up after attempt {}: {}",
                                options.name, envelope.id, envelope.attempt, error
                            );
                            handler.on_exhausted(&envelope.task, error).await;
                            state.exhausted.fetch_add(1, Ordering::SeqCst);
                            state.finish();
                        }
                    }
                });
            }
            debug!("{} queue dispatcher stopped", name);
        });

        Self { name, sender, state }
    }

    /// Enqueue a task for delivery
    pub fn push(&self, task: T) -> Result<Uuid, PipelineError> {
        let id = Uuid::new_v4();
        self.state.outstanding.fetch_add(1, Ordering::SeqCst);

        let envelope = Envelope { id, task, attempt: 1 };
        if self.sender.send(envelope).is_err() {
            self.state.finish();
            return Err(PipelineError::Persistence(format!("{} queue is closed", self.name)));
        }

        debug!("Queued {} task {}", self.name, id);
        Ok(id)
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            outstanding: self.state.outstanding.load(Ordering::SeqCst),
            completed: self.state.completed.load(Ordering::SeqCst),
            exhausted: self.state.exhausted.load(Ordering::SeqCst),
            retried: self.state.retried.load(Ordering::SeqCst),
        }
    }

    /// Resolve once no task is queued, running or waiting for a retry
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.state.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.state.outstanding.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}
