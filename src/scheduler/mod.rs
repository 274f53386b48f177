//! Bounded-concurrency task dispatch with kind-based exclusivity.

use crate::errors::PipelineError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, warn};

/// A unit of pipeline work.
///
/// `kind` is the exclusivity discriminator: two tasks of the same kind
/// never run or queue together when submitted exclusively. Tasks own their
/// retry policy; the scheduler never retries.
#[async_trait]
pub trait Task: Send + Sync + 'static {
    fn kind(&self) -> &'static str;
    async fn run(&self, cancel: CancelFlag) -> Result<(), PipelineError>;
}

/// Cooperative cancellation signal shared between the scheduler and its
/// tasks. Tasks are expected to check it before committing side effects.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Receives the task's terminal result once it finishes.
pub type TaskCompletion = oneshot::Receiver<Result<(), PipelineError>>;

/// Dispatches tasks on the tokio runtime under a concurrency cap.
///
/// `max_concurrency` of 1 yields a fully serial queue. Exclusive
/// submissions are rejected while a same-kind task is queued or running.
pub struct TaskScheduler {
    semaphore: Arc<Semaphore>,
    active_kinds: Arc<Mutex<HashSet<&'static str>>>,
    cancel: CancelFlag,
}

impl TaskScheduler {
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrency.max(1))),
            active_kinds: Arc::new(Mutex::new(HashSet::new())),
            cancel: CancelFlag::default(),
        }
    }

    /// A queue that runs one task at a time.
    pub fn serial() -> Self {
        Self::new(1)
    }

    /// Queue a task regardless of what else is in flight.
    pub fn submit<T: Task>(&self, task: T) -> TaskCompletion {
        self.spawn(task, false)
    }

    /// Queue a task unless a same-kind task is already queued or running.
    /// Returns `None` when rejected; the task is never run.
    pub fn submit_exclusive<T: Task>(&self, task: T) -> Option<TaskCompletion> {
        let kind = task.kind();
        {
            let mut kinds = self.active_kinds.lock().expect("scheduler lock poisoned");
            if kinds.contains(kind) {
                debug!(
                    "{} was not queued: a same-kind task is already active",
                    kind
                );
                return None;
            }
            kinds.insert(kind);
        }
        Some(self.spawn(task, true))
    }

    /// Signal cancellation to all queued and running tasks and stop
    /// admitting new ones.
    pub fn shutdown(&self) {
        self.cancel.cancel();
        self.semaphore.close();
    }

    fn spawn<T: Task>(&self, task: T, exclusive: bool) -> TaskCompletion {
        let (done_tx, done_rx) = oneshot::channel();
        let semaphore = self.semaphore.clone();
        let kinds = self.active_kinds.clone();
        let cancel = self.cancel.clone();
        let kind = task.kind();

        tokio::spawn(async move {
            let result = match semaphore.acquire_owned().await {
                Err(_) => Err(PipelineError::Cancelled),
                Ok(_permit) => {
                    if cancel.is_cancelled() {
                        Err(PipelineError::Cancelled)
                    } else {
                        let task_cancel = cancel.clone();
                        // Run on its own tokio task so a panic surfaces as a
                        // JoinError instead of tearing the scheduler down.
                        match tokio::spawn(async move { task.run(task_cancel).await }).await {
                            Ok(result) => result,
                            Err(e) => Err(PipelineError::Internal(anyhow::anyhow!(
                                "{} task panicked: {}",
                                kind,
                                e
                            ))),
                        }
                    }
                }
            };
            if exclusive {
                kinds
                    .lock()
                    .expect("scheduler lock poisoned")
                    .remove(kind);
            }
            if let Err(e) = &result {
                warn!("{} task finished with error: {}", kind, e);
            }
            let _ = done_tx.send(result);
        });
        done_rx
    }
}
