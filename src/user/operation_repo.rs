//! In-process [`OperationQueue`] executing operations one at a time, in enqueue order.
use std::{
    collections::VecDeque,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, MutexGuard,
    },
    time::Duration,
};

use async_trait::async_trait;
use rand::Rng;
use tokio::{
    runtime::Handle,
    sync::{oneshot, Notify},
};

use crate::{models::ConfigModelStore, Error, Result};

use super::{ExecutionResult, Operation, OperationExecutor, OperationQueue};

/// First retry delay. Doubles with every retry up to `op_repo_max_backoff`.
const BASE_BACKOFF: Duration = Duration::from_secs(1);

struct QueuedOperation {
    operation: Operation,
    flush: bool,
    waiter: Option<oneshot::Sender<bool>>,
}

struct Shared {
    queue: Mutex<VecDeque<QueuedOperation>>,
    wake: Notify,
    closed: AtomicBool,
    executor: Arc<dyn OperationExecutor>,
    config: Arc<ConfigModelStore>,
}

/// [`OperationQueue`] backed by a single background task.
///
/// Operations enqueued without `flush` wait for `op_repo_execution_interval` so that bursts are
/// executed together; a flushing enqueue wakes the worker immediately. Operations failing with
/// [`ExecutionResult::FailRetry`] are retried with exponential backoff (capped at
/// `op_repo_max_backoff`) before the next operation runs.
pub struct OperationRepo {
    shared: Arc<Shared>,
}

impl OperationRepo {
    /// Create the queue and spawn its worker on `runtime`.
    pub fn new(
        executor: Arc<dyn OperationExecutor>,
        config: Arc<ConfigModelStore>,
        runtime: &Handle,
    ) -> OperationRepo {
        let shared = Arc::new(Shared {
            queue: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            closed: AtomicBool::new(false),
            executor,
            config,
        });
        runtime.spawn(Arc::clone(&shared).run());
        OperationRepo { shared }
    }

    fn push(&self, operation: Operation, flush: bool, waiter: Option<oneshot::Sender<bool>>) {
        log::debug!(target: "onesignal",
                    operation = operation.name(),
                    onesignal_id = operation.onesignal_id(),
                    flush;
                    "operation enqueued");
        self.shared.lock().push_back(QueuedOperation {
            operation,
            flush,
            waiter,
        });
        self.shared.wake.notify_one();
    }
}

impl Drop for OperationRepo {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
        self.shared.wake.notify_one();
    }
}

#[async_trait]
impl OperationQueue for OperationRepo {
    fn enqueue(&self, operation: Operation, flush: bool) {
        self.push(operation, flush, None);
    }

    async fn enqueue_and_wait(&self, operation: Operation, flush: bool) -> Result<bool> {
        let (sender, receiver) = oneshot::channel();
        self.push(operation, flush, Some(sender));
        receiver.await.map_err(|_| Error::OperationQueueClosed)
    }
}

impl Shared {
    async fn run(self: Arc<Self>) {
        loop {
            if self.closed.load(Ordering::Acquire) {
                break;
            }

            let idle = self.lock().is_empty();
            if idle {
                self.wake.notified().await;
                continue;
            }

            let interval = self.config.with_model(|c| c.op_repo_execution_interval);
            let deadline = tokio::time::Instant::now() + interval;
            // Wakeups without a flushing operation keep waiting for the batch deadline.
            while !self.has_flush() && !self.closed.load(Ordering::Acquire) {
                if tokio::time::timeout_at(deadline, self.wake.notified())
                    .await
                    .is_err()
                {
                    break;
                }
            }

            // Drain everything that was enqueued, in order.
            while !self.closed.load(Ordering::Acquire) {
                let Some(next) = self.lock().pop_front() else {
                    break;
                };
                self.execute(next).await;
            }
        }

        // Pending waiters observe the closed queue through their dropped senders.
        self.lock().clear();
        log::debug!(target: "onesignal", "operation repo stopped");
    }

    async fn execute(&self, queued: QueuedOperation) {
        let QueuedOperation {
            operation, waiter, ..
        } = queued;
        let mut retries = 0u32;

        let succeeded = loop {
            match self.executor.execute(&operation).await {
                ExecutionResult::Success => break true,
                ExecutionResult::SuccessWithIdTranslations(translations) => {
                    for queued in self.lock().iter_mut() {
                        queued.operation.translate_ids(&translations);
                    }
                    break true;
                }
                ExecutionResult::FailNoRetry => {
                    log::warn!(target: "onesignal",
                               operation = operation.name(),
                               onesignal_id = operation.onesignal_id();
                               "operation failed, dropping it");
                    break false;
                }
                ExecutionResult::FailRetry => {
                    retries += 1;
                    let max_backoff = self.config.with_model(|c| c.op_repo_max_backoff);
                    let delay = backoff(retries, max_backoff);
                    log::debug!(target: "onesignal",
                                operation = operation.name(),
                                retries,
                                delay_ms = delay.as_millis() as u64;
                                "operation failed, retrying");
                    tokio::time::sleep(delay).await;
                    if self.closed.load(Ordering::Acquire) {
                        return;
                    }
                }
            }
        };

        if let Some(waiter) = waiter {
            // The caller may have stopped waiting.
            let _ = waiter.send(succeeded);
        }
    }

    fn has_flush(&self) -> bool {
        self.lock().iter().any(|queued| queued.flush)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedOperation>> {
        self.queue
            .lock()
            .expect("thread holding operation queue lock should not panic")
    }
}

/// Exponential backoff with up to 25% random jitter, capped at `max`.
fn backoff(retries: u32, max: Duration) -> Duration {
    let exponential = BASE_BACKOFF.saturating_mul(1 << retries.saturating_sub(1).min(16));
    let base = exponential.min(max);
    let jitter_ms = (base.as_millis() / 4) as u64;
    let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=jitter_ms));
    (base + jitter).min(max)
}
