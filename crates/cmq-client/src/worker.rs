//! # Background Workers
//!
//! Long-running consumer and producer tasks built on [`Queue`].
//!
//! Both run on a spawned Tokio task and stop when signalled through a
//! `tokio::sync::watch` channel. [`WorkerHandle::shutdown`] sends the signal,
//! waits for the task and returns its [`WorkerStats`]. A consumer that is
//! handling a batch finishes that batch before it stops; a pending receive is
//! abandoned, and any messages it would have delivered become visible again
//! after their visibility timeout.

use crate::error::{CmqError, ValidationError};
use crate::message::{ReceiptHandle, ReceivedMessage, MAX_BATCH_SIZE};
use crate::queue::Queue;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

/// Error type returned by message handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync>;

/// Receiver side of the worker shutdown signal
pub type ShutdownReceiver = watch::Receiver<bool>;

const DEFAULT_IDLE_BACKOFF: Duration = Duration::from_secs(1);

/// Processes messages delivered to a [`Consumer`]
///
/// Returning `Ok` deletes the message; returning `Err` leaves it on the queue
/// for redelivery after its visibility timeout.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError>;
}

#[async_trait]
impl<F, Fut> MessageHandler for F
where
    F: Fn(ReceivedMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send,
{
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), HandlerError> {
        (self)(message.clone()).await
    }
}

/// Counters reported when a worker stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub messages_received: u64,
    pub messages_handled: u64,
    pub handler_failures: u64,
    pub messages_deleted: u64,
    pub delete_failures: u64,
    pub receive_errors: u64,
    pub messages_sent: u64,
    pub send_errors: u64,
}

/// Handle to a running worker task
pub struct WorkerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<WorkerStats>,
}

impl WorkerHandle {
    fn spawn<F, Fut>(run: F) -> Self
    where
        F: FnOnce(ShutdownReceiver) -> Fut,
        Fut: Future<Output = WorkerStats> + Send + 'static,
    {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run(shutdown_rx));
        Self { shutdown_tx, task }
    }

    /// Signal the worker to stop and wait for it
    ///
    /// # Errors
    ///
    /// Returns the join error if the worker task panicked.
    pub async fn shutdown(self) -> Result<WorkerStats, JoinError> {
        // The worker may already have exited, closing the receiver
        let _ = self.shutdown_tx.send(true);
        self.task.await
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Sleep for `duration` unless shutdown is signalled first; returns true on shutdown
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut ShutdownReceiver) -> bool {
    tokio::select! {
        _ = shutdown.changed() => true,
        _ = tokio::time::sleep(duration) => false,
    }
}

// ============================================================================
// Consumer
// ============================================================================

/// Receives batches from a queue and hands each message to a handler
#[derive(Debug, Clone)]
pub struct Consumer {
    queue: Queue,
    batch_size: usize,
    error_backoff: Duration,
}

impl Consumer {
    pub fn new(queue: Queue) -> Self {
        Self {
            queue,
            batch_size: MAX_BATCH_SIZE,
            error_backoff: DEFAULT_IDLE_BACKOFF,
        }
    }

    /// Number of messages requested per receive (1-16)
    pub fn with_batch_size(mut self, batch_size: usize) -> Result<Self, CmqError> {
        crate::message::validate_batch_len("batch_size", batch_size)?;
        self.batch_size = batch_size;
        Ok(self)
    }

    /// Pause after a failed receive, and after an empty one when the queue
    /// does not long-poll
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Start consuming on a background task
    pub fn spawn<H: MessageHandler>(self, handler: H) -> WorkerHandle {
        WorkerHandle::spawn(move |shutdown| self.run(handler, shutdown))
    }

    async fn run<H: MessageHandler>(self, handler: H, mut shutdown: ShutdownReceiver) -> WorkerStats {
        let mut stats = WorkerStats::default();
        let queue_name = self.queue.name().clone();
        info!(queue = %queue_name, batch_size = self.batch_size, "Consumer started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let received = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.queue.batch_receive(self.batch_size) => received,
            };

            let messages = match received {
                Ok(response) => response.into_payload(),
                Err(e) => {
                    stats.receive_errors += 1;
                    error!(
                        queue = %queue_name,
                        code = ?e.code(),
                        error = %e,
                        "Receive failed"
                    );
                    if sleep_or_shutdown(self.error_backoff, &mut shutdown).await {
                        break;
                    }
                    continue;
                }
            };

            if messages.is_empty() {
                if self.queue.polling_wait_seconds() == 0
                    && sleep_or_shutdown(self.error_backoff, &mut shutdown).await
                {
                    break;
                }
                continue;
            }

            stats.messages_received += messages.len() as u64;
            let completed = self.handle_batch(&handler, &messages, &mut stats).await;
            self.delete_completed(completed, &mut stats).await;
        }

        info!(
            queue = %queue_name,
            received = stats.messages_received,
            handled = stats.messages_handled,
            "Consumer stopped"
        );
        stats
    }

    async fn handle_batch<H: MessageHandler>(
        &self,
        handler: &H,
        messages: &[ReceivedMessage],
        stats: &mut WorkerStats,
    ) -> Vec<ReceiptHandle> {
        let mut completed = Vec::with_capacity(messages.len());
        for message in messages {
            match handler.handle(message).await {
                Ok(()) => {
                    stats.messages_handled += 1;
                    completed.push(message.handle().clone());
                }
                Err(e) => {
                    stats.handler_failures += 1;
                    warn!(
                        queue = %self.queue.name(),
                        message_id = %message.msg_id(),
                        dequeue_count = message.dequeue_count,
                        error = %e,
                        "Handler failed, message left for redelivery"
                    );
                }
            }
        }
        completed
    }

    async fn delete_completed(&self, completed: Vec<ReceiptHandle>, stats: &mut WorkerStats) {
        if completed.is_empty() {
            return;
        }

        match self.queue.batch_delete(&completed).await {
            Ok(response) => {
                let report = response.into_payload();
                stats.messages_deleted += report.deleted.len() as u64;
                stats.delete_failures += report.failed.len() as u64;
                for failure in &report.failed {
                    warn!(
                        queue = %self.queue.name(),
                        code = failure.code,
                        message = %failure.message,
                        "Delete failed, message will be redelivered"
                    );
                }
            }
            Err(e) => {
                stats.delete_failures += completed.len() as u64;
                error!(
                    queue = %self.queue.name(),
                    count = completed.len(),
                    error = %e,
                    "Batch delete failed"
                );
            }
        }
    }
}

// ============================================================================
// Producer
// ============================================================================

/// Periodically sends the bodies produced by a source function
pub struct Producer;

impl Producer {
    /// Start producing on a background task
    ///
    /// `source` is called once per `interval`; its bodies are sent in batches
    /// of at most 16. An empty result sends nothing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `interval` is zero.
    pub fn spawn<F>(queue: Queue, interval: Duration, mut source: F) -> Result<WorkerHandle, CmqError>
    where
        F: FnMut() -> Vec<String> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(ValidationError::out_of_range("interval", "must be greater than zero").into());
        }

        Ok(WorkerHandle::spawn(move |mut shutdown| async move {
            let mut stats = WorkerStats::default();
            let mut ticker = tokio::time::interval(interval);
            info!(queue = %queue.name(), interval_ms = interval.as_millis() as u64, "Producer started");

            loop {
                tokio::select! {
                    _ = shutdown.changed() => break,
                    _ = ticker.tick() => {}
                }

                let bodies = source();
                for chunk in bodies.chunks(MAX_BATCH_SIZE) {
                    match queue.batch_send(chunk).await {
                        Ok(response) => {
                            stats.messages_sent += response.payload().len() as u64;
                            debug!(queue = %queue.name(), count = chunk.len(), "Produced batch");
                        }
                        Err(e) => {
                            stats.send_errors += 1;
                            error!(
                                queue = %queue.name(),
                                count = chunk.len(),
                                error = %e,
                                "Batch send failed"
                            );
                        }
                    }
                }
            }

            info!(queue = %queue.name(), sent = stats.messages_sent, "Producer stopped");
            stats
        }))
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
