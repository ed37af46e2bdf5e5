//! Background consumers that drain the message queue in batches.
//!
//! Each cycle assembles one [`Batch`] within the upload interval, bounded by
//! `upload_size` messages and [`MAX_BATCH_SIZE`] bytes, then submits it
//! through the transport with retries. Several consumers may share one
//! queue; every message is popped by exactly one of them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::batch::{message_size, Batch, MAX_BATCH_SIZE, MAX_MSG_SIZE};
use crate::config::Config;
use crate::queue::MessageQueue;
use crate::retry::{retry_with_backoff, RetryPolicy};
use crate::transport::{SubmitReceipt, Transport, TransportError};

/// Callback invoked with the final error and the messages of a dropped batch.
pub type ErrorCallback = Arc<dyn Fn(&TransportError, &[Value]) + Send + Sync>;

/// Tuning for a single consumer.
#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    /// Maximum number of messages per batch
    pub upload_size: usize,

    /// Time budget for assembling one batch
    pub upload_interval: Duration,

    /// Retry policy for each batch
    pub retry: RetryPolicy,

    /// Log full request payloads
    pub debug: bool,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            upload_size: 100,
            upload_interval: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            debug: false,
        }
    }
}

impl ConsumerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            upload_size: config.upload_size,
            upload_interval: config.upload_interval,
            retry: RetryPolicy::from_config(config),
            debug: config.debug,
        }
    }
}

/// A worker that pulls batches off the shared queue and uploads them.
///
/// `running` starts out true; [`Consumer::pause`] clears it and the loop
/// exits after its current cycle. A paused consumer is not restarted.
pub struct Consumer {
    id: usize,
    queue: Arc<MessageQueue<Value>>,
    transport: Arc<dyn Transport>,
    settings: ConsumerSettings,
    on_error: Option<ErrorCallback>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Consumer {
    pub fn new(
        id: usize,
        queue: Arc<MessageQueue<Value>>,
        transport: Arc<dyn Transport>,
        settings: ConsumerSettings,
    ) -> Self {
        Self {
            id,
            queue,
            transport,
            settings,
            on_error: None,
            running: AtomicBool::new(true),
            handle: Mutex::new(None),
        }
    }

    /// Install the callback invoked when a batch is dropped after failing.
    pub fn with_error_handler(mut self, on_error: Option<ErrorCallback>) -> Self {
        self.on_error = on_error;
        self
    }

    /// Retry budget of this consumer.
    pub fn retries(&self) -> u32 {
        self.settings.retry.retries
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Spawn the upload loop on the current tokio runtime.
    ///
    /// Returns `false` without spawning if the loop was already started.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_some() {
            return false;
        }

        let consumer = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            consumer.run().await;
        }));
        true
    }

    /// Stop the loop after the current cycle.
    pub fn pause(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Wait for a started loop to exit. Call after [`Consumer::pause`].
    pub async fn join(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(consumer = self.id, error = %e, "Consumer task panicked");
            }
        }
    }

    async fn run(&self) {
        info!(
            consumer = self.id,
            upload_size = self.settings.upload_size,
            upload_interval_ms = self.settings.upload_interval.as_millis() as u64,
            "Consumer started"
        );

        while self.is_running() {
            self.upload().await;
        }

        info!(consumer = self.id, "Consumer stopped");
    }

    /// Assemble the next batch from the queue.
    ///
    /// Stops at `upload_size` messages, when the next message would exceed
    /// [`MAX_BATCH_SIZE`] (it is returned to the head of the queue), or when
    /// the upload interval elapses. Messages larger than [`MAX_MSG_SIZE`]
    /// are dropped.
    pub async fn next(&self) -> Batch {
        let mut batch = Batch::new();
        let started = Instant::now();

        while batch.len() < self.settings.upload_size {
            let remaining = self.settings.upload_interval.saturating_sub(started.elapsed());
            if remaining.is_zero() {
                break;
            }

            let Some(message) = self.queue.pop_timeout(remaining).await else {
                break;
            };

            let size = message_size(&message);
            if size > MAX_MSG_SIZE {
                warn!(
                    consumer = self.id,
                    size = size,
                    max_size = MAX_MSG_SIZE,
                    "Message exceeds size limit, dropping"
                );
                self.queue.task_done(1);
                continue;
            }

            if !batch.fits(size) {
                debug!(
                    consumer = self.id,
                    batch_bytes = batch.size_bytes(),
                    "Batch byte limit reached"
                );
                self.queue.push_front(message);
                break;
            }

            batch.push(message, size);
        }

        batch
    }

    /// Assemble one batch and submit it.
    ///
    /// Returns `true` when the batch was delivered or there was nothing to
    /// send. Every consumed message is acknowledged on the queue whatever
    /// the outcome; a failed batch is dropped.
    pub async fn upload(&self) -> bool {
        let mut batch = self.next().await;
        if batch.is_empty() {
            return true;
        }

        let count = batch.len();
        batch.mark_sent(Utc::now());

        if self.settings.debug {
            debug!(
                consumer = self.id,
                payload = %serde_json::to_string(batch.messages()).unwrap_or_default(),
                "Making request"
            );
        }

        let success = match self.request(&batch).await {
            Ok(receipt) => {
                debug!(
                    consumer = self.id,
                    batch_size = count,
                    batch_bytes = batch.size_bytes(),
                    accepted = receipt.accepted,
                    "Uploaded batch"
                );
                true
            }
            Err(e) => {
                error!(
                    consumer = self.id,
                    error = %e,
                    batch_size = count,
                    "Failed to upload batch, dropping it"
                );
                if let Some(on_error) = &self.on_error {
                    on_error(&e, batch.messages());
                }
                false
            }
        };

        self.queue.task_done(count);
        success
    }

    /// Submit `batch` through the transport under the retry policy.
    pub async fn request(&self, batch: &Batch) -> Result<SubmitReceipt, TransportError> {
        retry_with_backoff(&self.settings.retry, || self.transport.submit(batch)).await
    }
}
