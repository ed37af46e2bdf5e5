//! Client facade for enqueueing analytics messages.
//!
//! The [`Client`] owns the configuration, the shared message queue and a
//! pool of background [`Consumer`]s. Enqueue calls validate and normalize a
//! message, push it onto the queue and return immediately; delivery happens
//! on the consumers.

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::consumer::{Consumer, ConsumerSettings, ErrorCallback};
use crate::error::{ClientError, Result};
use crate::message::{Alias, Group, Identify, Message, Page, Screen, Track};
use crate::queue::MessageQueue;
use crate::transport::{HttpTransport, Transport, TransportError};

/// Lifecycle of a [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No consumers are running. Enqueued messages are buffered.
    Stopped,

    /// Consumers are draining the queue.
    Running,

    /// Shutdown in progress. New messages are rejected.
    Draining,
}

/// Buffered, batching analytics client.
///
/// # Example
///
/// ```no_run
/// use analytics_batcher::{Client, Config, Track};
///
/// #[tokio::main]
/// async fn main() -> analytics_batcher::Result<()> {
///     let client = Client::from_config(Config::new("my-app", "analytics-bus"))?;
///     client.start();
///
///     client.track(Track::new("Signed Up").user_id("user-42").property("plan", "pro"))?;
///
///     client.shutdown().await
/// }
/// ```
pub struct Client {
    config: Arc<Config>,
    queue: Arc<MessageQueue<Value>>,
    transport: Arc<dyn Transport>,
    consumers: Mutex<Vec<Arc<Consumer>>>,
    state: Mutex<ClientState>,
    on_error: Option<ErrorCallback>,
}

impl Client {
    /// Create a stopped client that delivers through `transport`.
    pub fn new(config: Config, transport: Arc<dyn Transport>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            config: Arc::new(config),
            queue: Arc::new(MessageQueue::new()),
            transport,
            consumers: Mutex::new(Vec::new()),
            state: Mutex::new(ClientState::Stopped),
            on_error: None,
        })
    }

    /// Create a stopped client that delivers over HTTP to `config.endpoint`.
    pub fn from_config(config: Config) -> Result<Self> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Self::new(config, Arc::new(transport))
    }

    /// Install a callback for batches dropped after delivery failed.
    ///
    /// Takes effect for consumers started after this call.
    pub fn with_error_handler<F>(mut self, on_error: F) -> Self
    where
        F: Fn(&TransportError, &[Value]) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> ClientState {
        *self.lock_state()
    }

    /// Number of messages waiting in the queue.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Spawn the consumer pool. Must be called within a tokio runtime.
    ///
    /// Does nothing when already running or while draining.
    pub fn start(&self) {
        let mut state = self.lock_state();
        match *state {
            ClientState::Running => return,
            ClientState::Draining => {
                warn!("Client is shutting down, not starting consumers");
                return;
            }
            ClientState::Stopped => {}
        }

        let settings = ConsumerSettings::from_config(&self.config);
        let mut consumers = self.consumers.lock().unwrap_or_else(PoisonError::into_inner);
        for id in 0..self.config.consumers {
            let consumer = Arc::new(
                Consumer::new(
                    id,
                    self.queue.clone(),
                    self.transport.clone(),
                    settings.clone(),
                )
                .with_error_handler(self.on_error.clone()),
            );
            consumer.start();
            consumers.push(consumer);
        }

        *state = ClientState::Running;
        info!(
            source_id = %self.config.source_id,
            destination = %self.config.destination,
            consumers = self.config.consumers,
            queued = self.queue.len(),
            "Analytics client started"
        );
    }

    pub fn track(&self, message: Track) -> Result<String> {
        self.enqueue(message)
    }

    pub fn identify(&self, message: Identify) -> Result<String> {
        self.enqueue(message)
    }

    pub fn group(&self, message: Group) -> Result<String> {
        self.enqueue(message)
    }

    pub fn alias(&self, message: Alias) -> Result<String> {
        self.enqueue(message)
    }

    pub fn page(&self, message: Page) -> Result<String> {
        self.enqueue(message)
    }

    pub fn screen(&self, message: Screen) -> Result<String> {
        self.enqueue(message)
    }

    fn enqueue<M: Message>(&self, message: M) -> Result<String> {
        let (message_id, event) = message.into_event()?;

        // Push under the state lock so shutdown cannot start between the check and the push
        let state = self.lock_state();
        if *state == ClientState::Draining {
            return Err(ClientError::ShuttingDown);
        }
        self.queue.push(event);
        drop(state);

        debug!(kind = M::KIND, message_id = %message_id, "Enqueued message");

        Ok(message_id)
    }

    /// Wait until every enqueued message has been processed.
    ///
    /// Fails with [`ClientError::FlushTimeout`] when the queue has not
    /// drained within `flush_timeout`. Messages buffered while the client
    /// is stopped are never processed, so flushing a stopped client with a
    /// non-empty queue times out.
    pub async fn flush(&self) -> Result<()> {
        match tokio::time::timeout(self.config.flush_timeout, self.queue.join()).await {
            Ok(()) => Ok(()),
            Err(_) => {
                let pending = self.queue.unfinished();
                warn!(
                    pending = pending,
                    timeout_secs = self.config.flush_timeout.as_secs(),
                    "Flush timed out"
                );
                Err(ClientError::FlushTimeout { pending })
            }
        }
    }

    /// Flush, then stop and join every consumer.
    ///
    /// Enqueue calls fail with [`ClientError::ShuttingDown`] until the
    /// consumers have exited. Calling this on a stopped client is a no-op.
    /// The consumers are stopped even when the flush times out; the flush
    /// error is returned afterwards.
    pub async fn shutdown(&self) -> Result<()> {
        {
            let mut state = self.lock_state();
            match *state {
                ClientState::Running => *state = ClientState::Draining,
                ClientState::Stopped | ClientState::Draining => return Ok(()),
            }
        }

        info!(queued = self.queue.len(), "Shutting down analytics client");
        let flushed = self.flush().await;

        let consumers =
            std::mem::take(&mut *self.consumers.lock().unwrap_or_else(PoisonError::into_inner));
        for consumer in &consumers {
            consumer.pause();
        }
        for consumer in &consumers {
            consumer.join().await;
        }

        *self.lock_state() = ClientState::Stopped;
        info!("Analytics client stopped");

        flushed
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for Client {
    /// Stop consumers that [`Client::shutdown`] did not. They exit after
    /// their current cycle; queued messages are not flushed.
    fn drop(&mut self) {
        let consumers =
            std::mem::take(&mut *self.consumers.lock().unwrap_or_else(PoisonError::into_inner));
        for consumer in &consumers {
            consumer.pause();
        }

        let pending = self.queue.unfinished();
        if pending > 0 {
            warn!(
                pending = pending,
                "Client dropped without shutdown, pending messages will not be delivered"
            );
        }
    }
}
