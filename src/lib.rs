//! Analytics Batcher Library
//!
//! Buffers analytics messages in memory and delivers them in batches to an
//! ingestion endpoint from background consumers:
//!
//! - **client**: facade that validates, normalizes and enqueues messages
//! - **message**: `track`, `identify`, `group`, `alias`, `page` and `screen` types
//! - **queue**: unbounded FIFO with timed pop and join/task-done tracking
//! - **consumer**: workers that assemble size-bounded batches and upload them
//! - **batch**: batch value and the per-message/per-batch byte limits
//! - **retry**: exponential backoff with jitter
//! - **transport**: delivery trait and the default HTTP implementation
//! - **config**: configuration with defaults and environment loading
//! - **simulator**: synthetic traffic generation for testing
//!
//! # Example
//!
//! ```no_run
//! use analytics_batcher::{Client, Config, Identify, Track};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = Config::from_env().expect("Failed to load config");
//!     let client = Client::from_config(config).expect("Failed to create client");
//!     client.start();
//!
//!     client
//!         .identify(Identify::new().user_id("user-42").traits("plan", "pro"))
//!         .ok();
//!     client
//!         .track(Track::new("Order Completed").user_id("user-42").property("total", 99.5))
//!         .ok();
//!
//!     client.shutdown().await.ok();
//! }
//! ```

// Module declarations
pub mod batch;
pub mod client;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod queue;
pub mod retry;
pub mod simulator;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

// Re-export commonly used types at crate root for convenience
pub use batch::{Batch, MAX_BATCH_SIZE, MAX_MSG_SIZE};
pub use client::{Client, ClientState};
pub use config::{Config, ConfigError};
pub use consumer::{Consumer, ConsumerSettings, ErrorCallback};
pub use error::{ClientError, Result, ValidationError};
pub use message::{Alias, Group, Identify, Message, Page, Properties, Screen, Track};
pub use queue::MessageQueue;
pub use retry::RetryPolicy;
pub use transport::{HttpTransport, SubmitReceipt, Transport, TransportError};
