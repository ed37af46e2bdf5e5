//! Test doubles shared by the unit tests.

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::batch::Batch;
use crate::transport::{SubmitReceipt, Transport, TransportError};

/// Transport that records every batch and can fail a fixed number of times.
pub(crate) struct MockTransport {
    calls: AtomicUsize,
    failures_left: AtomicU32,
    error: Option<TransportError>,
    batches: Mutex<Vec<Batch>>,
}

impl MockTransport {
    pub(crate) fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            failures_left: AtomicU32::new(0),
            error: None,
            batches: Mutex::new(Vec::new()),
        }
    }

    /// Fail the first `times` submissions with `error`, then succeed.
    pub(crate) fn failing(error: TransportError, times: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(times),
            error: Some(error),
            ..Self::new()
        }
    }

    pub(crate) fn always_failing(error: TransportError) -> Self {
        Self::failing(error, u32::MAX)
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Batches that were accepted, in submission order.
    pub(crate) fn batches(&self) -> Vec<Batch> {
        self.batches.lock().unwrap().clone()
    }

    /// Every accepted message, flattened in submission order.
    pub(crate) fn messages(&self) -> Vec<Value> {
        self.batches()
            .into_iter()
            .flat_map(Batch::into_messages)
            .collect()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn submit(&self, batch: &Batch) -> Result<SubmitReceipt, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = &self.error {
            let should_fail = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if should_fail {
                return Err(error.clone());
            }
        }

        self.batches.lock().unwrap().push(batch.clone());
        Ok(SubmitReceipt {
            accepted: batch.len(),
        })
    }
}
