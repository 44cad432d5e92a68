//! In-memory queue transport for testing and development.
//!
//! Queues are keyed by service address and created on first use. The
//! transport mimics the behavior the consumer loop relies on:
//! - Long polling: a receive waits up to `wait_time_seconds` for a message
//! - Visibility timeouts: received but undeleted messages become visible again
//! - Delayed delivery via `delay_seconds`
//! - Deduplication of sends carrying the same deduplication id
//! - Attribute filtering by requested names
//!
//! Time is measured with `tokio::time::Instant`, so tests running with a
//! paused clock control redelivery deterministically.

use crate::error::{QueueError, TransportOperation};
use crate::message::{AttributeValue, ListenOptions, ReceiptHandle};
use crate::transport::{
    OutboundMessage, QueueTransport, ReceiveRequest, SendReceipt, TransportMessage,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, trace};

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;

/// Window in which a repeated deduplication id is ignored
const DEDUPLICATION_WINDOW: Duration = Duration::from_secs(300);

/// Configuration for the in-memory transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InMemoryConfig {
    /// Messages a single queue may hold before sends are rejected
    pub max_queue_size: usize,
    /// Visibility timeout used when a receive does not set one
    pub default_visibility_timeout_seconds: u32,
}

impl Default for InMemoryConfig {
    fn default() -> Self {
        Self {
            max_queue_size: 10_000,
            default_visibility_timeout_seconds: 30,
        }
    }
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with metadata
#[derive(Clone)]
struct StoredMessage {
    message_id: String,
    body: Bytes,
    attributes: BTreeMap<String, AttributeValue>,
    available_at: Instant,
    receive_count: u32,
}

/// A received message waiting for deletion or its visibility timeout
struct InFlightMessage {
    message: StoredMessage,
    visible_at: Instant,
}

/// Internal queue state for a single address
#[derive(Default)]
struct InMemoryQueue {
    /// Messages waiting for delivery, in send order
    messages: VecDeque<StoredMessage>,
    /// Receipt handle -> in-flight message
    in_flight: HashMap<String, InFlightMessage>,
    /// Deduplication id -> (message id, first seen)
    deduplication: HashMap<String, (String, Instant)>,
}

impl InMemoryQueue {
    /// Return expired in-flight messages to the queue
    fn release_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, entry)| entry.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(entry) = self.in_flight.remove(&receipt) {
                trace!(message_id = %entry.message.message_id, "Visibility timeout expired");
                self.messages.push_back(entry.message);
            }
        }
    }

    /// Take up to `max` visible messages, leaving the rest in order
    fn take_visible(&mut self, now: Instant, max: usize) -> Vec<StoredMessage> {
        let mut taken = Vec::new();
        let mut remaining = VecDeque::with_capacity(self.messages.len());

        for message in self.messages.drain(..) {
            if taken.len() < max && message.available_at <= now {
                taken.push(message);
            } else {
                remaining.push_back(message);
            }
        }

        self.messages = remaining;
        taken
    }

    /// Earliest moment a currently invisible message becomes receivable
    fn next_wake(&self) -> Option<Instant> {
        let delayed = self.messages.iter().map(|m| m.available_at);
        let in_flight = self.in_flight.values().map(|entry| entry.visible_at);
        delayed.chain(in_flight).min()
    }

    fn depth(&self) -> usize {
        self.messages.len() + self.in_flight.len()
    }
}

// ============================================================================
// InMemoryTransport
// ============================================================================

/// In-memory queue transport
pub struct InMemoryTransport {
    queues: Mutex<HashMap<String, InMemoryQueue>>,
    arrivals: Notify,
    config: InMemoryConfig,
}

impl InMemoryTransport {
    /// Create new in-memory transport with configuration
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            arrivals: Notify::new(),
            config,
        }
    }

    /// Messages held for an address, visible or in flight
    pub fn queue_depth(&self, address: &str) -> usize {
        self.queues
            .lock()
            .map(|queues| queues.get(address).map_or(0, InMemoryQueue::depth))
            .unwrap_or(0)
    }

    /// Number of addresses with storage allocated
    pub fn queue_count(&self) -> usize {
        self.queues.lock().map(|queues| queues.len()).unwrap_or(0)
    }

    /// Received messages not yet deleted for an address
    pub fn in_flight_count(&self, address: &str) -> usize {
        self.queues
            .lock()
            .map(|queues| queues.get(address).map_or(0, |q| q.in_flight.len()))
            .unwrap_or(0)
    }

    /// Drop every message held for an address
    pub fn purge(&self, address: &str) -> Result<(), QueueError> {
        let mut queues = self.lock(TransportOperation::Delete)?;
        queues.remove(address);
        Ok(())
    }

    fn lock(
        &self,
        operation: TransportOperation,
    ) -> Result<MutexGuard<'_, HashMap<String, InMemoryQueue>>, QueueError> {
        self.queues
            .lock()
            .map_err(|_| QueueError::transport(operation, "queue storage lock poisoned", false))
    }

    /// One non-blocking receive attempt
    fn try_receive(
        &self,
        request: &ReceiveRequest,
        filter: &ListenOptions,
    ) -> Result<(Vec<TransportMessage>, Option<Instant>), QueueError> {
        let mut queues = self.lock(TransportOperation::Receive)?;
        let Some(queue) = queues.get_mut(&request.address) else {
            return Ok((Vec::new(), None));
        };

        let now = Instant::now();
        queue.release_expired(now);

        let max = request.max_messages.clamp(1, 10) as usize;
        let visibility = Duration::from_secs(u64::from(
            request
                .visibility_timeout_seconds
                .unwrap_or(self.config.default_visibility_timeout_seconds),
        ));

        let mut batch = Vec::new();
        for mut message in queue.take_visible(now, max) {
            message.receive_count += 1;
            let receipt = uuid::Uuid::new_v4().to_string();

            let attributes = message
                .attributes
                .iter()
                .filter(|(name, _)| filter.wants(name))
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect();

            batch.push(TransportMessage {
                message_id: Some(message.message_id.clone()),
                body: message.body.clone(),
                receipt_handle: ReceiptHandle::new(receipt.clone()),
                attributes,
            });

            queue.in_flight.insert(
                receipt,
                InFlightMessage {
                    message,
                    visible_at: now + visibility,
                },
            );
        }

        Ok((batch, queue.next_wake()))
    }
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new(InMemoryConfig::default())
    }
}

impl std::fmt::Debug for InMemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryTransport")
            .field("config", &self.config)
            .finish()
    }
}

#[async_trait]
impl QueueTransport for InMemoryTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, QueueError> {
        let now = Instant::now();
        let mut queues = self.lock(TransportOperation::Send)?;
        let queue = queues.entry(message.address.clone()).or_default();

        queue
            .deduplication
            .retain(|_, (_, seen_at)| now.duration_since(*seen_at) < DEDUPLICATION_WINDOW);

        if let Some(dedup_id) = &message.deduplication_id {
            if let Some((message_id, _)) = queue.deduplication.get(dedup_id) {
                debug!(
                    address = %message.address,
                    deduplication_id = %dedup_id,
                    "Duplicate send ignored"
                );
                return Ok(SendReceipt {
                    message_id: Some(message_id.clone()),
                });
            }
        }

        if queue.depth() >= self.config.max_queue_size {
            return Err(QueueError::transport(
                TransportOperation::Send,
                format!("queue is full ({} messages)", self.config.max_queue_size),
                true,
            ));
        }

        let message_id = uuid::Uuid::new_v4().to_string();
        let delay = Duration::from_secs(u64::from(message.delay_seconds.unwrap_or(0)));

        queue.messages.push_back(StoredMessage {
            message_id: message_id.clone(),
            body: message.body.clone(),
            attributes: message.attributes.clone(),
            available_at: now + delay,
            receive_count: 0,
        });

        if let Some(dedup_id) = &message.deduplication_id {
            queue
                .deduplication
                .insert(dedup_id.clone(), (message_id.clone(), now));
        }
        drop(queues);

        self.arrivals.notify_waiters();
        trace!(address = %message.address, message_id = %message_id, "Message stored");

        Ok(SendReceipt {
            message_id: Some(message_id),
        })
    }

    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Option<Vec<TransportMessage>>, QueueError> {
        let filter = ListenOptions {
            requested_attribute_names: request.attribute_names.iter().cloned().collect(),
        };
        let deadline =
            Instant::now() + Duration::from_secs(u64::from(request.wait_time_seconds.min(20)));

        loop {
            // Register interest before looking so a concurrent send is not missed
            let arrival = self.arrivals.notified();
            tokio::pin!(arrival);
            arrival.as_mut().enable();

            let (batch, next_wake) = self.try_receive(request, &filter)?;
            if !batch.is_empty() || Instant::now() >= deadline {
                return Ok(Some(batch));
            }

            let wake_at = next_wake.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut arrival => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn delete(&self, address: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        let mut queues = self.lock(TransportOperation::Delete)?;

        let removed = queues
            .get_mut(address)
            .and_then(|queue| queue.in_flight.remove(receipt.as_str()));

        match removed {
            Some(entry) => {
                trace!(
                    address = %address,
                    message_id = %entry.message.message_id,
                    receive_count = entry.message.receive_count,
                    "Message deleted"
                );
                Ok(())
            }
            None => Err(QueueError::transport(
                TransportOperation::Delete,
                format!("receipt handle '{}' is unknown or expired", receipt),
                false,
            )),
        }
    }

    fn provider(&self) -> &'static str {
        "in-memory"
    }
}
