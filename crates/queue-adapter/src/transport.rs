//! Provider boundary consumed by the adapter.
//!
//! A [`QueueTransport`] performs the network calls against one remote queue
//! service. Every result type makes absence explicit so the adapter never has
//! to assume a payload is present.

use crate::error::QueueError;
use crate::message::{AttributeValue, ReceiptHandle};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{BTreeMap, HashMap};

/// A fully prepared outbound message
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub address: String,
    pub body: Bytes,
    pub attributes: BTreeMap<String, AttributeValue>,
    pub message_group_id: Option<String>,
    pub deduplication_id: Option<String>,
    pub delay_seconds: Option<u32>,
}

/// Acknowledgement of a send call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SendReceipt {
    /// Identifier assigned by the provider, absent if the provider omitted it
    pub message_id: Option<String>,
}

/// Parameters of a receive call, fixed for the lifetime of a consumer loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiveRequest {
    pub address: String,
    pub attribute_names: Vec<String>,
    pub max_messages: u32,
    pub wait_time_seconds: u32,
    pub visibility_timeout_seconds: Option<u32>,
}

/// A message as returned by a receive call
#[derive(Debug, Clone, PartialEq)]
pub struct TransportMessage {
    pub message_id: Option<String>,
    pub body: Bytes,
    pub receipt_handle: ReceiptHandle,
    pub attributes: HashMap<String, AttributeValue>,
}

/// Interface implemented by specific queue providers (SQS, in-memory, ...)
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Send a single message
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, QueueError>;

    /// Receive a batch of messages
    ///
    /// `Ok(None)` means the provider returned no result object at all, which
    /// is different from `Ok(Some(vec![]))` (a result with zero messages).
    async fn receive_batch(
        &self,
        request: &ReceiveRequest,
    ) -> Result<Option<Vec<TransportMessage>>, QueueError>;

    /// Delete a received message
    async fn delete(&self, address: &str, receipt: &ReceiptHandle) -> Result<(), QueueError>;

    /// Provider name used in diagnostics
    fn provider(&self) -> &'static str;
}
