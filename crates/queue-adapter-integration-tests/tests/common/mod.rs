//! Common test utilities for queue-adapter integration tests
//!
//! This module provides:
//! - Tracing initialisation for test output
//! - A scripted transport that records every call in order
//! - Builders for transport messages and fast consumer settings

use async_trait::async_trait;
use bytes::Bytes;
use queue_adapter::{
    BackoffPolicy, ConsumerConfig, OutboundMessage, QueueError, QueueTransport, ReceiptHandle,
    ReceiveRequest, Response, SendReceipt, TransportMessage, TransportOperation,
};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Install a test subscriber once; `RUST_LOG` controls verbosity
#[allow(dead_code)]
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Consumer settings with short, deterministic backoff
#[allow(dead_code)]
pub fn fast_consumer() -> ConsumerConfig {
    ConsumerConfig {
        wait_time_seconds: 1,
        idle_backoff: BackoffPolicy::new(Duration::from_millis(10), Duration::from_millis(50), 2.0)
            .without_jitter(),
        ..Default::default()
    }
}

/// Build a transport message `m{n}` with receipt `r{n}`
#[allow(dead_code)]
pub fn message(n: u32) -> TransportMessage {
    TransportMessage {
        message_id: Some(format!("m{}", n)),
        body: Bytes::from(format!("body-{}", n)),
        receipt_handle: ReceiptHandle::new(format!("r{}", n)),
        attributes: HashMap::new(),
    }
}

/// A transport call as seen by [`ScriptedTransport`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Send(String),
    Receive,
    Delete(String),
}

/// Transport replaying scripted receive outcomes
///
/// Once the script runs out every receive returns `Ok(None)`.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<Option<Vec<TransportMessage>>, QueueError>>>,
    calls: Mutex<Vec<Call>>,
    failing_receipts: Mutex<HashSet<String>>,
}

#[allow(dead_code)]
impl ScriptedTransport {
    pub fn new(script: Vec<Result<Option<Vec<TransportMessage>>, QueueError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    /// Make every delete of `receipt` fail
    pub fn fail_delete(&self, receipt: &str) {
        self.failing_receipts
            .lock()
            .unwrap()
            .insert(receipt.to_string());
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Delete(receipt) => Some(receipt),
                _ => None,
            })
            .collect()
    }

    pub fn receive_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| **call == Call::Receive)
            .count()
    }
}

#[async_trait]
impl QueueTransport for ScriptedTransport {
    async fn send(&self, message: &OutboundMessage) -> Result<SendReceipt, QueueError> {
        let body = String::from_utf8_lossy(&message.body).into_owned();
        let mut calls = self.calls.lock().unwrap();
        calls.push(Call::Send(body));
        Ok(SendReceipt {
            message_id: Some(format!("sent-{}", calls.len())),
        })
    }

    async fn receive_batch(
        &self,
        _request: &ReceiveRequest,
    ) -> Result<Option<Vec<TransportMessage>>, QueueError> {
        self.calls.lock().unwrap().push(Call::Receive);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }

    async fn delete(&self, _address: &str, receipt: &ReceiptHandle) -> Result<(), QueueError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Delete(receipt.as_str().to_string()));

        if self.failing_receipts.lock().unwrap().contains(receipt.as_str()) {
            return Err(QueueError::transport(
                TransportOperation::Delete,
                "receipt handle expired",
                false,
            ));
        }
        Ok(())
    }

    fn provider(&self) -> &'static str {
        "scripted"
    }
}

/// Poll `condition` until it holds, sleeping between checks
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met in time");
}

/// Body of a message event as text
#[allow(dead_code)]
pub fn body_text(response: &Response) -> String {
    let body = response.body().expect("expected a message event");
    String::from_utf8_lossy(body).into_owned()
}
