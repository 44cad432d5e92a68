//! Consumer loop turning pull-based batch receives into a push stream.
//!
//! One loop runs per `listen` call. It polls the transport, forwards every
//! message of a batch to the [`MessageStream`] in transport order and deletes
//! each message once the reader has taken it from the stream. Until then the
//! loop waits, so a message that is never read is never deleted. The loop stops
//! when its cancellation token fires or the stream is dropped; the stream then
//! yields `None`.

use crate::error::{ConfigurationError, QueueError};
use crate::message::{InboundMessage, ReceiptHandle, Response};
use crate::retry::BackoffPolicy;
use crate::transport::{QueueTransport, ReceiveRequest, TransportMessage};
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

#[cfg(test)]
#[path = "consumer_tests.rs"]
mod tests;

/// Largest batch a single receive call may request
pub const MAX_BATCH_SIZE: u32 = 10;

/// Longest long-poll wait a receive call may request, in seconds
pub const MAX_WAIT_TIME_SECONDS: u32 = 20;

// ============================================================================
// Configuration
// ============================================================================

/// What to do when deleting a delivered message fails
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AckFailurePolicy {
    /// Report the failure and move on; the message may be redelivered
    #[default]
    Ignore,
    /// Re-issue the delete in the background before reporting the failure
    Retry { max_attempts: u32 },
}

/// Settings shared by every consumer loop an adapter starts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Messages requested per receive call (1-10)
    pub max_messages: u32,
    /// Long-poll wait per receive call (0-20 seconds)
    pub wait_time_seconds: u32,
    /// Visibility timeout override for received messages
    pub visibility_timeout_seconds: Option<u32>,
    /// Delay between polls that returned no result or failed
    pub idle_backoff: BackoffPolicy,
    /// Handling of failed deletes
    pub ack_failure: AckFailurePolicy,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_messages: MAX_BATCH_SIZE,
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            visibility_timeout_seconds: None,
            idle_backoff: BackoffPolicy::default(),
            ack_failure: AckFailurePolicy::Ignore,
        }
    }
}

impl ConsumerConfig {
    /// Check the settings against provider limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_messages == 0 || self.max_messages > MAX_BATCH_SIZE {
            return Err(ConfigurationError::Invalid {
                message: format!("max_messages must be 1-{}", MAX_BATCH_SIZE),
            });
        }

        if self.wait_time_seconds > MAX_WAIT_TIME_SECONDS {
            return Err(ConfigurationError::Invalid {
                message: format!("wait_time_seconds must be 0-{}", MAX_WAIT_TIME_SECONDS),
            });
        }

        if self.idle_backoff.initial_delay > self.idle_backoff.max_delay {
            return Err(ConfigurationError::Invalid {
                message: "idle_backoff initial delay exceeds max delay".to_string(),
            });
        }

        if self.idle_backoff.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::Invalid {
                message: "idle_backoff multiplier must be at least 1.0".to_string(),
            });
        }

        if let AckFailurePolicy::Retry { max_attempts: 0 } = self.ack_failure {
            return Err(ConfigurationError::Invalid {
                message: "ack_failure retry needs at least one attempt".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Acknowledgement Diagnostics
// ============================================================================

/// Hook notified when a delivered message could not be acknowledged
pub trait AckObserver: Send + Sync {
    /// Called with a [`QueueError::Acknowledge`] once the failure is final
    fn on_ack_failure(&self, address: &str, error: &QueueError);
}

impl<F> AckObserver for F
where
    F: Fn(&str, &QueueError) + Send + Sync,
{
    fn on_ack_failure(&self, address: &str, error: &QueueError) {
        self(address, error)
    }
}

fn report_ack_failure(
    address: &str,
    receipt: &ReceiptHandle,
    cause: &QueueError,
    observer: Option<&dyn AckObserver>,
) {
    let ack_error = QueueError::Acknowledge {
        receipt: receipt.to_string(),
        message: cause.to_string(),
    };

    warn!(
        address = %address,
        error = %ack_error,
        "Message delivered but not acknowledged; it may be redelivered"
    );

    if let Some(observer) = observer {
        observer.on_ack_failure(address, &ack_error);
    }
}

// ============================================================================
// Message Stream
// ============================================================================

/// One event in transit; `taken` fires when the reader receives it
struct Handoff {
    response: Response,
    taken: oneshot::Sender<()>,
}

impl Handoff {
    fn take(self) -> Response {
        // The loop may already have stopped waiting
        let _ = self.taken.send(());
        self.response
    }
}

/// Handle to the output of one consumer loop
///
/// Yields [`Response`] events until the loop is cancelled, then `None`.
/// Dropping the handle cancels the loop. A message counts as delivered only
/// when it is returned from [`recv`](Self::recv) or the `Stream` impl.
pub struct MessageStream {
    address: String,
    receiver: mpsc::Receiver<Handoff>,
    cancellation: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl MessageStream {
    /// Address of the queue being consumed
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Wait for the next event
    pub async fn recv(&mut self) -> Option<Response> {
        self.receiver.recv().await.map(Handoff::take)
    }

    /// Ask the loop to stop
    ///
    /// An event already waiting in the stream stays readable, but its message
    /// is not acknowledged and will be redelivered by the provider.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Check whether the loop was asked to stop
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Token controlling the loop, for wiring into a wider shutdown
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Check whether the loop has exited
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop the loop and wait for it to exit
    pub async fn shutdown(mut self) {
        self.cancellation.cancel();
        self.receiver.close();

        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                error!(address = %self.address, error = %e, "Consumer loop ended abnormally");
            }
        }

        debug!(address = %self.address, "Message stream shut down");
    }
}

impl Stream for MessageStream {
    type Item = Response;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver
            .poll_recv(cx)
            .map(|handoff| handoff.map(Handoff::take))
    }
}

impl Drop for MessageStream {
    fn drop(&mut self) {
        self.cancellation.cancel();
    }
}

impl std::fmt::Debug for MessageStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageStream")
            .field("address", &self.address)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

// ============================================================================
// Consumer Loop
// ============================================================================

/// Background polling task for one queue address
pub(crate) struct ConsumerLoop<T: QueueTransport> {
    transport: Arc<T>,
    request: ReceiveRequest,
    sender: mpsc::Sender<Handoff>,
    cancellation: CancellationToken,
    config: ConsumerConfig,
    ack_observer: Option<Arc<dyn AckObserver>>,
}

impl<T: QueueTransport> ConsumerLoop<T> {
    /// Start a loop on `runtime` and return the stream it feeds
    pub(crate) fn spawn(
        runtime: &Handle,
        transport: Arc<T>,
        request: ReceiveRequest,
        config: ConsumerConfig,
        ack_observer: Option<Arc<dyn AckObserver>>,
        cancellation: CancellationToken,
    ) -> MessageStream {
        let (sender, receiver) = mpsc::channel(1);
        let address = request.address.clone();

        let consumer = Self {
            transport,
            request,
            sender,
            cancellation: cancellation.clone(),
            config,
            ack_observer,
        };
        let task = runtime.spawn(consumer.run());

        MessageStream {
            address,
            receiver,
            cancellation,
            task: Some(task),
        }
    }

    async fn run(self) {
        let address = self.request.address.as_str();
        info!(
            address = %address,
            provider = self.transport.provider(),
            attribute_names = ?self.request.attribute_names,
            "Consumer loop started"
        );

        let mut idle_polls: u32 = 0;

        'polling: loop {
            let outcome = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => break 'polling,
                outcome = self.transport.receive_batch(&self.request) => outcome,
            };

            match outcome {
                Ok(Some(messages)) if messages.is_empty() => {
                    trace!(address = %address, "Receive returned an empty batch");
                    if !self.back_off(idle_polls).await {
                        break 'polling;
                    }
                    idle_polls = idle_polls.saturating_add(1);
                }
                Ok(Some(messages)) => {
                    idle_polls = 0;
                    trace!(address = %address, count = messages.len(), "Received batch");

                    for message in messages {
                        let (response, receipt) = Self::split_message(message);
                        if !self.deliver(response).await {
                            break 'polling;
                        }
                        self.acknowledge(receipt).await;
                    }
                }
                Ok(None) => {
                    trace!(address = %address, "Receive returned no result");
                    if !self.back_off(idle_polls).await {
                        break 'polling;
                    }
                    idle_polls = idle_polls.saturating_add(1);
                }
                Err(error) => {
                    warn!(address = %address, error = %error, "Receive failed");
                    if !self.deliver(Response::Error(error)).await {
                        break 'polling;
                    }
                    if !self.back_off(idle_polls).await {
                        break 'polling;
                    }
                    idle_polls = idle_polls.saturating_add(1);
                }
            }
        }

        info!(address = %address, "Consumer loop stopped");
    }

    fn split_message(message: TransportMessage) -> (Response, ReceiptHandle) {
        let message_id = message.message_id.and_then(|id| id.parse().ok());
        let response = Response::Message(InboundMessage {
            message_id,
            body: message.body,
            attributes: message.attributes,
        });
        (response, message.receipt_handle)
    }

    /// Push one event and wait until the reader takes it
    ///
    /// Returns `false` when the loop must stop. An event still sitting in the
    /// stream at that point counts as not delivered.
    async fn deliver(&self, response: Response) -> bool {
        let (taken, mut taken_signal) = oneshot::channel();
        let handoff = Handoff { response, taken };

        let queued = tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => false,
            sent = self.sender.send(handoff) => sent.is_ok(),
        };
        if !queued {
            return false;
        }

        // A take that already happened wins over a concurrent cancel
        tokio::select! {
            biased;
            signal = &mut taken_signal => match signal {
                Ok(()) => true,
                Err(_) => {
                    debug!(address = %self.request.address, "Stream dropped before reading");
                    false
                }
            },
            _ = self.cancellation.cancelled() => false,
        }
    }

    /// Sleep before the next poll; `false` when cancelled meanwhile
    async fn back_off(&self, attempt: u32) -> bool {
        let delay = self.config.idle_backoff.calculate_delay(attempt);
        if delay.is_zero() {
            tokio::task::yield_now().await;
            return !self.cancellation.is_cancelled();
        }

        tokio::select! {
            biased;
            _ = self.cancellation.cancelled() => false,
            _ = tokio::time::sleep(delay) => true,
        }
    }

    async fn acknowledge(&self, receipt: ReceiptHandle) {
        let address = self.request.address.as_str();

        let error = match self.transport.delete(address, &receipt).await {
            Ok(()) => {
                trace!(address = %address, receipt = %receipt, "Message acknowledged");
                return;
            }
            Err(error) => error,
        };

        match self.config.ack_failure {
            AckFailurePolicy::Ignore => {
                report_ack_failure(address, &receipt, &error, self.ack_observer.as_deref());
            }
            AckFailurePolicy::Retry { max_attempts } => {
                debug!(
                    address = %address,
                    error = %error,
                    max_attempts,
                    "Delete failed; retrying in the background"
                );
                self.spawn_ack_retry(receipt, error, max_attempts);
            }
        }
    }

    fn spawn_ack_retry(&self, receipt: ReceiptHandle, first_error: QueueError, max_attempts: u32) {
        let transport = Arc::clone(&self.transport);
        let address = self.request.address.clone();
        let policy = self.config.idle_backoff.clone();
        let observer = self.ack_observer.clone();
        let cancellation = self.cancellation.clone();

        tokio::spawn(async move {
            let mut last_error = first_error;

            for attempt in 0..max_attempts {
                let delay = policy.calculate_delay(attempt);
                let cancelled = tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => true,
                    _ = tokio::time::sleep(delay) => false,
                };
                if cancelled {
                    break;
                }

                match transport.delete(&address, &receipt).await {
                    Ok(()) => {
                        debug!(address = %address, attempt, "Message acknowledged after retry");
                        return;
                    }
                    Err(error) => last_error = error,
                }
            }

            report_ack_failure(&address, &receipt, &last_error, observer.as_deref());
        });
    }
}
