//! Adapter traits and implementations for queue operations.

use crate::consumer::{AckObserver, ConsumerConfig, ConsumerLoop, MessageStream};
use crate::error::{ConfigurationError, QueueError, TransportOperation, ValidationError};
use crate::message::{
    ListenOptions, MessageId, Request, SendOptions, Service, MAX_MESSAGE_ATTRIBUTES,
};
use crate::transport::{OutboundMessage, QueueTransport, ReceiveRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[cfg(test)]
#[path = "adapter_tests.rs"]
mod tests;

/// Main interface for queue operations across all providers
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Send a message with default options
    async fn send(&self, service: &Service, request: Request) -> Result<MessageId, QueueError> {
        self.send_with_options(service, request, SendOptions::default())
            .await
    }

    /// Send a message, returning the provider-assigned identifier
    async fn send_with_options(
        &self,
        service: &Service,
        request: Request,
        options: SendOptions,
    ) -> Result<MessageId, QueueError>;

    /// Start consuming a queue with default options
    fn listen(&self, service: &Service) -> Result<MessageStream, QueueError> {
        self.listen_with_options(service, ListenOptions::default())
    }

    /// Start consuming a queue
    ///
    /// Returns immediately; a background loop feeds the stream until it is
    /// cancelled, shut down or dropped.
    fn listen_with_options(
        &self,
        service: &Service,
        options: ListenOptions,
    ) -> Result<MessageStream, QueueError>;
}

/// Queue adapter backed by a [`QueueTransport`]
pub struct TransportAdapter<T: QueueTransport> {
    transport: Arc<T>,
    consumer_config: ConsumerConfig,
    ack_observer: Option<Arc<dyn AckObserver>>,
    shutdown: CancellationToken,
}

impl<T: QueueTransport> TransportAdapter<T> {
    /// Create new adapter with default consumer settings
    pub fn new(transport: T) -> Self {
        Self::from_shared(Arc::new(transport))
    }

    /// Create new adapter around a transport that is shared elsewhere
    pub fn from_shared(transport: Arc<T>) -> Self {
        Self {
            transport,
            consumer_config: ConsumerConfig::default(),
            ack_observer: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Use custom consumer settings for every subsequent `listen`
    pub fn with_consumer_config(
        mut self,
        config: ConsumerConfig,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        self.consumer_config = config;
        Ok(self)
    }

    /// Install a hook that sees acknowledgement failures
    pub fn with_ack_observer(mut self, observer: Arc<dyn AckObserver>) -> Self {
        self.ack_observer = Some(observer);
        self
    }

    /// Tie every consumer loop to an external shutdown token
    pub fn with_shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    /// Underlying transport
    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Consumer settings in effect
    pub fn consumer_config(&self) -> &ConsumerConfig {
        &self.consumer_config
    }

    /// Stop every consumer loop started by this adapter
    pub fn shutdown(&self) {
        info!(provider = self.transport.provider(), "Shutting down queue listeners");
        self.shutdown.cancel();
    }

    fn outbound_message(
        service: &Service,
        request: Request,
        options: SendOptions,
    ) -> Result<OutboundMessage, ValidationError> {
        let Request {
            body,
            mut attributes,
        } = request;

        // Option attributes override request attributes of the same name
        attributes.extend(options.attributes);
        if attributes.len() > MAX_MESSAGE_ATTRIBUTES {
            return Err(ValidationError::OutOfRange {
                field: "attributes".to_string(),
                message: format!(
                    "{} attributes exceed the limit of {}",
                    attributes.len(),
                    MAX_MESSAGE_ATTRIBUTES
                ),
            });
        }

        Ok(OutboundMessage {
            address: service.addr().to_string(),
            body,
            attributes,
            message_group_id: options.message_group_id,
            deduplication_id: options.deduplication_id,
            delay_seconds: options.delay_seconds,
        })
    }
}

impl<T: QueueTransport> std::fmt::Debug for TransportAdapter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportAdapter")
            .field("provider", &self.transport.provider())
            .field("consumer_config", &self.consumer_config)
            .field("has_ack_observer", &self.ack_observer.is_some())
            .finish()
    }
}

#[async_trait]
impl<T: QueueTransport> QueueAdapter for TransportAdapter<T> {
    async fn send_with_options(
        &self,
        service: &Service,
        request: Request,
        options: SendOptions,
    ) -> Result<MessageId, QueueError> {
        let message = Self::outbound_message(service, request, options)?;

        debug!(
            address = %service.addr(),
            provider = self.transport.provider(),
            size = message.body.len(),
            attributes = message.attributes.len(),
            "Sending message"
        );

        let receipt = self.transport.send(&message).await?;

        let message_id = receipt
            .message_id
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| {
                QueueError::malformed(
                    TransportOperation::Send,
                    "send succeeded without a message identifier",
                )
            })?;

        let message_id: MessageId = message_id.parse()?;
        debug!(address = %service.addr(), message_id = %message_id, "Message sent");

        Ok(message_id)
    }

    fn listen_with_options(
        &self,
        service: &Service,
        options: ListenOptions,
    ) -> Result<MessageStream, QueueError> {
        let runtime = Handle::try_current().map_err(|_| ConfigurationError::NoRuntime)?;

        let request = ReceiveRequest {
            address: service.addr().to_string(),
            attribute_names: options.requested_attribute_names.into_iter().collect(),
            max_messages: self.consumer_config.max_messages,
            wait_time_seconds: self.consumer_config.wait_time_seconds,
            visibility_timeout_seconds: self.consumer_config.visibility_timeout_seconds,
        };

        Ok(ConsumerLoop::spawn(
            &runtime,
            Arc::clone(&self.transport),
            request,
            self.consumer_config.clone(),
            self.ack_observer.clone(),
            self.shutdown.child_token(),
        ))
    }
}
