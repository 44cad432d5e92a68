//! # Queue Adapter
//!
//! Provider-agnostic message queue adapter. Sending is a single request to the
//! remote queue; listening starts a background consumer loop that turns
//! pull-based batch receives into a stream of [`Response`] events and deletes
//! every message once it has been handed to the stream consumer.
//!
//! Providers:
//! - AWS SQS over the HTTP query API ([`SqsTransport`])
//! - In-memory queues for tests and local development ([`InMemoryTransport`])
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all queue operations
//! - [`message`] - Services, requests, responses, attributes and options
//! - [`transport`] - The provider boundary
//! - [`adapter`] - The [`QueueAdapter`] interface and its implementation
//! - [`consumer`] - The consumer loop and [`MessageStream`]
//! - [`retry`] - Backoff between idle or failed polls
//! - [`config`] - Configuration loaded from files and the environment
//! - [`providers`] - Concrete transports
//!
//! ## Example
//!
//! ```rust
//! use queue_adapter::{InMemoryTransport, QueueAdapter, Request, Service, TransportAdapter};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let adapter = TransportAdapter::new(InMemoryTransport::default());
//! let service = Service::new("memory://orders")?;
//!
//! adapter.send(&service, Request::new("hello")).await?;
//!
//! let mut stream = adapter.listen(&service)?;
//! if let Some(event) = stream.recv().await {
//!     let message = event.into_result()?;
//!     assert_eq!(&message.body[..], b"hello");
//! }
//! stream.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod adapter;
pub mod config;
pub mod consumer;
pub mod error;
pub mod message;
pub mod providers;
pub mod retry;
pub mod transport;

// Re-export commonly used types at crate root for convenience
pub use adapter::{QueueAdapter, TransportAdapter};
pub use config::{AdapterConfig, SqsConfig};
pub use consumer::{AckFailurePolicy, AckObserver, ConsumerConfig, MessageStream};
pub use error::{
    ConfigurationError, QueueError, SerializationError, TransportOperation, ValidationError,
};
pub use message::{
    AttributeData, AttributeKind, AttributeValue, InboundMessage, ListenOptions, MessageId,
    OptionValue, Options, ReceiptHandle, Request, Response, SendOptions, Service,
};
pub use providers::{InMemoryConfig, InMemoryTransport, SqsTransport};
pub use retry::BackoffPolicy;
pub use transport::{
    OutboundMessage, QueueTransport, ReceiveRequest, SendReceipt, TransportMessage,
};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
