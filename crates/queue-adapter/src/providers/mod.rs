//! Queue transport implementations.
//!
//! Each provider implements [`QueueTransport`](crate::transport::QueueTransport)
//! and is wrapped by a [`TransportAdapter`](crate::adapter::TransportAdapter).

pub mod memory;
pub mod sqs;

pub use memory::{InMemoryConfig, InMemoryTransport};
pub use sqs::{AwsError, SqsTransport};
