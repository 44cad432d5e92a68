//! Error types for queue operations.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// The transport call an error originated from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportOperation {
    Send,
    Receive,
    Delete,
}

impl fmt::Display for TransportOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Send => "send",
            Self::Receive => "receive",
            Self::Delete => "delete",
        };
        f.write_str(name)
    }
}

/// Comprehensive error type for all queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// The remote send, receive or delete call failed
    #[error("Transport {operation} failed: {message}")]
    Transport {
        operation: TransportOperation,
        message: String,
        transient: bool,
    },

    /// The transport reported success but the payload was unusable or absent
    #[error("Malformed {operation} result: {message}")]
    MalformedResult {
        operation: TransportOperation,
        message: String,
    },

    /// A delivered message could not be deleted from the remote queue
    #[error("Failed to acknowledge message with receipt '{receipt}': {message}")]
    Acknowledge { receipt: String, message: String },

    #[error("Message too large: {size} bytes (max: {max_size})")]
    MessageTooLarge { size: usize, max_size: usize },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

impl QueueError {
    /// Shorthand for a transport failure
    pub fn transport(
        operation: TransportOperation,
        message: impl Into<String>,
        transient: bool,
    ) -> Self {
        Self::Transport {
            operation,
            message: message.into(),
            transient,
        }
    }

    /// Shorthand for a malformed transport result
    pub fn malformed(operation: TransportOperation, message: impl Into<String>) -> Self {
        Self::MalformedResult {
            operation,
            message: message.into(),
        }
    }

    /// Check if error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport { transient, .. } => *transient,
            Self::MalformedResult { .. } => false,
            Self::Acknowledge { .. } => true,
            Self::MessageTooLarge { .. } => false,
            Self::Validation(_) => false,
            Self::Configuration(_) => false,
            Self::Serialization(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport {
                transient: true, ..
            } => Some(Duration::from_secs(1)),
            Self::Acknowledge { .. } => Some(Duration::from_secs(1)),
            _ => None,
        }
    }

    /// The transport operation involved, if any
    pub fn operation(&self) -> Option<TransportOperation> {
        match self {
            Self::Transport { operation, .. } | Self::MalformedResult { operation, .. } => {
                Some(*operation)
            }
            Self::Acknowledge { .. } => Some(TransportOperation::Delete),
            _ => None,
        }
    }
}

/// Errors during message body or response (de)serialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("Message body is not valid UTF-8")]
    InvalidUtf8,

    #[error("Attribute '{key}' holds invalid base64 data")]
    InvalidBase64 { key: String },

    #[error("XML parsing failed: {message}")]
    Xml { message: String },
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error("Listening requires a running tokio runtime")]
    NoRuntime,
}

/// Validation errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
