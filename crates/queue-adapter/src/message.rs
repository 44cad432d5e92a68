//! Message types for queue operations including core domain identifiers.

use crate::error::{QueueError, ValidationError};
use bytes::Bytes;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

/// Maximum number of message attributes a single message may carry
pub const MAX_MESSAGE_ATTRIBUTES: usize = 10;

/// Maximum length of a message attribute name
pub const MAX_ATTRIBUTE_NAME_LENGTH: usize = 256;

/// Maximum send delay accepted by the providers, in seconds
pub const MAX_DELAY_SECONDS: u32 = 900;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// A resolved queue endpoint
///
/// The address is provider specific (an SQS queue URL, an in-memory queue
/// key, ...). Resolution from a logical name happens before the adapter is
/// involved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    addr: String,
    metadata: HashMap<String, String>,
}

impl Service {
    /// Create a service for an already resolved address
    pub fn new(addr: impl Into<String>) -> Result<Self, ValidationError> {
        let addr = addr.into();
        if addr.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "addr".to_string(),
            });
        }

        Ok(Self {
            addr,
            metadata: HashMap::new(),
        })
    }

    /// Attach descriptive metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Get the queue address
    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Get all metadata entries
    pub fn metadata(&self) -> &HashMap<String, String> {
        &self.metadata
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.addr)
    }
}

/// Provider-assigned identifier of a sent or received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MessageId(String);

impl MessageId {
    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token identifying one received instance of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Message Attributes
// ============================================================================

/// Base data type of a message attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttributeKind {
    String,
    Number,
    Binary,
}

impl AttributeKind {
    /// Name used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Binary => "Binary",
        }
    }

    /// Parse the base type out of a data type such as `Number.float`
    pub fn from_data_type(data_type: &str) -> Option<Self> {
        let base = data_type.split('.').next().unwrap_or_default();
        match base {
            "String" => Some(Self::String),
            "Number" => Some(Self::Number),
            "Binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Payload of a message attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeData {
    Text(String),
    Binary(Bytes),
}

/// Provider-native typed message attribute value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeValue {
    data_type: String,
    data: AttributeData,
}

impl AttributeValue {
    /// Create a `String` attribute
    pub fn string(value: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(AttributeKind::String.as_str(), AttributeData::Text(value.into()))
    }

    /// Create a `Number` attribute; the value must parse as a finite number
    pub fn number(value: impl ToString) -> Result<Self, ValidationError> {
        Self::new(
            AttributeKind::Number.as_str(),
            AttributeData::Text(value.to_string()),
        )
    }

    /// Create a `Binary` attribute
    pub fn binary(value: impl Into<Bytes>) -> Result<Self, ValidationError> {
        Self::new(
            AttributeKind::Binary.as_str(),
            AttributeData::Binary(value.into()),
        )
    }

    /// Create an attribute from a raw data type and payload
    ///
    /// The data type must start with `String`, `Number` or `Binary`, optionally
    /// followed by a `.label` suffix, and the payload must match it.
    pub fn new(data_type: impl Into<String>, data: AttributeData) -> Result<Self, ValidationError> {
        let data_type = data_type.into();
        let kind = AttributeKind::from_data_type(&data_type).ok_or_else(|| {
            ValidationError::InvalidFormat {
                field: "data_type".to_string(),
                message: format!("'{}' is not String, Number or Binary", data_type),
            }
        })?;

        if data_type.ends_with('.') {
            return Err(ValidationError::InvalidFormat {
                field: "data_type".to_string(),
                message: "custom type label must not be empty".to_string(),
            });
        }

        match (kind, &data) {
            (AttributeKind::Binary, AttributeData::Binary(bytes)) if !bytes.is_empty() => {}
            (AttributeKind::String, AttributeData::Text(text)) if !text.is_empty() => {}
            (AttributeKind::Number, AttributeData::Text(text)) => {
                let is_number = text.trim().parse::<f64>().map(f64::is_finite).unwrap_or(false);
                if !is_number {
                    return Err(ValidationError::InvalidFormat {
                        field: "value".to_string(),
                        message: format!("'{}' is not a number", text),
                    });
                }
            }
            (_, AttributeData::Text(text)) if text.is_empty() => {
                return Err(ValidationError::Required {
                    field: "value".to_string(),
                })
            }
            (_, AttributeData::Binary(bytes)) if bytes.is_empty() => {
                return Err(ValidationError::Required {
                    field: "value".to_string(),
                })
            }
            _ => {
                return Err(ValidationError::InvalidFormat {
                    field: "value".to_string(),
                    message: format!("payload does not match data type '{}'", data_type),
                })
            }
        }

        Ok(Self { data_type, data })
    }

    /// Append a custom type label, e.g. `Number` becomes `Number.float`
    pub fn with_label(self, label: &str) -> Result<Self, ValidationError> {
        let base = self.kind().as_str();
        Self::new(format!("{}.{}", base, label), self.data)
    }

    /// Full data type including any custom label
    pub fn data_type(&self) -> &str {
        &self.data_type
    }

    /// Base data type
    pub fn kind(&self) -> AttributeKind {
        // Construction guarantees a known base type
        AttributeKind::from_data_type(&self.data_type).unwrap_or(AttributeKind::String)
    }

    /// Payload
    pub fn data(&self) -> &AttributeData {
        &self.data
    }

    /// Text payload of `String` and `Number` attributes
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            AttributeData::Text(text) => Some(text),
            AttributeData::Binary(_) => None,
        }
    }

    /// Byte payload of `Binary` attributes
    pub fn as_binary(&self) -> Option<&Bytes> {
        match &self.data {
            AttributeData::Binary(bytes) => Some(bytes),
            AttributeData::Text(_) => None,
        }
    }
}

/// Check a message attribute name against the provider naming rules
pub fn validate_attribute_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_ATTRIBUTE_NAME_LENGTH {
        return Err(ValidationError::OutOfRange {
            field: "attribute_name".to_string(),
            message: format!("must be 1-{} characters", MAX_ATTRIBUTE_NAME_LENGTH),
        });
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(ValidationError::InvalidFormat {
            field: "attribute_name".to_string(),
            message: format!(
                "'{}' may only contain ASCII alphanumerics, hyphens, underscores and periods",
                name
            ),
        });
    }

    if name.starts_with('.') || name.ends_with('.') || name.contains("..") {
        return Err(ValidationError::InvalidFormat {
            field: "attribute_name".to_string(),
            message: format!("'{}' has a leading, trailing or repeated period", name),
        });
    }

    let lowered = name.to_ascii_lowercase();
    if lowered.starts_with("aws.") || lowered.starts_with("amazon.") {
        return Err(ValidationError::InvalidFormat {
            field: "attribute_name".to_string(),
            message: format!("'{}' uses a reserved prefix", name),
        });
    }

    Ok(())
}

// ============================================================================
// Generic Options
// ============================================================================

/// Value in a generic [`Options`] map
#[derive(Debug, Clone, PartialEq)]
pub enum OptionValue {
    /// Provider-native attribute value
    Attribute(AttributeValue),
    Text(String),
    Flag(bool),
    Integer(i64),
}

impl From<AttributeValue> for OptionValue {
    fn from(value: AttributeValue) -> Self {
        Self::Attribute(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

impl From<&str> for OptionValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for OptionValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for OptionValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

/// Untyped key/value options
///
/// Converted into [`SendOptions`] (values must be attributes) or
/// [`ListenOptions`] (keys only) before reaching the adapter.
pub type Options = HashMap<String, OptionValue>;

// ============================================================================
// Message Types
// ============================================================================

/// A message to be sent through the queue system
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub body: Bytes,
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Request {
    /// Create new request with body
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Add message attribute
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: AttributeValue,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_attribute_name(&name)?;
        self.attributes.insert(name, value);
        check_attribute_count(self.attributes.len())?;
        Ok(self)
    }
}

/// A message taken off the queue and handed to the stream consumer
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub message_id: Option<MessageId>,
    pub body: Bytes,
    pub attributes: HashMap<String, AttributeValue>,
}

/// One event on a listener stream: a message or a failed poll
#[derive(Debug)]
pub enum Response {
    Message(InboundMessage),
    Error(QueueError),
}

impl Response {
    /// Body of a received message
    pub fn body(&self) -> Option<&Bytes> {
        match self {
            Self::Message(message) => Some(&message.body),
            Self::Error(_) => None,
        }
    }

    /// Error of a failed poll cycle
    pub fn error(&self) -> Option<&QueueError> {
        match self {
            Self::Message(_) => None,
            Self::Error(error) => Some(error),
        }
    }

    /// Check whether this event reports a failed poll cycle
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Convert into a `Result`, consuming the event
    pub fn into_result(self) -> Result<InboundMessage, QueueError> {
        match self {
            Self::Message(message) => Ok(message),
            Self::Error(error) => Err(error),
        }
    }
}

// ============================================================================
// Send and Listen Options
// ============================================================================

/// Configuration options for sending messages to queues
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SendOptions {
    /// Message attributes to attach
    pub attributes: BTreeMap<String, AttributeValue>,
    /// Ordering group, required by FIFO queues
    pub message_group_id: Option<String>,
    /// Explicit deduplication token for FIFO queues
    pub deduplication_id: Option<String>,
    /// Delay before the message becomes visible
    pub delay_seconds: Option<u32>,
}

impl SendOptions {
    /// Create new send options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message attribute
    pub fn with_attribute(
        mut self,
        name: impl Into<String>,
        value: AttributeValue,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_attribute_name(&name)?;
        self.attributes.insert(name, value);
        check_attribute_count(self.attributes.len())?;
        Ok(self)
    }

    /// Set the ordering group for FIFO queues
    pub fn with_message_group_id(mut self, group_id: impl Into<String>) -> Self {
        self.message_group_id = Some(group_id.into());
        self
    }

    /// Set the deduplication token for FIFO queues
    pub fn with_deduplication_id(mut self, id: impl Into<String>) -> Self {
        self.deduplication_id = Some(id.into());
        self
    }

    /// Delay delivery of the message
    pub fn with_delay_seconds(mut self, delay: u32) -> Result<Self, ValidationError> {
        if delay > MAX_DELAY_SECONDS {
            return Err(ValidationError::OutOfRange {
                field: "delay_seconds".to_string(),
                message: format!("must be at most {}", MAX_DELAY_SECONDS),
            });
        }
        self.delay_seconds = Some(delay);
        Ok(self)
    }

    /// Check whether any option is set
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
            && self.message_group_id.is_none()
            && self.deduplication_id.is_none()
            && self.delay_seconds.is_none()
    }
}

impl TryFrom<Options> for SendOptions {
    type Error = ValidationError;

    /// Every value must already be a provider-native attribute
    fn try_from(options: Options) -> Result<Self, Self::Error> {
        // Sorted so the reported key is deterministic
        let sorted: BTreeMap<String, OptionValue> = options.into_iter().collect();

        let mut send_options = Self::new();
        for (key, value) in sorted {
            match value {
                OptionValue::Attribute(attribute) => {
                    send_options = send_options.with_attribute(key, attribute)?;
                }
                _ => {
                    return Err(ValidationError::InvalidFormat {
                        field: key,
                        message: "send option values must be message attributes".to_string(),
                    })
                }
            }
        }

        Ok(send_options)
    }
}

/// Configuration options for listening to queues
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListenOptions {
    /// Attribute names to request on every receive call
    pub requested_attribute_names: BTreeSet<String>,
}

impl ListenOptions {
    /// Wildcard understood by the providers as "every attribute"
    pub const ALL_ATTRIBUTES: &'static str = "All";

    /// Create new listen options with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Request every message attribute
    pub fn all() -> Self {
        Self::new().with_attribute_name(Self::ALL_ATTRIBUTES)
    }

    /// Request one attribute by name
    pub fn with_attribute_name(mut self, name: impl Into<String>) -> Self {
        self.requested_attribute_names.insert(name.into());
        self
    }

    /// Check whether a received attribute was requested
    pub fn wants(&self, name: &str) -> bool {
        self.requested_attribute_names.iter().any(|requested| {
            requested == Self::ALL_ATTRIBUTES
                || requested == ".*"
                || requested == name
                || requested
                    .strip_suffix(".*")
                    .is_some_and(|prefix| name.starts_with(&format!("{}.", prefix)))
        })
    }
}

impl From<&Options> for ListenOptions {
    /// Only the keys are used; values are ignored
    fn from(options: &Options) -> Self {
        Self {
            requested_attribute_names: options.keys().cloned().collect(),
        }
    }
}

fn check_attribute_count(count: usize) -> Result<(), ValidationError> {
    if count > MAX_MESSAGE_ATTRIBUTES {
        return Err(ValidationError::OutOfRange {
            field: "attributes".to_string(),
            message: format!("at most {} attributes per message", MAX_MESSAGE_ATTRIBUTES),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
