//! Adapter configuration loaded from files and the environment.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!  1. An optional configuration file (TOML, YAML or JSON, chosen by extension)
//!  2. Environment variables prefixed `QUEUE_ADAPTER__` with `__` separators,
//!     e.g. `QUEUE_ADAPTER__CONSUMER__MAX_MESSAGES=5`
//!
//! Every field carries a serde default, so an empty environment produces a
//! valid configuration.

use crate::adapter::TransportAdapter;
use crate::consumer::{ConsumerConfig, MAX_WAIT_TIME_SECONDS};
use crate::error::{ConfigurationError, QueueError};
use crate::providers::memory::{InMemoryConfig, InMemoryTransport};
use crate::providers::sqs::SqsTransport;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Prefix of environment variables read by [`AdapterConfig::load`]
pub const ENV_PREFIX: &str = "QUEUE_ADAPTER";

/// Top-level adapter configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterConfig {
    /// Consumer loop settings shared by every listener
    pub consumer: ConsumerConfig,
    /// AWS SQS connection settings, absent when SQS is not used
    pub sqs: Option<SqsConfig>,
    /// In-memory transport settings
    pub memory: InMemoryConfig,
}

impl AdapterConfig {
    /// Load configuration from an optional file and the environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::Parsing`] when a source cannot be read or
    /// deserialized and [`ConfigurationError::Invalid`] when validation fails.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading adapter configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let config: Self = settings
            .try_deserialize()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Check every section against provider limits
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.consumer.validate()?;

        if let Some(sqs) = &self.sqs {
            sqs.validate()?;
        }

        if self.memory.max_queue_size == 0 {
            return Err(ConfigurationError::Invalid {
                message: "memory.max_queue_size must be at least 1".to_string(),
            });
        }

        Ok(())
    }

    /// Build an SQS-backed adapter from the `sqs` section
    pub fn sqs_adapter(&self) -> Result<TransportAdapter<SqsTransport>, QueueError> {
        let sqs = self.sqs.clone().ok_or_else(|| ConfigurationError::Missing {
            key: "sqs".to_string(),
        })?;
        sqs.validate()?;

        let transport = SqsTransport::new(sqs).map_err(|e| {
            QueueError::Configuration(ConfigurationError::Invalid {
                message: e.to_string(),
            })
        })?;

        Ok(TransportAdapter::new(transport).with_consumer_config(self.consumer.clone())?)
    }

    /// Build an adapter over a fresh in-memory transport
    pub fn memory_adapter(&self) -> Result<TransportAdapter<InMemoryTransport>, QueueError> {
        let transport = InMemoryTransport::new(self.memory.clone());
        Ok(TransportAdapter::new(transport).with_consumer_config(self.consumer.clone())?)
    }
}

/// AWS SQS connection settings
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqsConfig {
    /// AWS region, e.g. `us-east-1`
    pub region: String,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Endpoint override for LocalStack or other compatible services
    pub endpoint: Option<String>,
    /// HTTP timeout per request; must exceed the long-poll wait
    pub request_timeout_seconds: u64,
}

impl Default for SqsConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint: None,
            request_timeout_seconds: 30,
        }
    }
}

impl SqsConfig {
    /// Check region, credential pairing and timeout
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.region.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "sqs.region".to_string(),
            });
        }

        if self.access_key_id.is_some() != self.secret_access_key.is_some() {
            return Err(ConfigurationError::Invalid {
                message: "sqs.access_key_id and sqs.secret_access_key must be set together"
                    .to_string(),
            });
        }

        if self.request_timeout_seconds <= u64::from(MAX_WAIT_TIME_SECONDS) {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "sqs.request_timeout_seconds must exceed the {} second long-poll wait",
                    MAX_WAIT_TIME_SECONDS
                ),
            });
        }

        if let Some(endpoint) = &self.endpoint {
            if !endpoint.starts_with("http://") && !endpoint.starts_with("https://") {
                return Err(ConfigurationError::Invalid {
                    message: format!("sqs.endpoint '{}' must be an http(s) URL", endpoint),
                });
            }
        }

        Ok(())
    }
}

impl std::fmt::Debug for SqsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqsConfig")
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "<REDACTED>"),
            )
            .field("endpoint", &self.endpoint)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}
