//! Tests for adapter configuration loading

use super::*;
use crate::consumer::AckFailurePolicy;
use serial_test::serial;
use std::io::Write;
use std::time::Duration;

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file.flush().expect("flush config");
    file
}

fn clear_env() {
    for (key, _) in std::env::vars() {
        if key.starts_with(ENV_PREFIX) {
            std::env::remove_var(key);
        }
    }
}

// ============================================================================
// Loading
// ============================================================================

mod loading {
    use super::*;

    /// Verify that an empty environment yields the defaults.
    #[test]
    #[serial]
    fn test_load_defaults() {
        // Arrange
        clear_env();

        // Act
        let config = AdapterConfig::load(None).expect("defaults load");

        // Assert
        assert_eq!(config, AdapterConfig::default());
        assert!(config.sqs.is_none());
    }

    /// Verify that a TOML file is read, including nested sections.
    #[test]
    #[serial]
    fn test_load_toml_file() {
        // Arrange
        clear_env();
        let file = write_config(
            ".toml",
            r#"
[consumer]
max_messages = 5
wait_time_seconds = 10
visibility_timeout_seconds = 120

[consumer.idle_backoff]
initial_delay_ms = 250
max_delay_ms = 5000

[consumer.ack_failure]
mode = "retry"
max_attempts = 3

[sqs]
region = "eu-west-1"
endpoint = "http://localhost:4566"
"#,
        );

        // Act
        let config = AdapterConfig::load(Some(file.path())).expect("toml loads");

        // Assert
        assert_eq!(config.consumer.max_messages, 5);
        assert_eq!(config.consumer.wait_time_seconds, 10);
        assert_eq!(config.consumer.visibility_timeout_seconds, Some(120));
        assert_eq!(
            config.consumer.idle_backoff.initial_delay,
            Duration::from_millis(250)
        );
        assert_eq!(config.consumer.idle_backoff.max_delay, Duration::from_secs(5));
        assert_eq!(
            config.consumer.ack_failure,
            AckFailurePolicy::Retry { max_attempts: 3 }
        );

        let sqs = config.sqs.expect("sqs section");
        assert_eq!(sqs.region, "eu-west-1");
        assert_eq!(sqs.endpoint.as_deref(), Some("http://localhost:4566"));
        assert_eq!(sqs.request_timeout_seconds, 30);
    }

    /// Verify that YAML files are supported.
    #[test]
    #[serial]
    fn test_load_yaml_file() {
        // Arrange
        clear_env();
        let file = write_config(
            ".yaml",
            "consumer:\n  max_messages: 2\nmemory:\n  max_queue_size: 50\n",
        );

        // Act
        let config = AdapterConfig::load(Some(file.path())).expect("yaml loads");

        // Assert
        assert_eq!(config.consumer.max_messages, 2);
        assert_eq!(config.memory.max_queue_size, 50);
    }

    /// Verify that environment variables override file values.
    #[test]
    #[serial]
    fn test_environment_overrides_file() {
        // Arrange
        clear_env();
        let file = write_config(".toml", "[consumer]\nmax_messages = 5\n");
        std::env::set_var("QUEUE_ADAPTER__CONSUMER__MAX_MESSAGES", "3");
        std::env::set_var("QUEUE_ADAPTER__SQS__REGION", "ap-southeast-2");

        // Act
        let result = AdapterConfig::load(Some(file.path()));
        clear_env();

        // Assert
        let config = result.expect("config loads");
        assert_eq!(config.consumer.max_messages, 3);
        assert_eq!(config.sqs.expect("sqs from env").region, "ap-southeast-2");
    }

    /// Verify that a missing explicit file is an error.
    #[test]
    #[serial]
    fn test_missing_file_is_error() {
        // Arrange
        clear_env();
        let path = std::path::Path::new("/nonexistent/queue-adapter.toml");

        // Act
        let result = AdapterConfig::load(Some(path));

        // Assert
        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    /// Verify that out-of-range values are rejected after loading.
    #[test]
    #[serial]
    fn test_invalid_values_are_rejected() {
        // Arrange
        clear_env();
        let file = write_config(".toml", "[consumer]\nmax_messages = 0\n");

        // Act
        let result = AdapterConfig::load(Some(file.path()));

        // Assert
        assert!(matches!(result, Err(ConfigurationError::Invalid { .. })));
    }

    /// Verify that values of the wrong type are parsing errors.
    #[test]
    #[serial]
    fn test_wrong_type_is_parsing_error() {
        // Arrange
        clear_env();
        let file = write_config(".json", r#"{"consumer": {"max_messages": "many"}}"#);

        // Act
        let result = AdapterConfig::load(Some(file.path()));

        // Assert
        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }
}

// ============================================================================
// Validation
// ============================================================================

mod validation {
    use super::*;

    #[test]
    fn test_sqs_defaults_are_valid() {
        tokio_test::assert_ok!(SqsConfig::default().validate());
    }

    #[test]
    fn test_sqs_region_required() {
        let config = SqsConfig {
            region: " ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::Missing { .. })
        ));
    }

    #[test]
    fn test_sqs_credentials_must_be_paired() {
        let config = SqsConfig {
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sqs_timeout_must_exceed_long_poll() {
        let config = SqsConfig {
            request_timeout_seconds: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_sqs_endpoint_must_be_http() {
        let config = SqsConfig {
            endpoint: Some("localhost:4566".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_memory_capacity_rejected() {
        let config = AdapterConfig {
            memory: InMemoryConfig {
                max_queue_size: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = SqsConfig {
            access_key_id: Some("AKIDEXAMPLE".to_string()),
            secret_access_key: Some("super-secret".to_string()),
            ..Default::default()
        };

        let debug = format!("{:?}", config);

        assert!(debug.contains("AKIDEXAMPLE"));
        assert!(!debug.contains("super-secret"));
    }
}

// ============================================================================
// Adapter Construction
// ============================================================================

mod construction {
    use super::*;

    #[test]
    fn test_sqs_adapter_requires_section() {
        let result = AdapterConfig::default().sqs_adapter();

        tokio_test::assert_err!(&result);
        assert!(matches!(
            result,
            Err(QueueError::Configuration(ConfigurationError::Missing { .. }))
        ));
    }

    #[test]
    fn test_sqs_adapter_from_config() {
        let config = AdapterConfig {
            sqs: Some(SqsConfig {
                endpoint: Some("http://localhost:4566".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let adapter = config.sqs_adapter().expect("adapter builds");

        assert_eq!(adapter.transport().endpoint(), "http://localhost:4566");
    }

    #[test]
    fn test_memory_adapter_uses_consumer_settings() {
        let mut config = AdapterConfig::default();
        config.consumer.max_messages = 3;

        let adapter = config.memory_adapter().expect("adapter builds");

        assert_eq!(adapter.consumer_config().max_messages, 3);
    }
}
