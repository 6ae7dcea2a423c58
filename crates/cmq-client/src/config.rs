//! Client configuration and its layered loading.
//!
//! Sources are applied in order, later sources overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. An optional configuration file (format inferred from the extension)
//! 3. Environment variables with the `CMQ` prefix and `__` separator,
//!    e.g. `CMQ__TIMEOUT_MS=8000` or `CMQ__RETRY__MAX_ATTEMPTS=5`

use crate::error::ConfigurationError;
use crate::message::DEFAULT_MAX_MESSAGE_SIZE;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Environment variable prefix used by [`ClientConfig::load`]
pub const ENV_PREFIX: &str = "CMQ";

const MAX_CONFIGURABLE_MESSAGE_SIZE: usize = 1024 * 1024;

/// Secret access key, wiped from memory on drop and redacted in debug output
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Get secret as string (only for immediate use)
    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("<REDACTED>")
    }
}

/// HMAC algorithm used to sign requests
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureMethod {
    #[default]
    HmacSHA256,
    HmacSHA1,
}

impl SignatureMethod {
    /// Wire name sent in the `SignatureMethod` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::HmacSHA256 => "HmacSHA256",
            Self::HmacSHA1 => "HmacSHA1",
        }
    }
}

/// Configuration for a client connection to the queue service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Service endpoint, e.g. `https://cmq-gz.public.tencenttdmq.com`
    pub endpoint: String,

    /// Access key id
    pub secret_id: String,

    /// Access key secret
    pub secret_key: SecretKey,

    /// Hard ceiling on any single request, in milliseconds
    pub timeout_ms: u64,

    /// Log full request parameters and raw responses at debug level
    pub debug: bool,

    pub signature_method: SignatureMethod,

    /// Maximum accepted message body size in bytes
    pub max_message_size: usize,

    /// Retry behaviour for transient failures
    pub retry: RetryConfig,

    pub logging: LoggingConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            secret_id: String::new(),
            secret_key: SecretKey::default(),
            timeout_ms: 35_000,
            debug: false,
            signature_method: SignatureMethod::default(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Create configuration from the four values every client needs
    pub fn new(
        endpoint: impl Into<String>,
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            secret_id: secret_id.into(),
            secret_key: SecretKey::new(secret_key),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            ..Default::default()
        }
    }

    /// Request timeout as a `Duration`
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Enable or disable debug logging of requests and responses
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_signature_method(mut self, method: SignatureMethod) -> Self {
        self.signature_method = method;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Load configuration from an optional file plus `CMQ__*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_prefix(path, ENV_PREFIX)
    }

    /// Load configuration using a custom environment variable prefix
    pub fn load_with_prefix(path: Option<&Path>, prefix: &str) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
            tracing::debug!(path = %path.display(), "Loading client configuration file");
        }

        let settings = builder
            .add_source(config::Environment::with_prefix(prefix).separator("__"))
            .build()
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        let loaded: ClientConfig =
            settings
                .try_deserialize()
                .map_err(|e| ConfigurationError::Parsing {
                    message: e.to_string(),
                })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigurationError::Missing {
                key: "endpoint".to_string(),
            });
        }

        let url = url::Url::parse(&self.endpoint).map_err(|e| ConfigurationError::Invalid {
            message: format!("endpoint '{}' is not a valid URL: {}", self.endpoint, e),
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ConfigurationError::Invalid {
                message: format!("endpoint scheme must be http or https, got '{}'", url.scheme()),
            });
        }
        if url.host_str().is_none() {
            return Err(ConfigurationError::Invalid {
                message: "endpoint must include a host".to_string(),
            });
        }

        if self.secret_id.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "secret_id".to_string(),
            });
        }
        if self.secret_key.is_empty() {
            return Err(ConfigurationError::Missing {
                key: "secret_key".to_string(),
            });
        }

        if self.timeout_ms == 0 {
            return Err(ConfigurationError::Invalid {
                message: "timeout_ms must be greater than zero".to_string(),
            });
        }

        if self.max_message_size == 0 || self.max_message_size > MAX_CONFIGURABLE_MESSAGE_SIZE {
            return Err(ConfigurationError::Invalid {
                message: format!(
                    "max_message_size must be 1-{} bytes",
                    MAX_CONFIGURABLE_MESSAGE_SIZE
                ),
            });
        }

        self.retry.validate()?;

        Ok(())
    }
}

/// Retry behaviour for transient transport and service failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum retry attempts after the initial request
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds
    pub initial_delay_ms: u64,

    /// Cap on any single retry delay, in milliseconds
    pub max_delay_ms: u64,

    /// Exponential backoff multiplier
    pub backoff_multiplier: f64,

    /// Randomise delays by ±25%
    pub use_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            max_delay_ms: 5_000,
            backoff_multiplier: 2.0,
            use_jitter: true,
        }
    }
}

impl RetryConfig {
    /// Configuration that never retries
    pub fn disabled() -> Self {
        Self {
            max_attempts: 0,
            ..Default::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigurationError> {
        if self.backoff_multiplier < 1.0 {
            return Err(ConfigurationError::Invalid {
                message: "retry.backoff_multiplier must be at least 1.0".to_string(),
            });
        }
        if self.initial_delay_ms > self.max_delay_ms {
            return Err(ConfigurationError::Invalid {
                message: "retry.initial_delay_ms must not exceed retry.max_delay_ms".to_string(),
            });
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json_format: false,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
