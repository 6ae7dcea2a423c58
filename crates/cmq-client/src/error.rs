//! Error types for queue and topic operations.

use std::time::Duration;
use thiserror::Error;

/// Service status code returned when a long poll finished without a message.
pub const NO_MESSAGE_CODE: i64 = 7000;

/// Comprehensive error type for all client operations
#[derive(Debug, Error)]
pub enum CmqError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(#[from] ValidationError),

    #[error("Transport failure{}: {message}", status.map(|s| format!(" (HTTP {})", s)).unwrap_or_default())]
    Transport {
        message: String,
        status: Option<u16>,
    },

    #[error("Service error {code}: {message}")]
    Service {
        code: i64,
        message: String,
        request_id: Option<String>,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Malformed service response: {message}")]
    Decode { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl CmqError {
    /// Check if error is transient and should be retried
    ///
    /// Timeouts are not retried: the client deadline is a hard ceiling.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::InvalidArgument(_) => false,
            Self::Transport { status, .. } => match status {
                None => true,
                Some(code) => *code >= 500,
            },
            Self::Service { code, .. } => is_transient_service_code(*code),
            Self::Timeout { .. } => false,
            Self::Decode { .. } => false,
            Self::Configuration(_) => false,
        }
    }

    /// Check if error should be retried
    pub fn should_retry(&self) -> bool {
        self.is_transient()
    }

    /// Service status code, when the service produced one
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::Service { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get suggested retry delay
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transport { status: None, .. } => Some(Duration::from_secs(1)),
            Self::Transport { status: Some(503), .. } => Some(Duration::from_secs(2)),
            Self::Service { code, .. } if is_transient_service_code(*code) => {
                Some(Duration::from_millis(500))
            }
            _ => None,
        }
    }

    pub(crate) fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            status: None,
        }
    }

    pub(crate) fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }
}

/// Service codes in the 6000 range signal server-side busy or internal conditions.
fn is_transient_service_code(code: i64) -> bool {
    (6000..7000).contains(&code)
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
}

/// Validation errors
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

impl ValidationError {
    pub(crate) fn out_of_range(field: &str, message: impl Into<String>) -> Self {
        Self::OutOfRange {
            field: field.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn invalid_format(field: &str, message: impl Into<String>) -> Self {
        Self::InvalidFormat {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
