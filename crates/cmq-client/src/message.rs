//! Message types and validated identifiers for queue and topic operations.

use crate::error::ValidationError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Service Limits
// ============================================================================

/// Maximum number of entries in any batch request
pub const MAX_BATCH_SIZE: usize = 16;

/// Maximum server-side long-poll hold
pub const MAX_POLLING_WAIT_SECONDS: u32 = 30;

/// Maximum visibility delay for a sent message
pub const MAX_DELAY_SECONDS: u32 = 3600;

/// Default maximum message body size in bytes
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Maximum number of tags attached to a published message
pub const MAX_TAGS: usize = 5;

const MAX_TAG_LENGTH: usize = 16;
const MAX_ROUTING_KEY_LENGTH: usize = 64;
const MAX_NAME_LENGTH: usize = 64;

// ============================================================================
// Core Domain Identifiers
// ============================================================================

/// Shared rule for queue and topic names: 1-64 chars of `[A-Za-z0-9_-]`,
/// starting with a letter.
fn validate_resource_name(field: &str, name: &str) -> Result<(), ValidationError> {
    if name.is_empty() || name.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::out_of_range(
            field,
            format!("must be 1-{} characters", MAX_NAME_LENGTH),
        ));
    }

    if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
        return Err(ValidationError::invalid_format(
            field,
            "must start with an ASCII letter",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::invalid_format(
            field,
            "only ASCII alphanumeric, hyphens, and underscores allowed",
        ));
    }

    Ok(())
}

/// Validated queue name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueueName(String);

impl QueueName {
    /// Create new queue name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_resource_name("queue_name", &name)?;
        Ok(Self(name))
    }

    /// Get queue name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for QueueName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Validated topic name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicName(String);

impl TopicName {
    /// Create new topic name with validation
    pub fn new(name: impl Into<String>) -> Result<Self, ValidationError> {
        let name = name.into();
        validate_resource_name("topic_name", &name)?;
        Ok(Self(name))
    }

    /// Get topic name as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TopicName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Server-assigned message identifier, unique per queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(String);

impl MessageId {
    /// Get message ID as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(ValidationError::Required {
                field: "message_id".to_string(),
            });
        }

        Ok(Self(s.to_string()))
    }
}

/// Opaque token for deleting a received message
///
/// Valid until the message's visibility timeout expires or the message is
/// deleted, whichever comes first.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Wrap a handle string returned by the service
    pub fn new(handle: impl Into<String>) -> Result<Self, ValidationError> {
        let handle = handle.into();
        if handle.is_empty() {
            return Err(ValidationError::Required {
                field: "receipt_handle".to_string(),
            });
        }
        Ok(Self(handle))
    }

    /// Get handle string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Filter tag attached to a published message
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Tag(String);

impl Tag {
    /// Create new tag with validation
    pub fn new(tag: impl Into<String>) -> Result<Self, ValidationError> {
        let tag = tag.into();
        if tag.is_empty() || tag.chars().count() > MAX_TAG_LENGTH {
            return Err(ValidationError::out_of_range(
                "tag",
                format!("must be 1-{} characters", MAX_TAG_LENGTH),
            ));
        }
        if tag.chars().any(|c| c.is_control() || c.is_whitespace()) {
            return Err(ValidationError::invalid_format(
                "tag",
                "whitespace and control characters are not allowed",
            ));
        }
        Ok(Self(tag))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Tag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Routing key attached to a published message (dot-separated words)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoutingKey(String);

impl RoutingKey {
    /// Create new routing key with validation
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.is_empty() || key.len() > MAX_ROUTING_KEY_LENGTH {
            return Err(ValidationError::out_of_range(
                "routing_key",
                format!("must be 1-{} characters", MAX_ROUTING_KEY_LENGTH),
            ));
        }
        if !key.is_ascii() || key.chars().any(|c| c.is_ascii_control()) {
            return Err(ValidationError::invalid_format(
                "routing_key",
                "only printable ASCII characters allowed",
            ));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Message Types
// ============================================================================

/// A message received from a queue with its delivery metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: MessageId,
    pub body: String,
    pub receipt_handle: ReceiptHandle,
    pub enqueued_at: Option<DateTime<Utc>>,
    pub first_dequeued_at: Option<DateTime<Utc>>,
    pub next_visible_at: Option<DateTime<Utc>>,
    pub dequeue_count: u32,
}

impl ReceivedMessage {
    /// Message id as assigned by the service
    pub fn msg_id(&self) -> &MessageId {
        &self.message_id
    }

    /// Message body
    pub fn msg_body(&self) -> &str {
        &self.body
    }

    /// Receipt handle required to delete this delivery
    pub fn handle(&self) -> &ReceiptHandle {
        &self.receipt_handle
    }

    /// True when this is not the first delivery of the message
    pub fn is_redelivery(&self) -> bool {
        self.dequeue_count > 1
    }
}

/// Check a message body against emptiness and the size limit
pub(crate) fn validate_body(body: &str, max_size: usize) -> Result<(), ValidationError> {
    if body.is_empty() {
        return Err(ValidationError::Required {
            field: "body".to_string(),
        });
    }
    if body.len() > max_size {
        return Err(ValidationError::out_of_range(
            "body",
            format!("{} bytes exceeds limit of {} bytes", body.len(), max_size),
        ));
    }
    Ok(())
}

/// Check the number of entries in a batch request
pub(crate) fn validate_batch_len(field: &str, len: usize) -> Result<(), ValidationError> {
    if len == 0 || len > MAX_BATCH_SIZE {
        return Err(ValidationError::out_of_range(
            field,
            format!("batch must contain 1-{} entries, got {}", MAX_BATCH_SIZE, len),
        ));
    }
    Ok(())
}

pub(crate) fn validate_delay(delay_seconds: u32) -> Result<(), ValidationError> {
    if delay_seconds > MAX_DELAY_SECONDS {
        return Err(ValidationError::out_of_range(
            "delay_seconds",
            format!("maximum {} seconds", MAX_DELAY_SECONDS),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
