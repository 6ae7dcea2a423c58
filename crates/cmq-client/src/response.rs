//! Response decoding.
//!
//! The service answers every action with a JSON object carrying `code`,
//! `message` and `requestId` plus operation-specific fields. This module owns
//! the wire representation (shared with the in-memory service) and turns raw
//! responses into typed [`Response`] values or [`CmqError`]s.

use crate::error::{CmqError, NO_MESSAGE_CODE};
use crate::message::{MessageId, ReceiptHandle, ReceivedMessage};
use crate::transport::RawResponse;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

// ============================================================================
// Typed Responses
// ============================================================================

/// Result of a successful service call
///
/// `code` is `0` for a normal success and [`NO_MESSAGE_CODE`] when a long
/// poll ended without a message; in that case the payload is empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<T> {
    code: i64,
    message: String,
    request_id: Option<String>,
    payload: T,
}

impl<T> Response<T> {
    pub(crate) fn new(code: i64, message: String, request_id: Option<String>, payload: T) -> Self {
        Self {
            code,
            message,
            request_id,
            payload,
        }
    }

    /// Service status code
    pub fn code(&self) -> i64 {
        self.code
    }

    /// Human-readable status message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Service-assigned request identifier, useful when reporting problems
    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }

    /// Transform the payload while keeping status metadata
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Response<U> {
        Response {
            code: self.code,
            message: self.message,
            request_id: self.request_id,
            payload: f(self.payload),
        }
    }
}

impl Response<MessageId> {
    pub fn msg_id(&self) -> &MessageId {
        &self.payload
    }
}

impl Response<Option<ReceivedMessage>> {
    /// True when the polling window elapsed without a message
    pub fn is_empty(&self) -> bool {
        self.payload.is_none()
    }

    pub fn msg_id(&self) -> Option<&MessageId> {
        self.payload.as_ref().map(ReceivedMessage::msg_id)
    }

    pub fn msg_body(&self) -> Option<&str> {
        self.payload.as_ref().map(ReceivedMessage::msg_body)
    }

    pub fn handle(&self) -> Option<&ReceiptHandle> {
        self.payload.as_ref().map(ReceivedMessage::handle)
    }
}

impl Response<Vec<ReceivedMessage>> {
    /// Received messages, in service order
    pub fn msg_infos(&self) -> &[ReceivedMessage] {
        &self.payload
    }
}

/// Outcome of a best-effort batch delete
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchDeleteReport {
    pub deleted: Vec<ReceiptHandle>,
    pub failed: Vec<DeleteFailure>,
}

impl BatchDeleteReport {
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// A handle the service refused to delete
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteFailure {
    pub handle: ReceiptHandle,
    pub code: i64,
    pub message: String,
}

// ============================================================================
// Wire Format
// ============================================================================

/// JSON body of every service response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireResponse {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg_body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enqueue_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_dequeue_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_visible_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dequeue_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub msg_info_list: Vec<WireMessage>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub msg_list: Vec<WireMessageId>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub error_list: Vec<WireDeleteError>,
}

impl WireResponse {
    pub fn success() -> Self {
        Self {
            code: 0,
            ..Default::default()
        }
    }

    pub fn error(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            ..Default::default()
        }
    }

    /// Single-message receive body: message fields sit at the top level
    pub fn with_message(mut self, message: WireMessage) -> Self {
        self.msg_id = Some(message.msg_id);
        self.msg_body = Some(message.msg_body);
        self.receipt_handle = Some(message.receipt_handle);
        self.enqueue_time = message.enqueue_time;
        self.first_dequeue_time = message.first_dequeue_time;
        self.next_visible_time = message.next_visible_time;
        self.dequeue_count = message.dequeue_count;
        self
    }

    /// Inverse of [`WireResponse::with_message`]
    fn take_message(&mut self) -> Option<WireMessage> {
        Some(WireMessage {
            msg_id: self.msg_id.take()?,
            msg_body: self.msg_body.take()?,
            receipt_handle: self.receipt_handle.take()?,
            enqueue_time: self.enqueue_time.take(),
            first_dequeue_time: self.first_dequeue_time.take(),
            next_visible_time: self.next_visible_time.take(),
            dequeue_count: self.dequeue_count.take(),
        })
    }
}

/// One delivered message as it appears on the wire (times in unix seconds)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessage {
    pub msg_id: String,
    pub msg_body: String,
    pub receipt_handle: String,
    #[serde(default)]
    pub enqueue_time: Option<i64>,
    #[serde(default)]
    pub first_dequeue_time: Option<i64>,
    #[serde(default)]
    pub next_visible_time: Option<i64>,
    #[serde(default)]
    pub dequeue_count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireMessageId {
    pub msg_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WireDeleteError {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub receipt_handle: String,
}

// ============================================================================
// Decoding
// ============================================================================

/// Check the HTTP status and parse the JSON body
fn parse(raw: &RawResponse) -> Result<WireResponse, CmqError> {
    if !(200..300).contains(&raw.status) {
        // Some gateways still return a JSON body explaining the failure
        let detail = serde_json::from_str::<WireResponse>(&raw.body)
            .ok()
            .map(|wire| wire.message)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| truncate(&raw.body, 200));
        return Err(CmqError::Transport {
            message: detail,
            status: Some(raw.status),
        });
    }

    serde_json::from_str(&raw.body).map_err(|e| {
        CmqError::decode(format!(
            "invalid JSON response ({}): {}",
            e,
            truncate(&raw.body, 200)
        ))
    })
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    }
}

fn service_error(wire: WireResponse) -> CmqError {
    CmqError::Service {
        code: wire.code,
        message: wire.message,
        request_id: wire.request_id,
    }
}

/// Parse and require `code == 0`
fn parse_success(raw: &RawResponse) -> Result<WireResponse, CmqError> {
    let wire = parse(raw)?;
    if wire.code != 0 {
        return Err(service_error(wire));
    }
    Ok(wire)
}

/// Parse, accepting the "no message" code as an empty success
fn parse_long_poll(raw: &RawResponse) -> Result<(WireResponse, bool), CmqError> {
    let wire = parse(raw)?;
    match wire.code {
        0 => Ok((wire, false)),
        NO_MESSAGE_CODE => Ok((wire, true)),
        _ => Err(service_error(wire)),
    }
}

fn timestamp(secs: Option<i64>) -> Option<DateTime<Utc>> {
    secs.and_then(|s| DateTime::from_timestamp(s, 0))
}

fn message_id(raw: &str) -> Result<MessageId, CmqError> {
    MessageId::from_str(raw).map_err(|_| CmqError::decode("empty msgId in response"))
}

fn received_message(wire: WireMessage) -> Result<ReceivedMessage, CmqError> {
    Ok(ReceivedMessage {
        message_id: message_id(&wire.msg_id)?,
        receipt_handle: ReceiptHandle::new(wire.receipt_handle)
            .map_err(|_| CmqError::decode("empty receiptHandle in response"))?,
        body: wire.msg_body,
        enqueued_at: timestamp(wire.enqueue_time),
        first_dequeued_at: timestamp(wire.first_dequeue_time),
        next_visible_at: timestamp(wire.next_visible_time),
        dequeue_count: wire.dequeue_count.unwrap_or(1),
    })
}

/// Decode SendMessage and PublishMessage responses
pub(crate) fn decode_message_id(raw: &RawResponse) -> Result<Response<MessageId>, CmqError> {
    let wire = parse_success(raw)?;
    let id = wire
        .msg_id
        .as_deref()
        .ok_or_else(|| CmqError::decode("msgId missing from response"))
        .and_then(message_id)?;
    Ok(Response::new(wire.code, wire.message, wire.request_id, id))
}

/// Decode BatchSendMessage and BatchPublishMessage responses
///
/// Batches are accepted atomically, so the service must return exactly one id
/// per submitted body.
pub(crate) fn decode_message_ids(
    raw: &RawResponse,
    expected: usize,
) -> Result<Response<Vec<MessageId>>, CmqError> {
    let wire = parse_success(raw)?;
    if wire.msg_list.len() != expected {
        return Err(CmqError::decode(format!(
            "expected {} message ids, response contained {}",
            expected,
            wire.msg_list.len()
        )));
    }
    let ids = wire
        .msg_list
        .iter()
        .map(|entry| message_id(&entry.msg_id))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Response::new(wire.code, wire.message, wire.request_id, ids))
}

/// Decode ReceiveMessage responses
pub(crate) fn decode_receive(
    raw: &RawResponse,
) -> Result<Response<Option<ReceivedMessage>>, CmqError> {
    let (mut wire, empty) = parse_long_poll(raw)?;
    if empty {
        return Ok(Response::new(wire.code, wire.message, wire.request_id, None));
    }
    let info = wire
        .take_message()
        .ok_or_else(|| CmqError::decode("message fields missing from receive response"))?;
    let message = received_message(info)?;
    Ok(Response::new(
        wire.code,
        wire.message,
        wire.request_id,
        Some(message),
    ))
}

/// Decode BatchReceiveMessage responses
pub(crate) fn decode_batch_receive(
    raw: &RawResponse,
) -> Result<Response<Vec<ReceivedMessage>>, CmqError> {
    let (wire, empty) = parse_long_poll(raw)?;
    let messages = if empty {
        Vec::new()
    } else {
        wire.msg_info_list
            .into_iter()
            .map(received_message)
            .collect::<Result<Vec<_>, _>>()?
    };
    Ok(Response::new(wire.code, wire.message, wire.request_id, messages))
}

/// Decode DeleteMessage responses
pub(crate) fn decode_empty(raw: &RawResponse) -> Result<Response<()>, CmqError> {
    let wire = parse_success(raw)?;
    Ok(Response::new(wire.code, wire.message, wire.request_id, ()))
}

/// Decode BatchDeleteMessage responses
///
/// A non-zero code with per-handle detail is a partial success; without
/// detail the whole request failed.
pub(crate) fn decode_batch_delete(
    raw: &RawResponse,
    handles: &[ReceiptHandle],
) -> Result<Response<BatchDeleteReport>, CmqError> {
    let wire = parse(raw)?;
    if wire.code != 0 && wire.error_list.is_empty() {
        return Err(service_error(wire));
    }

    let failed = wire
        .error_list
        .iter()
        .map(|entry| {
            Ok(DeleteFailure {
                handle: ReceiptHandle::new(entry.receipt_handle.clone())
                    .map_err(|_| CmqError::decode("empty receiptHandle in errorList"))?,
                code: entry.code,
                message: entry.message.clone(),
            })
        })
        .collect::<Result<Vec<_>, CmqError>>()?;

    let deleted = handles
        .iter()
        .filter(|handle| !failed.iter().any(|f| &f.handle == *handle))
        .cloned()
        .collect();

    Ok(Response::new(
        wire.code,
        wire.message,
        wire.request_id,
        BatchDeleteReport { deleted, failed },
    ))
}

#[cfg(test)]
#[path = "response_tests.rs"]
mod tests;
