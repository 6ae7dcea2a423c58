//! Logical requests sent to the queue service.
//!
//! A [`Request`] is the operation name plus its operation-specific
//! parameters. Common parameters and the signature are added by the transport
//! at send time, so one `Request` can be retried and re-signed safely.

use crate::message::{QueueName, ReceiptHandle, RoutingKey, Tag, TopicName};
use std::collections::BTreeMap;
use std::fmt;

/// Operations understood by the queue service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    SendMessage,
    BatchSendMessage,
    ReceiveMessage,
    BatchReceiveMessage,
    DeleteMessage,
    BatchDeleteMessage,
    PublishMessage,
    BatchPublishMessage,
}

impl Action {
    /// Wire name of the action
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SendMessage => "SendMessage",
            Self::BatchSendMessage => "BatchSendMessage",
            Self::ReceiveMessage => "ReceiveMessage",
            Self::BatchReceiveMessage => "BatchReceiveMessage",
            Self::DeleteMessage => "DeleteMessage",
            Self::BatchDeleteMessage => "BatchDeleteMessage",
            Self::PublishMessage => "PublishMessage",
            Self::BatchPublishMessage => "BatchPublishMessage",
        }
    }

    /// Parse a wire action name
    pub fn from_wire(name: &str) -> Option<Self> {
        let action = match name {
            "SendMessage" => Self::SendMessage,
            "BatchSendMessage" => Self::BatchSendMessage,
            "ReceiveMessage" => Self::ReceiveMessage,
            "BatchReceiveMessage" => Self::BatchReceiveMessage,
            "DeleteMessage" => Self::DeleteMessage,
            "BatchDeleteMessage" => Self::BatchDeleteMessage,
            "PublishMessage" => Self::PublishMessage,
            "BatchPublishMessage" => Self::BatchPublishMessage,
            _ => return None,
        };
        Some(action)
    }

    /// Whether the service may hold the request open waiting for messages
    pub fn is_long_poll(&self) -> bool {
        matches!(self, Self::ReceiveMessage | Self::BatchReceiveMessage)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single logical request to the service
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    action: Action,
    params: BTreeMap<String, String>,
}

impl Request {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            params: BTreeMap::new(),
        }
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    /// Add `prefix.0`, `prefix.1`, ... entries
    fn with_indexed<I, S>(mut self, prefix: &str, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for (idx, value) in values.into_iter().enumerate() {
            self.params
                .insert(format!("{}.{}", prefix, idx), value.as_ref().to_string());
        }
        self
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Collect the values of `prefix.0`, `prefix.1`, ... in index order
    pub fn indexed_params(&self, prefix: &str) -> Vec<&str> {
        let mut entries: Vec<(usize, &str)> = self
            .params
            .iter()
            .filter_map(|(k, v)| {
                let idx = k.strip_prefix(prefix)?.strip_prefix('.')?;
                Some((idx.parse().ok()?, v.as_str()))
            })
            .collect();
        entries.sort_by_key(|(idx, _)| *idx);
        entries.into_iter().map(|(_, v)| v).collect()
    }

    /// Operation parameters including `Action`, ready for signing
    pub fn to_wire_params(&self) -> BTreeMap<String, String> {
        let mut params = self.params.clone();
        params.insert("Action".to_string(), self.action.as_str().to_string());
        params
    }

    /// Rebuild a request from decoded wire parameters
    pub fn from_wire_params(mut params: BTreeMap<String, String>) -> Option<Self> {
        let action = Action::from_wire(&params.remove("Action")?)?;
        Some(Self { action, params })
    }

    /// Long-poll hold requested from the service, in seconds
    pub fn polling_wait_seconds(&self) -> Option<u32> {
        self.param("pollingWaitSeconds")?.parse().ok()
    }

    /// Queue or topic name the request addresses, for logging
    pub fn resource(&self) -> Option<&str> {
        self.param("queueName").or_else(|| self.param("topicName"))
    }

    // ------------------------------------------------------------------------
    // Operation builders
    // ------------------------------------------------------------------------

    pub fn send_message(queue: &QueueName, body: &str, delay_seconds: u32) -> Self {
        Self::new(Action::SendMessage)
            .with_param("queueName", queue.as_str())
            .with_param("msgBody", body)
            .with_param("delaySeconds", delay_seconds)
    }

    pub fn batch_send_message<S: AsRef<str>>(
        queue: &QueueName,
        bodies: &[S],
        delay_seconds: u32,
    ) -> Self {
        Self::new(Action::BatchSendMessage)
            .with_param("queueName", queue.as_str())
            .with_param("delaySeconds", delay_seconds)
            .with_indexed("msgBody", bodies)
    }

    pub fn receive_message(queue: &QueueName, polling_wait_seconds: u32) -> Self {
        Self::new(Action::ReceiveMessage)
            .with_param("queueName", queue.as_str())
            .with_param("pollingWaitSeconds", polling_wait_seconds)
    }

    pub fn batch_receive_message(
        queue: &QueueName,
        max_count: usize,
        polling_wait_seconds: u32,
    ) -> Self {
        Self::new(Action::BatchReceiveMessage)
            .with_param("queueName", queue.as_str())
            .with_param("numOfMsg", max_count)
            .with_param("pollingWaitSeconds", polling_wait_seconds)
    }

    pub fn delete_message(queue: &QueueName, handle: &ReceiptHandle) -> Self {
        Self::new(Action::DeleteMessage)
            .with_param("queueName", queue.as_str())
            .with_param("receiptHandle", handle.as_str())
    }

    pub fn batch_delete_message(queue: &QueueName, handles: &[ReceiptHandle]) -> Self {
        Self::new(Action::BatchDeleteMessage)
            .with_param("queueName", queue.as_str())
            .with_indexed("receiptHandle", handles.iter().map(ReceiptHandle::as_str))
    }

    pub fn publish_message(
        topic: &TopicName,
        body: &str,
        tags: &[Tag],
        routing_key: Option<&RoutingKey>,
    ) -> Self {
        Self::new(Action::PublishMessage)
            .with_param("topicName", topic.as_str())
            .with_param("msgBody", body)
            .with_filters(tags, routing_key)
    }

    pub fn batch_publish_message<S: AsRef<str>>(
        topic: &TopicName,
        bodies: &[S],
        tags: &[Tag],
        routing_key: Option<&RoutingKey>,
    ) -> Self {
        Self::new(Action::BatchPublishMessage)
            .with_param("topicName", topic.as_str())
            .with_indexed("msgBody", bodies)
            .with_filters(tags, routing_key)
    }

    fn with_filters(self, tags: &[Tag], routing_key: Option<&RoutingKey>) -> Self {
        let request = self.with_indexed("msgTag", tags.iter().map(Tag::as_str));
        match routing_key {
            Some(key) => request.with_param("routingKey", key.as_str()),
            None => request,
        }
    }
}

#[cfg(test)]
#[path = "request_tests.rs"]
mod tests;
