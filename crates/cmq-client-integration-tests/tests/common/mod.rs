//! Common test utilities for cmq-client integration tests
//!
//! This module provides:
//! - An in-memory service wired to a client
//! - Helpers for building queues, topics and subscriptions
//! - JSON response builders for wiremock-based HTTP tests

use cmq_client::transport::Subscription;
use cmq_client::{Client, ClientConfig, InMemoryService, Queue, QueueName, RetryConfig, Tag, TopicName};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

/// Default client deadline used by tests
pub const TEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client configuration that retries quickly and deterministically
#[allow(dead_code)]
pub fn test_config(endpoint: &str) -> ClientConfig {
    ClientConfig::new(endpoint, "AKIDintegration", "integration-secret", TEST_TIMEOUT).with_retry(
        RetryConfig {
            max_attempts: 2,
            initial_delay_ms: 5,
            max_delay_ms: 20,
            backoff_multiplier: 2.0,
            use_jitter: false,
        },
    )
}

// ============================================================================
// In-Memory Environment
// ============================================================================

/// A client connected to a fresh in-memory service
#[allow(dead_code)]
pub struct TestEnv {
    pub service: Arc<InMemoryService>,
    pub client: Client,
}

#[allow(dead_code)]
impl TestEnv {
    pub fn new() -> Self {
        Self::with_service(InMemoryService::new())
    }

    pub fn with_service(service: InMemoryService) -> Self {
        let service = Arc::new(service);
        let client = Client::with_transport(test_config("http://cmq.test"), service.clone())
            .expect("test configuration is valid");
        Self { service, client }
    }

    /// Create a queue on the service and return a client-side handle to it
    pub fn queue(&self, name: &str) -> Queue {
        self.service.create_queue(&queue_name(name));
        Queue::new(self.client.clone(), name).expect("valid queue name")
    }

    pub fn topic(&self, name: &str) -> cmq_client::Topic {
        self.service.create_topic(&topic_name(name));
        cmq_client::Topic::new(self.client.clone(), name).expect("valid topic name")
    }

    /// Create a queue subscribed to `topic` with a tag filter
    pub fn tag_subscriber(&self, topic: &str, queue: &str, tags: &[&str]) -> Queue {
        let handle = self.queue(queue);
        let filter: Vec<Tag> = tags.iter().map(|t| Tag::new(*t).expect("valid tag")).collect();
        self.service
            .subscribe(
                &topic_name(topic),
                Subscription::new(queue_name(queue)).with_filter_tags(filter),
            )
            .expect("topic exists");
        handle
    }

    /// Create a queue subscribed to `topic` with routing-key bindings
    pub fn key_subscriber(&self, topic: &str, queue: &str, binding_keys: &[&str]) -> Queue {
        let handle = self.queue(queue);
        self.service
            .subscribe(
                &topic_name(topic),
                Subscription::new(queue_name(queue)).with_binding_keys(binding_keys.iter().copied()),
            )
            .expect("topic exists");
        handle
    }
}

#[allow(dead_code)]
pub fn queue_name(name: &str) -> QueueName {
    QueueName::new(name).expect("valid queue name")
}

#[allow(dead_code)]
pub fn topic_name(name: &str) -> TopicName {
    TopicName::new(name).expect("valid topic name")
}

// ============================================================================
// HTTP Response Builders
// ============================================================================

#[allow(dead_code)]
pub fn send_response(msg_id: &str) -> Value {
    json!({
        "code": 0,
        "message": "",
        "requestId": "req-send",
        "msgId": msg_id
    })
}

#[allow(dead_code)]
pub fn receive_response(msg_id: &str, body: &str, handle: &str) -> Value {
    json!({
        "code": 0,
        "message": "",
        "requestId": "req-receive",
        "msgId": msg_id,
        "msgBody": body,
        "receiptHandle": handle,
        "enqueueTime": 1_700_000_000,
        "firstDequeueTime": 1_700_000_001,
        "nextVisibleTime": 1_700_000_031,
        "dequeueCount": 1
    })
}

#[allow(dead_code)]
pub fn no_message_response() -> Value {
    json!({
        "code": 7000,
        "message": "no message",
        "requestId": "req-empty"
    })
}

#[allow(dead_code)]
pub fn error_response(code: i64, message: &str) -> Value {
    json!({
        "code": code,
        "message": message,
        "requestId": "req-error"
    })
}
