//! Tests for the client and its low-level operations.

use super::*;
use crate::config::RetryConfig;
use crate::error::NO_MESSAGE_CODE;
use crate::transport::memory::{Fault, InMemoryService};
use async_trait::async_trait;
use serde_json::json;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config() -> ClientConfig {
    ClientConfig::new("http://cmq.local", "AKIDtest", "secret", Duration::from_secs(5))
}

fn queue() -> QueueName {
    QueueName::new("orders").unwrap()
}

fn memory_client() -> (Arc<InMemoryService>, Client) {
    let service = Arc::new(InMemoryService::new());
    service.create_queue(&queue());
    let client = Client::with_transport(config(), service.clone()).unwrap();
    (service, client)
}

/// Transport that never answers within any reasonable deadline
struct StallingTransport;

#[async_trait]
impl Transport for StallingTransport {
    async fn call(&self, _request: &Request) -> Result<RawResponse, CmqError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(RawResponse::new(200, "{\"code\":0}"))
    }

    fn name(&self) -> &'static str {
        "stalling"
    }
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_client_new_validates_configuration() {
    let err = Client::new("", "id", "key", Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, CmqError::Configuration(_)));

    let err = Client::new("https://cmq.example.com", "", "key", Duration::from_secs(5)).unwrap_err();
    assert!(matches!(err, CmqError::Configuration(_)));
}

#[test]
fn test_client_exposes_configuration() {
    let client = Client::new(
        "https://cmq.example.com",
        "id",
        "key",
        Duration::from_secs(7),
    )
    .unwrap();

    assert_eq!(client.timeout(), Duration::from_secs(7));
    assert_eq!(client.config().endpoint, "https://cmq.example.com");
    assert_eq!(client.retry_policy().max_attempts, 3);

    let debug_str = format!("{:?}", client);
    assert!(debug_str.contains("http"));
    assert!(!debug_str.contains("key"));
}

#[test]
fn test_polling_wait_validation() {
    let (_, client) = memory_client();

    assert!(client.validate_polling_wait(0).is_ok());
    assert!(client.validate_polling_wait(4).is_ok());
    // Equal to the 5s timeout
    assert!(client.validate_polling_wait(5).is_err());
    assert!(client.validate_polling_wait(MAX_POLLING_WAIT_SECONDS + 1).is_err());
}

// ============================================================================
// Operations Against The In-Memory Service
// ============================================================================

#[tokio::test]
async fn test_invalid_body_rejected_before_sending() {
    let (service, client) = memory_client();

    let err = client.send_message(&queue(), "", 0).await.unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    let oversized = "x".repeat(client.config().max_message_size + 1);
    let err = client.send_message(&queue(), &oversized, 0).await.unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    let err = client.send_message(&queue(), "ok", 3601).await.unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    assert_eq!(service.request_count(), 0);
}

#[tokio::test]
async fn test_batch_limits_enforced() {
    let (service, client) = memory_client();
    let bodies: Vec<String> = (0..17).map(|i| i.to_string()).collect();

    let err = client
        .batch_send_message(&queue(), &bodies, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    let err = client
        .batch_receive_message(&queue(), 0, 0)
        .await
        .unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    let no_handles: Vec<ReceiptHandle> = Vec::new();
    let err = client
        .batch_delete_message(&queue(), &no_handles)
        .await
        .unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));

    assert_eq!(service.request_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_send_message_with_delay() {
    let (_, client) = memory_client();

    client.send_message(&queue(), "delayed", 3).await.unwrap();

    let early = client.receive_message(&queue(), 1).await.unwrap();
    assert!(early.is_empty());
    assert_eq!(early.code(), NO_MESSAGE_CODE);

    tokio::time::sleep(Duration::from_secs(3)).await;
    let late = client.receive_message(&queue(), 0).await.unwrap();
    assert_eq!(late.msg_body(), Some("delayed"));
}

#[tokio::test]
async fn test_too_many_tags_rejected() {
    let (_, client) = memory_client();
    let topic = TopicName::new("events").unwrap();
    let tags: Vec<Tag> = (0..6).map(|i| Tag::new(format!("t{}", i)).unwrap()).collect();

    let err = client
        .publish_message(&topic, "body", &tags, None)
        .await
        .unwrap_err();
    assert!(matches!(err, CmqError::InvalidArgument(_)));
}

#[tokio::test(start_paused = true)]
async fn test_transient_service_code_retried() {
    let (service, client) = memory_client();
    service.inject_fault(Fault::ServiceCode(6000));

    let response = client.send_message(&queue(), "hello", 0).await.unwrap();

    assert_eq!(response.code(), 0);
    assert_eq!(service.request_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_client_error_status_not_retried() {
    let (service, client) = memory_client();
    service.inject_fault(Fault::HttpStatus(400));

    let err = client.send_message(&queue(), "hello", 0).await.unwrap_err();

    assert!(matches!(err, CmqError::Transport { status: Some(400), .. }));
    assert_eq!(service.request_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_deadline_enforced_per_request() {
    let client = Client::with_transport(config(), Arc::new(StallingTransport)).unwrap();

    let err = client.send_message(&queue(), "hello", 0).await.unwrap_err();

    match err {
        CmqError::Timeout { duration } => assert_eq!(duration, Duration::from_secs(5)),
        other => panic!("expected timeout, got {:?}", other),
    }
}

// ============================================================================
// HTTP Retries
// ============================================================================

#[tokio::test]
async fn test_http_5xx_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "message": "",
            "requestId": "req-1",
            "msgId": "m-1"
        })))
        .mount(&server)
        .await;

    let retry = RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 1,
        max_delay_ms: 10,
        backoff_multiplier: 2.0,
        use_jitter: false,
    };
    let config = ClientConfig::new(server.uri(), "AKIDtest", "secret", Duration::from_secs(5))
        .with_retry(retry);
    let client = Client::from_config(config).unwrap();

    let response = client.send_message(&queue(), "hello", 0).await.unwrap();

    assert_eq!(response.msg_id().as_str(), "m-1");
    assert_eq!(response.request_id(), Some("req-1"));
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}
