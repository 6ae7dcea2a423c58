//! Integration tests for the HTTP protocol against a mock service
//!
//! Tests verify:
//! - Each operation posts the expected action and parameters
//! - Responses decode into typed results
//! - Service codes map to errors, with no-message treated as empty
//! - Transient HTTP failures are retried and deadlines are enforced

mod common;

use cmq_client::{Client, CmqError, Queue, ReceiptHandle, RetryConfig, Topic};
use common::{error_response, no_message_response, receive_response, send_response, test_config};
use serde_json::json;
use std::collections::BTreeMap;
use std::time::Duration;
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn client_for(server: &MockServer) -> Client {
    Client::from_config(test_config(&server.uri())).unwrap()
}

/// Form parameters of every request the server received, in order
async fn received_params(server: &MockServer) -> Vec<BTreeMap<String, String>> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|request| {
            url::form_urlencoded::parse(&request.body)
                .into_owned()
                .collect()
        })
        .collect()
}

#[tokio::test]
async fn test_send_receive_delete_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/index.php"))
        .and(body_string_contains("Action=SendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(send_response("msg-1")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=ReceiveMessage"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(receive_response("msg-1", "hello", "h-1")),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=DeleteMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "code": 0 })))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders")
        .unwrap()
        .with_polling_wait_seconds(2)
        .unwrap();

    let sent = queue.send("hello").await.unwrap();
    assert_eq!(sent.msg_id().as_str(), "msg-1");
    assert_eq!(sent.request_id(), Some("req-send"));

    let message = queue.receive().await.unwrap().into_payload().unwrap();
    assert_eq!(message.msg_body(), "hello");
    assert_eq!(message.dequeue_count, 1);
    queue.delete(message.handle()).await.unwrap();

    let params = received_params(&server).await;
    assert_eq!(params[0]["queueName"], "orders");
    assert_eq!(params[0]["msgBody"], "hello");
    assert_eq!(params[0]["delaySeconds"], "0");
    assert_eq!(params[1]["pollingWaitSeconds"], "2");
    assert_eq!(params[2]["receiptHandle"], "h-1");
    for request in &params {
        for key in ["SecretId", "Nonce", "Timestamp", "SignatureMethod", "Signature"] {
            assert!(request.contains_key(key), "missing {}", key);
        }
        assert_eq!(request["SecretId"], "AKIDintegration");
    }
}

#[tokio::test]
async fn test_no_message_code_is_empty_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(no_message_response()))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders").unwrap();
    let response = queue.receive().await.unwrap();

    assert!(response.is_empty());
    assert_eq!(response.code(), cmq_client::NO_MESSAGE_CODE);
}

#[tokio::test]
async fn test_batch_operations_use_indexed_parameters() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=BatchSendMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msgList": [{ "msgId": "m0" }, { "msgId": "m1" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=BatchReceiveMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 0,
            "msgInfoList": [
                { "msgId": "m0", "msgBody": "first", "receiptHandle": "h0", "dequeueCount": 1 },
                { "msgId": "m1", "msgBody": "second", "receiptHandle": "h1", "dequeueCount": 2 }
            ]
        })))
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders").unwrap();

    let ids = queue.batch_send(&["first", "second"]).await.unwrap();
    let ids: Vec<&str> = ids.payload().iter().map(|id| id.as_str()).collect();
    assert_eq!(ids, vec!["m0", "m1"]);

    let received = queue.batch_receive(4).await.unwrap();
    assert_eq!(received.msg_infos().len(), 2);
    assert!(received.msg_infos()[1].is_redelivery());

    let params = received_params(&server).await;
    assert_eq!(params[0]["msgBody.0"], "first");
    assert_eq!(params[0]["msgBody.1"], "second");
    assert_eq!(params[1]["numOfMsg"], "4");
}

#[tokio::test]
async fn test_batch_delete_reports_partial_failure() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=BatchDeleteMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "code": 4460,
            "message": "partial failure",
            "errorList": [
                { "code": 4450, "message": "invalid receipt handle", "receiptHandle": "h1" }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders").unwrap();
    let handles = vec![
        ReceiptHandle::new("h0").unwrap(),
        ReceiptHandle::new("h1").unwrap(),
    ];

    let report = queue.batch_delete(&handles).await.unwrap().into_payload();

    assert_eq!(report.deleted, vec![handles[0].clone()]);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].handle, handles[1]);
    assert_eq!(report.failed[0].code, 4450);
}

#[tokio::test]
async fn test_publish_sends_tags_and_routing_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("Action=PublishMessage"))
        .respond_with(ResponseTemplate::new(200).set_body_json(send_response("topic-msg")))
        .expect(1)
        .mount(&server)
        .await;

    let topic = Topic::new(client_for(&server).await, "events")
        .unwrap()
        .with_tags(["tag2", "tag1"])
        .unwrap()
        .with_routing_key("www.qq.com")
        .unwrap();
    let published = topic.publish("page view").await.unwrap();

    assert_eq!(published.msg_id().as_str(), "topic-msg");
    let params = received_params(&server).await;
    assert_eq!(params[0]["topicName"], "events");
    assert_eq!(params[0]["msgTag.0"], "tag1");
    assert_eq!(params[0]["msgTag.1"], "tag2");
    assert_eq!(params[0]["routingKey"], "www.qq.com");
}

#[tokio::test]
async fn test_service_error_carries_code_and_request_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(error_response(4440, "queue does not exist")),
        )
        .expect(1)
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "missing").unwrap();
    let err = queue.send("hello").await.unwrap_err();

    match err {
        CmqError::Service {
            code,
            message,
            request_id,
        } => {
            assert_eq!(code, 4440);
            assert_eq!(message, "queue does not exist");
            assert_eq!(request_id.as_deref(), Some("req-error"));
        }
        other => panic!("expected service error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_server_errors_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(send_response("after-retry")))
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders").unwrap();
    let sent = queue.send("persistent").await.unwrap();

    assert_eq!(sent.msg_id().as_str(), "after-retry");
    assert_eq!(server.received_requests().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_malformed_response_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .expect(1)
        .mount(&server)
        .await;

    let queue = Queue::new(client_for(&server).await, "orders").unwrap();
    let err = queue.send("hello").await.unwrap_err();

    assert!(matches!(err, CmqError::Decode { .. }));
}

#[tokio::test]
async fn test_slow_service_hits_client_deadline() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(send_response("too-late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let config = cmq_client::ClientConfig::new(
        server.uri(),
        "AKIDintegration",
        "integration-secret",
        Duration::from_millis(500),
    )
    .with_retry(RetryConfig::disabled());
    let queue = Queue::new(Client::from_config(config).unwrap(), "orders").unwrap();

    let err = queue.send("hello").await.unwrap_err();

    assert!(matches!(err, CmqError::Timeout { .. }));
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}
