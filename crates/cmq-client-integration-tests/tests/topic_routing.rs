//! Integration tests for topic fan-out
//!
//! Tests verify:
//! - Tag filters deliver only to subscribers sharing a tag
//! - Routing keys match `*` and `#` binding patterns
//! - Batch publish fans every body out to every matching subscriber

mod common;

use cmq_client::CmqError;
use common::TestEnv;

#[tokio::test(start_paused = true)]
async fn test_tagged_publish_reaches_only_matching_subscribers() {
    let env = TestEnv::new();
    let topic = env.topic("news");
    let tag1 = env.tag_subscriber("news", "tag1-queue", &["tag1"]);
    let tag2 = env.tag_subscriber("news", "tag2-queue", &["tag2"]);
    let everything = env.tag_subscriber("news", "all-queue", &[]);

    let published = topic
        .with_tags(["tag1"])
        .unwrap()
        .publish("for tag1")
        .await
        .unwrap();

    let delivered = tag1.receive().await.unwrap();
    assert_eq!(delivered.msg_body(), Some("for tag1"));
    assert_eq!(delivered.msg_id(), Some(published.msg_id()));

    assert!(tag2.receive().await.unwrap().is_empty());
    assert_eq!(everything.receive().await.unwrap().msg_body(), Some("for tag1"));
}

#[tokio::test(start_paused = true)]
async fn test_untagged_publish_skips_filtered_subscribers() {
    let env = TestEnv::new();
    let topic = env.topic("news");
    let filtered = env.tag_subscriber("news", "filtered", &["sports"]);
    let unfiltered = env.tag_subscriber("news", "unfiltered", &[]);

    topic.publish("plain").await.unwrap();

    assert!(filtered.receive().await.unwrap().is_empty());
    assert_eq!(unfiltered.receive().await.unwrap().msg_body(), Some("plain"));
}

#[tokio::test(start_paused = true)]
async fn test_routing_key_wildcards() {
    let env = TestEnv::new();
    let topic = env.topic("logs");
    let single = env.key_subscriber("logs", "one-word", &["app.*.error"]);
    let multi = env.key_subscriber("logs", "any-depth", &["app.#"]);
    let other = env.key_subscriber("logs", "other-app", &["billing.#"]);

    topic
        .clone()
        .with_routing_key("app.api.error")
        .unwrap()
        .publish("api failed")
        .await
        .unwrap();
    topic
        .with_routing_key("app.api.v2.error")
        .unwrap()
        .publish("deep failure")
        .await
        .unwrap();

    let single_batch = single.batch_receive(16).await.unwrap();
    let bodies: Vec<&str> = single_batch
        .msg_infos()
        .iter()
        .map(|m| m.msg_body())
        .collect();
    assert_eq!(bodies, vec!["api failed"]);

    assert_eq!(env.service.queue_depth(multi.name()), 2);
    assert_eq!(env.service.queue_depth(other.name()), 0);
}

#[tokio::test(start_paused = true)]
async fn test_batch_publish_fans_out_every_body() {
    let env = TestEnv::new();
    let topic = env.topic("news").with_tags(["daily"]).unwrap();
    let first = env.tag_subscriber("news", "reader-a", &["daily", "weekly"]);
    let second = env.tag_subscriber("news", "reader-b", &["daily"]);

    let ids = topic.batch_publish(&["one", "two", "three"]).await.unwrap();

    assert_eq!(ids.payload().len(), 3);
    for reader in [&first, &second] {
        let received = reader.batch_receive(3).await.unwrap();
        let mut bodies: Vec<&str> = received.msg_infos().iter().map(|m| m.msg_body()).collect();
        bodies.sort();
        assert_eq!(bodies, vec!["one", "three", "two"]);
    }
}

#[tokio::test(start_paused = true)]
async fn test_publish_to_missing_topic_is_service_error() {
    let env = TestEnv::new();
    let topic = cmq_client::Topic::new(env.client.clone(), "ghost").unwrap();

    let err = topic.publish("nobody listens").await.unwrap_err();

    assert!(matches!(err, CmqError::Service { .. }));
}
