//! # CMQ Client
//!
//! Async client for CMQ-style managed message queues and topics.
//!
//! This library provides:
//! - Signed HTTP transport to the queue service
//! - Queue operations: send, batch send, long-poll receive, batch receive,
//!   delete and batch delete with at-least-once delivery
//! - Topic publishing with tags and routing keys
//! - Per-request deadlines and retries with exponential backoff
//! - Background consumer and producer workers
//! - An in-memory service for tests and local development
//!
//! ## Module Organization
//!
//! - [`error`] - Error types for all operations
//! - [`config`] - Client configuration and layered loading
//! - [`message`] - Validated identifiers, received messages and service limits
//! - [`request`] / [`response`] - Wire requests and typed responses
//! - [`signing`] - Request signatures
//! - [`transport`] - The transport seam, HTTP and in-memory implementations
//! - [`retry`] - Retry policy and deadline control
//! - [`client`], [`queue`], [`topic`] - The client API
//! - [`worker`] - Consumer and producer tasks
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Example
//!
//! ```rust,no_run
//! use cmq_client::{Client, Queue};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), cmq_client::CmqError> {
//! let client = Client::new(
//!     "https://cmq-gz.public.tencenttdmq.com",
//!     "secret-id",
//!     "secret-key",
//!     Duration::from_secs(5),
//! )?;
//! let queue = Queue::new(client, "orders")?.with_polling_wait_seconds(3)?;
//!
//! queue.send("hello").await?;
//! if let Some(message) = queue.receive().await?.into_payload() {
//!     println!("{}", message.msg_body());
//!     queue.delete(message.handle()).await?;
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod queue;
pub mod request;
pub mod response;
pub mod retry;
pub mod signing;
pub mod topic;
pub mod transport;
pub mod worker;

pub use client::Client;
pub use config::{ClientConfig, LoggingConfig, RetryConfig, SecretKey, SignatureMethod};
pub use error::{CmqError, ConfigurationError, ValidationError, NO_MESSAGE_CODE};
pub use message::{
    MessageId, QueueName, ReceiptHandle, ReceivedMessage, RoutingKey, Tag, TopicName,
    DEFAULT_MAX_MESSAGE_SIZE, MAX_BATCH_SIZE, MAX_DELAY_SECONDS, MAX_POLLING_WAIT_SECONDS,
    MAX_TAGS,
};
pub use queue::Queue;
pub use response::{BatchDeleteReport, DeleteFailure, Response};
pub use retry::{RetryPolicy, RetryState};
pub use topic::Topic;
pub use transport::{HttpTransport, InMemoryService, RawResponse, Transport};
pub use worker::{Consumer, HandlerError, MessageHandler, Producer, WorkerHandle, WorkerStats};
