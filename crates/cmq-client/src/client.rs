//! The service client and its low-level operations.
//!
//! A [`Client`] owns the endpoint configuration, the transport and the retry
//! policy. It is cheap to clone; [`Queue`](crate::Queue) and
//! [`Topic`](crate::Topic) values hold a clone and delegate to the operations
//! defined here.

use crate::config::ClientConfig;
use crate::error::{CmqError, ValidationError};
use crate::message::{
    validate_batch_len, validate_body, validate_delay, MessageId, QueueName, ReceiptHandle,
    ReceivedMessage, RoutingKey, Tag, TopicName, MAX_POLLING_WAIT_SECONDS, MAX_TAGS,
};
use crate::request::Request;
use crate::response::{self, BatchDeleteReport, Response};
use crate::retry::{run_with_retry, RetryPolicy};
use crate::transport::{HttpTransport, RawResponse, Transport};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Handle to the queue service
///
/// # Examples
///
/// ```rust,no_run
/// use cmq_client::{Client, Queue};
/// use std::time::Duration;
///
/// # async fn example() -> Result<(), cmq_client::CmqError> {
/// let client = Client::new(
///     "https://cmq-gz.public.tencenttdmq.com",
///     "secret-id",
///     "secret-key",
///     Duration::from_secs(5),
/// )?;
/// let queue = Queue::new(client, "orders")?;
/// let response = queue.send("hello").await?;
/// println!("sent {}", response.msg_id());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    config: ClientConfig,
    transport: Arc<dyn Transport>,
    retry_policy: RetryPolicy,
}

impl Client {
    /// Create a client for an HTTP endpoint with default settings
    pub fn new(
        endpoint: impl Into<String>,
        secret_id: impl Into<String>,
        secret_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CmqError> {
        Self::from_config(ClientConfig::new(endpoint, secret_id, secret_key, timeout))
    }

    /// Create a client from a full configuration, using the HTTP transport
    pub fn from_config(config: ClientConfig) -> Result<Self, CmqError> {
        config.validate()?;
        let transport = HttpTransport::new(&config)?;
        Ok(Self::assemble(config, Arc::new(transport)))
    }

    /// Create a client over a caller-supplied transport
    pub fn with_transport(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, CmqError> {
        config.validate()?;
        Ok(Self::assemble(config, transport))
    }

    fn assemble(config: ClientConfig, transport: Arc<dyn Transport>) -> Self {
        let retry_policy = RetryPolicy::from(&config.retry);
        debug!(
            endpoint = %config.endpoint,
            transport = transport.name(),
            timeout_ms = config.timeout_ms,
            "Created queue service client"
        );
        Self {
            inner: Arc::new(ClientInner {
                config,
                transport,
                retry_policy,
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Hard ceiling on each request
    pub fn timeout(&self) -> Duration {
        self.inner.config.timeout()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.inner.retry_policy
    }

    /// Check a long-poll window against the service limit and the deadline
    pub(crate) fn validate_polling_wait(&self, seconds: u32) -> Result<(), ValidationError> {
        if seconds > MAX_POLLING_WAIT_SECONDS {
            return Err(ValidationError::out_of_range(
                "polling_wait_seconds",
                format!("maximum {} seconds", MAX_POLLING_WAIT_SECONDS),
            ));
        }
        if Duration::from_secs(u64::from(seconds)) >= self.timeout() {
            return Err(ValidationError::out_of_range(
                "polling_wait_seconds",
                format!(
                    "{}s must be shorter than the client timeout of {:?}",
                    seconds,
                    self.timeout()
                ),
            ));
        }
        Ok(())
    }

    fn validate_bodies<S: AsRef<str>>(&self, bodies: &[S]) -> Result<(), ValidationError> {
        validate_batch_len("bodies", bodies.len())?;
        bodies
            .iter()
            .try_for_each(|body| validate_body(body.as_ref(), self.inner.config.max_message_size))
    }

    /// Send one request through the retry controller and decode the answer
    async fn execute<T, D>(&self, request: Request, decode: D) -> Result<Response<T>, CmqError>
    where
        D: Fn(&RawResponse) -> Result<Response<T>, CmqError>,
    {
        let action = request.action();
        debug!(
            action = %action,
            resource = request.resource().unwrap_or_default(),
            "Sending request"
        );

        let transport = &self.inner.transport;
        let request = &request;
        let decode = &decode;
        let response = run_with_retry(&self.inner.retry_policy, self.timeout(), action, || async move {
            let raw = transport.call(request).await?;
            decode(&raw)
        })
        .await?;

        debug!(
            action = %action,
            code = response.code(),
            request_id = response.request_id().unwrap_or_default(),
            "Request completed"
        );
        Ok(response)
    }

    // ------------------------------------------------------------------------
    // Queue operations
    // ------------------------------------------------------------------------

    /// Send one message to a queue
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the body is empty or too large, or the delay
    ///   exceeds the service maximum
    /// - `Transport`, `Service`, `Timeout` or `Decode` on failure
    pub async fn send_message(
        &self,
        queue: &QueueName,
        body: &str,
        delay_seconds: u32,
    ) -> Result<Response<MessageId>, CmqError> {
        validate_body(body, self.inner.config.max_message_size)?;
        validate_delay(delay_seconds)?;
        self.execute(
            Request::send_message(queue, body, delay_seconds),
            response::decode_message_id,
        )
        .await
    }

    /// Send up to 16 messages atomically
    pub async fn batch_send_message<S: AsRef<str>>(
        &self,
        queue: &QueueName,
        bodies: &[S],
        delay_seconds: u32,
    ) -> Result<Response<Vec<MessageId>>, CmqError> {
        self.validate_bodies(bodies)?;
        validate_delay(delay_seconds)?;
        let expected = bodies.len();
        self.execute(
            Request::batch_send_message(queue, bodies, delay_seconds),
            |raw| response::decode_message_ids(raw, expected),
        )
        .await
    }

    /// Receive one message, waiting up to `polling_wait_seconds`
    ///
    /// An empty payload with code [`NO_MESSAGE_CODE`](crate::NO_MESSAGE_CODE)
    /// means the window elapsed without a message.
    pub async fn receive_message(
        &self,
        queue: &QueueName,
        polling_wait_seconds: u32,
    ) -> Result<Response<Option<ReceivedMessage>>, CmqError> {
        self.validate_polling_wait(polling_wait_seconds)?;
        self.execute(
            Request::receive_message(queue, polling_wait_seconds),
            response::decode_receive,
        )
        .await
    }

    /// Receive up to `max_count` messages
    ///
    /// The service holds the request until `max_count` messages are available
    /// or the window elapses, then returns what it collected.
    pub async fn batch_receive_message(
        &self,
        queue: &QueueName,
        max_count: usize,
        polling_wait_seconds: u32,
    ) -> Result<Response<Vec<ReceivedMessage>>, CmqError> {
        validate_batch_len("max_count", max_count)?;
        self.validate_polling_wait(polling_wait_seconds)?;
        self.execute(
            Request::batch_receive_message(queue, max_count, polling_wait_seconds),
            response::decode_batch_receive,
        )
        .await
    }

    pub async fn delete_message(
        &self,
        queue: &QueueName,
        handle: &ReceiptHandle,
    ) -> Result<Response<()>, CmqError> {
        self.execute(
            Request::delete_message(queue, handle),
            response::decode_empty,
        )
        .await
    }

    /// Delete up to 16 messages, reporting per-handle failures
    pub async fn batch_delete_message(
        &self,
        queue: &QueueName,
        handles: &[ReceiptHandle],
    ) -> Result<Response<BatchDeleteReport>, CmqError> {
        validate_batch_len("handles", handles.len())?;
        self.execute(Request::batch_delete_message(queue, handles), |raw| {
            response::decode_batch_delete(raw, handles)
        })
        .await
    }

    // ------------------------------------------------------------------------
    // Topic operations
    // ------------------------------------------------------------------------

    pub async fn publish_message(
        &self,
        topic: &TopicName,
        body: &str,
        tags: &[Tag],
        routing_key: Option<&RoutingKey>,
    ) -> Result<Response<MessageId>, CmqError> {
        validate_body(body, self.inner.config.max_message_size)?;
        validate_tag_count(tags)?;
        self.execute(
            Request::publish_message(topic, body, tags, routing_key),
            response::decode_message_id,
        )
        .await
    }

    pub async fn batch_publish_message<S: AsRef<str>>(
        &self,
        topic: &TopicName,
        bodies: &[S],
        tags: &[Tag],
        routing_key: Option<&RoutingKey>,
    ) -> Result<Response<Vec<MessageId>>, CmqError> {
        self.validate_bodies(bodies)?;
        validate_tag_count(tags)?;
        let expected = bodies.len();
        self.execute(
            Request::batch_publish_message(topic, bodies, tags, routing_key),
            |raw| response::decode_message_ids(raw, expected),
        )
        .await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.inner.config.endpoint)
            .field("transport", &self.inner.transport.name())
            .field("timeout", &self.timeout())
            .finish()
    }
}

pub(crate) fn validate_tag_count(tags: &[Tag]) -> Result<(), ValidationError> {
    if tags.len() > MAX_TAGS {
        return Err(ValidationError::out_of_range(
            "tags",
            format!("at most {} tags per message", MAX_TAGS),
        ));
    }
    Ok(())
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
