//! Queue client.
//!
//! A [`Queue`] binds a queue name and its default delay and polling window to
//! a [`Client`]. It holds no mutable state; clones are independent handles to
//! the same queue.

use crate::client::Client;
use crate::error::CmqError;
use crate::message::{validate_delay, MessageId, QueueName, ReceiptHandle, ReceivedMessage};
use crate::response::{BatchDeleteReport, Response};

/// A named queue on the service
#[derive(Debug, Clone)]
pub struct Queue {
    client: Client,
    name: QueueName,
    delay_seconds: u32,
    polling_wait_seconds: u32,
}

impl Queue {
    /// Bind a queue name to a client
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the name is not a valid queue name.
    pub fn new(client: Client, name: impl Into<String>) -> Result<Self, CmqError> {
        Ok(Self {
            client,
            name: QueueName::new(name)?,
            delay_seconds: 0,
            polling_wait_seconds: 0,
        })
    }

    /// Default visibility delay for sent messages
    pub fn with_delay_seconds(mut self, delay_seconds: u32) -> Result<Self, CmqError> {
        validate_delay(delay_seconds)?;
        self.delay_seconds = delay_seconds;
        Ok(self)
    }

    /// Default long-poll window for receives
    ///
    /// Must not exceed 30 seconds and must be shorter than the client timeout.
    pub fn with_polling_wait_seconds(mut self, seconds: u32) -> Result<Self, CmqError> {
        self.client.validate_polling_wait(seconds)?;
        self.polling_wait_seconds = seconds;
        Ok(self)
    }

    pub fn name(&self) -> &QueueName {
        &self.name
    }

    pub fn delay_seconds(&self) -> u32 {
        self.delay_seconds
    }

    pub fn polling_wait_seconds(&self) -> u32 {
        self.polling_wait_seconds
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Send a message using the queue's default delay
    pub async fn send(&self, body: &str) -> Result<Response<MessageId>, CmqError> {
        self.send_with_delay(body, self.delay_seconds).await
    }

    /// Send a message that stays invisible for `delay_seconds`
    pub async fn send_with_delay(
        &self,
        body: &str,
        delay_seconds: u32,
    ) -> Result<Response<MessageId>, CmqError> {
        self.client
            .send_message(&self.name, body, delay_seconds)
            .await
    }

    /// Send 1-16 messages atomically using the queue's default delay
    ///
    /// Message ids are returned in the order of `bodies`.
    pub async fn batch_send<S: AsRef<str>>(
        &self,
        bodies: &[S],
    ) -> Result<Response<Vec<MessageId>>, CmqError> {
        self.client
            .batch_send_message(&self.name, bodies, self.delay_seconds)
            .await
    }

    /// Receive one message, waiting up to the queue's polling window
    ///
    /// Returns `Ok` with an empty payload when nothing arrived in time.
    pub async fn receive(&self) -> Result<Response<Option<ReceivedMessage>>, CmqError> {
        self.receive_with_wait(self.polling_wait_seconds).await
    }

    /// Receive one message with a per-call polling window
    pub async fn receive_with_wait(
        &self,
        polling_wait_seconds: u32,
    ) -> Result<Response<Option<ReceivedMessage>>, CmqError> {
        self.client
            .receive_message(&self.name, polling_wait_seconds)
            .await
    }

    /// Receive up to `max_count` messages
    ///
    /// Blocks until `max_count` messages are available or the polling window
    /// elapses, then returns whatever was collected, possibly nothing.
    pub async fn batch_receive(
        &self,
        max_count: usize,
    ) -> Result<Response<Vec<ReceivedMessage>>, CmqError> {
        self.batch_receive_with_wait(max_count, self.polling_wait_seconds)
            .await
    }

    pub async fn batch_receive_with_wait(
        &self,
        max_count: usize,
        polling_wait_seconds: u32,
    ) -> Result<Response<Vec<ReceivedMessage>>, CmqError> {
        self.client
            .batch_receive_message(&self.name, max_count, polling_wait_seconds)
            .await
    }

    /// Delete a received message
    ///
    /// Fails with a `Service` error if the handle is unknown, expired or
    /// already used.
    pub async fn delete(&self, handle: &ReceiptHandle) -> Result<Response<()>, CmqError> {
        self.client.delete_message(&self.name, handle).await
    }

    /// Delete 1-16 messages; failures are reported per handle
    pub async fn batch_delete(
        &self,
        handles: &[ReceiptHandle],
    ) -> Result<Response<BatchDeleteReport>, CmqError> {
        self.client.batch_delete_message(&self.name, handles).await
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
