//! Topic client.

use crate::client::{validate_tag_count, Client};
use crate::error::CmqError;
use crate::message::{MessageId, RoutingKey, Tag, TopicName};
use crate::response::Response;

/// A named topic on the service, with the filters attached to every publish
///
/// Subscribers with an empty tag filter receive every message; subscribers
/// with tags receive messages sharing at least one tag. Routing-key matching
/// is performed by the service.
#[derive(Debug, Clone)]
pub struct Topic {
    client: Client,
    name: TopicName,
    tags: Vec<Tag>,
    routing_key: Option<RoutingKey>,
}

impl Topic {
    /// Bind a topic name to a client
    pub fn new(client: Client, name: impl Into<String>) -> Result<Self, CmqError> {
        Ok(Self {
            client,
            name: TopicName::new(name)?,
            tags: Vec::new(),
            routing_key: None,
        })
    }

    /// Tags attached to every published message (at most 5)
    pub fn with_tags<I, S>(mut self, tags: I) -> Result<Self, CmqError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parsed = tags
            .into_iter()
            .map(Tag::new)
            .collect::<Result<Vec<_>, _>>()?;
        parsed.sort();
        parsed.dedup();
        validate_tag_count(&parsed)?;
        self.tags = parsed;
        Ok(self)
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Result<Self, CmqError> {
        self.routing_key = Some(RoutingKey::new(routing_key)?);
        Ok(self)
    }

    pub fn name(&self) -> &TopicName {
        &self.name
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn routing_key(&self) -> Option<&RoutingKey> {
        self.routing_key.as_ref()
    }

    /// Publish one message
    ///
    /// Success means the service accepted the message; delivery to subscribed
    /// queues happens asynchronously.
    pub async fn publish(&self, body: &str) -> Result<Response<MessageId>, CmqError> {
        self.client
            .publish_message(&self.name, body, &self.tags, self.routing_key.as_ref())
            .await
    }

    /// Publish 1-16 messages sharing this topic's tags and routing key
    pub async fn batch_publish<S: AsRef<str>>(
        &self,
        bodies: &[S],
    ) -> Result<Response<Vec<MessageId>>, CmqError> {
        self.client
            .batch_publish_message(&self.name, bodies, &self.tags, self.routing_key.as_ref())
            .await
    }
}

#[cfg(test)]
#[path = "topic_tests.rs"]
mod tests;
