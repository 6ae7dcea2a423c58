//! In-memory queue service speaking the same JSON protocol as the real one.
//!
//! This service provides:
//! - Visibility timeouts with redelivery under a fresh receipt handle
//! - Delayed messages
//! - Long polling that waits for messages or the polling window
//! - Topics with tag-filtered and routing-key-bound subscriptions
//! - Fault injection for exercising retry behaviour
//!
//! State is process-local and lost on drop. Time is measured with
//! `tokio::time::Instant`, so paused-clock tests drive delays and polling
//! windows deterministically.

use super::{RawResponse, Transport};
use crate::error::{CmqError, NO_MESSAGE_CODE};
use crate::message::{
    QueueName, Tag, TopicName, MAX_BATCH_SIZE, MAX_DELAY_SECONDS, MAX_POLLING_WAIT_SECONDS,
};
use crate::request::{Action, Request};
use crate::response::{WireDeleteError, WireMessage, WireMessageId, WireResponse};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Status codes produced by the in-memory service
pub mod codes {
    pub const INVALID_PARAMETER: i64 = 4000;
    pub const QUEUE_NOT_FOUND: i64 = 4440;
    pub const TOPIC_NOT_FOUND: i64 = 4445;
    pub const INVALID_RECEIPT_HANDLE: i64 = 4450;
    pub const PARTIAL_DELETE_FAILURE: i64 = 4460;
    pub const SERVICE_BUSY: i64 = 6000;
}

/// Default time a received message stays invisible before redelivery
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Subscriptions
// ============================================================================

/// A queue subscribed to a topic, with its delivery filters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    queue: QueueName,
    filter_tags: Vec<Tag>,
    binding_keys: Vec<String>,
}

impl Subscription {
    /// Subscription that receives every message published to the topic
    pub fn new(queue: QueueName) -> Self {
        Self {
            queue,
            filter_tags: Vec::new(),
            binding_keys: Vec::new(),
        }
    }

    /// Only deliver messages carrying at least one of these tags
    pub fn with_filter_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.filter_tags = tags.into_iter().collect();
        self
    }

    /// Only deliver messages whose routing key matches one of these patterns
    ///
    /// Patterns are dot-separated words where `*` matches exactly one word and
    /// `#` matches zero or more words.
    pub fn with_binding_keys<S: Into<String>>(mut self, keys: impl IntoIterator<Item = S>) -> Self {
        self.binding_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Decide whether a published message is delivered to this subscription
    pub fn matches(&self, tags: &[&str], routing_key: Option<&str>) -> bool {
        let tags_match = self.filter_tags.is_empty()
            || self
                .filter_tags
                .iter()
                .any(|filter| tags.contains(&filter.as_str()));

        let key_match = self.binding_keys.is_empty()
            || routing_key.is_some_and(|key| {
                self.binding_keys
                    .iter()
                    .any(|pattern| binding_key_matches(pattern, key))
            });

        tags_match && key_match
    }
}

/// Match a routing key against a binding pattern
pub fn binding_key_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    words_match(&pattern, &key)
}

fn words_match(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| words_match(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((&first, key_rest)) => (word == "*" || word == first) && words_match(rest, key_rest),
            None => false,
        },
    }
}

// ============================================================================
// Fault Injection
// ============================================================================

/// A failure returned instead of processing the next request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Respond with this HTTP status and an empty body
    HttpStatus(u16),
    /// Respond with HTTP 200 and this service code
    ServiceCode(i64),
    /// Fail the exchange without a response
    ConnectionReset,
}

// ============================================================================
// Internal Storage Structures
// ============================================================================

#[derive(Default)]
struct ServiceState {
    queues: HashMap<String, QueueState>,
    topics: HashMap<String, Vec<Subscription>>,
}

struct QueueState {
    messages: VecDeque<StoredMessage>,
    notify: Arc<Notify>,
}

impl QueueState {
    fn new() -> Self {
        Self {
            messages: VecDeque::new(),
            notify: Arc::new(Notify::new()),
        }
    }

    fn enqueue(&mut self, message: StoredMessage) {
        self.messages.push_back(message);
        self.notify.notify_waiters();
    }

    /// Hand out up to `max` visible messages, hiding each for `visibility`
    fn take_visible(&mut self, max: usize, now: Instant, visibility: Duration) -> Vec<WireMessage> {
        let mut taken = Vec::new();
        for message in self.messages.iter_mut() {
            if taken.len() >= max {
                break;
            }
            if message.visible_at > now {
                continue;
            }
            taken.push(message.deliver(now, visibility));
        }
        taken
    }

    /// Earliest instant a currently hidden message becomes visible
    fn next_visible_after(&self, now: Instant) -> Option<Instant> {
        self.messages
            .iter()
            .map(|m| m.visible_at)
            .filter(|at| *at > now)
            .min()
    }

    /// Remove the message owning `handle` if the handle is still current
    fn delete(&mut self, handle: &str, now: Instant) -> Result<(), (i64, String)> {
        let position = self.messages.iter().position(|m| {
            m.receipt_handle.as_deref() == Some(handle) && m.visible_at > now
        });
        match position {
            Some(idx) => {
                self.messages.remove(idx);
                Ok(())
            }
            None => Err((
                codes::INVALID_RECEIPT_HANDLE,
                format!("receipt handle {} is invalid or expired", handle),
            )),
        }
    }
}

struct StoredMessage {
    msg_id: String,
    body: String,
    enqueue_time: i64,
    first_dequeue_time: Option<i64>,
    dequeue_count: u32,
    visible_at: Instant,
    receipt_handle: Option<String>,
}

impl StoredMessage {
    fn new(msg_id: String, body: String, delay: Duration) -> Self {
        Self {
            msg_id,
            body,
            enqueue_time: Utc::now().timestamp(),
            first_dequeue_time: None,
            dequeue_count: 0,
            visible_at: Instant::now() + delay,
            receipt_handle: None,
        }
    }

    /// Record a delivery; any previous handle stops being valid
    fn deliver(&mut self, now: Instant, visibility: Duration) -> WireMessage {
        let wall_clock = Utc::now().timestamp();
        let handle = new_receipt_handle();

        self.dequeue_count += 1;
        self.first_dequeue_time.get_or_insert(wall_clock);
        self.visible_at = now + visibility;
        self.receipt_handle = Some(handle.clone());

        WireMessage {
            msg_id: self.msg_id.clone(),
            msg_body: self.body.clone(),
            receipt_handle: handle,
            enqueue_time: Some(self.enqueue_time),
            first_dequeue_time: self.first_dequeue_time,
            next_visible_time: Some(wall_clock + visibility.as_secs() as i64),
            dequeue_count: Some(self.dequeue_count),
        }
    }
}

fn new_receipt_handle() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

fn new_message_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn new_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Internal result: an error response short-circuits processing
type Handled = Result<WireResponse, WireResponse>;

fn invalid(message: impl Into<String>) -> WireResponse {
    WireResponse::error(codes::INVALID_PARAMETER, message)
}

fn required<'a>(request: &'a Request, key: &str) -> Result<&'a str, WireResponse> {
    request
        .param(key)
        .ok_or_else(|| invalid(format!("missing parameter {}", key)))
}

fn parse_param<T: FromStr>(request: &Request, key: &str, default: T) -> Result<T, WireResponse> {
    match request.param(key) {
        Some(raw) => raw
            .parse()
            .map_err(|_| invalid(format!("invalid value for {}: {}", key, raw))),
        None => Ok(default),
    }
}

fn parse_delay(request: &Request) -> Result<u64, WireResponse> {
    let delay: u64 = parse_param(request, "delaySeconds", 0)?;
    if delay > u64::from(MAX_DELAY_SECONDS) {
        return Err(invalid(format!(
            "delaySeconds must be 0-{}, got {}",
            MAX_DELAY_SECONDS, delay
        )));
    }
    Ok(delay)
}

fn queue_not_found(name: &str) -> WireResponse {
    WireResponse::error(codes::QUEUE_NOT_FOUND, format!("queue {} does not exist", name))
}

// ============================================================================
// InMemoryService
// ============================================================================

/// Process-local queue service implementing [`Transport`]
///
/// # Examples
///
/// ```rust
/// use cmq_client::{Client, ClientConfig, InMemoryService, Queue, QueueName};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # tokio_test::block_on(async {
/// let service = Arc::new(InMemoryService::new());
/// service.create_queue(&QueueName::new("orders").unwrap());
///
/// let config = ClientConfig::new("http://cmq.local", "id", "key", Duration::from_secs(5));
/// let client = Client::with_transport(config, service.clone()).unwrap();
/// let queue = Queue::new(client, "orders").unwrap();
///
/// queue.send("hello").await.unwrap();
/// assert_eq!(queue.receive().await.unwrap().msg_body(), Some("hello"));
/// # });
/// ```
pub struct InMemoryService {
    state: Mutex<ServiceState>,
    faults: Mutex<VecDeque<Fault>>,
    visibility_timeout: Duration,
    requests: AtomicU64,
}

impl InMemoryService {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ServiceState::default()),
            faults: Mutex::new(VecDeque::new()),
            visibility_timeout: DEFAULT_VISIBILITY_TIMEOUT,
            requests: AtomicU64::new(0),
        }
    }

    /// Set how long a received message stays hidden before redelivery
    pub fn with_visibility_timeout(mut self, timeout: Duration) -> Self {
        self.visibility_timeout = timeout;
        self
    }

    fn state(&self) -> MutexGuard<'_, ServiceState> {
        // A panic while holding the lock cannot leave the maps half-updated
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    /// Create a queue; returns false if it already existed
    pub fn create_queue(&self, name: &QueueName) -> bool {
        let mut state = self.state();
        if state.queues.contains_key(name.as_str()) {
            return false;
        }
        state.queues.insert(name.as_str().to_string(), QueueState::new());
        true
    }

    /// Create a topic; returns false if it already existed
    pub fn create_topic(&self, name: &TopicName) -> bool {
        let mut state = self.state();
        if state.topics.contains_key(name.as_str()) {
            return false;
        }
        state.topics.insert(name.as_str().to_string(), Vec::new());
        true
    }

    /// Subscribe a queue to a topic
    ///
    /// # Errors
    ///
    /// Returns [`CmqError::Service`] when the topic or the queue does not exist.
    pub fn subscribe(&self, topic: &TopicName, subscription: Subscription) -> Result<(), CmqError> {
        let mut state = self.state();
        if !state.queues.contains_key(subscription.queue.as_str()) {
            return Err(CmqError::Service {
                code: codes::QUEUE_NOT_FOUND,
                message: format!("queue {} does not exist", subscription.queue),
                request_id: None,
            });
        }
        let subscriptions = state
            .topics
            .get_mut(topic.as_str())
            .ok_or_else(|| CmqError::Service {
                code: codes::TOPIC_NOT_FOUND,
                message: format!("topic {} does not exist", topic),
                request_id: None,
            })?;
        subscriptions.push(subscription);
        Ok(())
    }

    /// Number of messages held by a queue, visible or not
    pub fn queue_depth(&self, name: &QueueName) -> usize {
        self.state()
            .queues
            .get(name.as_str())
            .map(|q| q.messages.len())
            .unwrap_or(0)
    }

    /// Fail the next request with `fault`; faults are consumed in order
    pub fn inject_fault(&self, fault: Fault) {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push_back(fault);
    }

    /// Total number of requests received, including faulted ones
    pub fn request_count(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    fn take_fault(&self) -> Option<Fault> {
        self.faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .pop_front()
    }

    // ------------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------------

    fn send(&self, request: &Request) -> Handled {
        let queue = required(request, "queueName")?;
        let body = required(request, "msgBody")?;
        let delay = parse_delay(request)?;

        let msg_id = new_message_id();
        let mut state = self.state();
        let target = state.queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;
        target.enqueue(StoredMessage::new(
            msg_id.clone(),
            body.to_string(),
            Duration::from_secs(delay),
        ));

        Ok(WireResponse {
            msg_id: Some(msg_id),
            ..WireResponse::success()
        })
    }

    fn batch_send(&self, request: &Request) -> Handled {
        let queue = required(request, "queueName")?;
        let bodies = request.indexed_params("msgBody");
        if bodies.is_empty() || bodies.len() > MAX_BATCH_SIZE {
            return Err(invalid(format!("batch must contain 1-{} bodies", MAX_BATCH_SIZE)));
        }
        let delay = parse_delay(request)?;

        let mut state = self.state();
        let target = state.queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;
        let mut msg_list = Vec::with_capacity(bodies.len());
        for body in bodies {
            let msg_id = new_message_id();
            target.enqueue(StoredMessage::new(
                msg_id.clone(),
                body.to_string(),
                Duration::from_secs(delay),
            ));
            msg_list.push(WireMessageId { msg_id });
        }

        Ok(WireResponse {
            msg_list,
            ..WireResponse::success()
        })
    }

    async fn receive(&self, request: &Request, batch: bool) -> Handled {
        let queue = required(request, "queueName")?;
        let max = if batch {
            let max: usize = parse_param(request, "numOfMsg", 1)?;
            if max == 0 || max > MAX_BATCH_SIZE {
                return Err(invalid(format!("numOfMsg must be 1-{}", MAX_BATCH_SIZE)));
            }
            max
        } else {
            1
        };
        let wait: u32 = parse_param(request, "pollingWaitSeconds", 0)?;
        if wait > MAX_POLLING_WAIT_SECONDS {
            return Err(invalid(format!(
                "pollingWaitSeconds must be at most {}",
                MAX_POLLING_WAIT_SECONDS
            )));
        }

        let notify = self
            .state()
            .queues
            .get(queue)
            .map(|q| Arc::clone(&q.notify))
            .ok_or_else(|| queue_not_found(queue))?;

        let deadline = Instant::now() + Duration::from_secs(u64::from(wait));
        let mut collected: Vec<WireMessage> = Vec::new();

        loop {
            // Register for wake-ups before inspecting state so no send is missed
            let notified = notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let next_visible = {
                let mut state = self.state();
                let target = state.queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;
                let now = Instant::now();
                collected.extend(target.take_visible(
                    max - collected.len(),
                    now,
                    self.visibility_timeout,
                ));
                if collected.len() >= max || now >= deadline {
                    break;
                }
                target.next_visible_after(now)
            };

            let wake_at = next_visible.map_or(deadline, |at| at.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }

        if collected.is_empty() {
            return Err(WireResponse::error(NO_MESSAGE_CODE, "no message"));
        }

        if batch {
            Ok(WireResponse {
                msg_info_list: collected,
                ..WireResponse::success()
            })
        } else {
            let message = collected.remove(0);
            Ok(WireResponse::success().with_message(message))
        }
    }

    fn delete(&self, request: &Request) -> Handled {
        let queue = required(request, "queueName")?;
        let handle = required(request, "receiptHandle")?;

        let mut state = self.state();
        let target = state.queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;
        target
            .delete(handle, Instant::now())
            .map(|()| WireResponse::success())
            .map_err(|(code, message)| WireResponse::error(code, message))
    }

    fn batch_delete(&self, request: &Request) -> Handled {
        let queue = required(request, "queueName")?;
        let handles = request.indexed_params("receiptHandle");
        if handles.is_empty() || handles.len() > MAX_BATCH_SIZE {
            return Err(invalid(format!("batch must contain 1-{} handles", MAX_BATCH_SIZE)));
        }

        let mut state = self.state();
        let target = state.queues.get_mut(queue).ok_or_else(|| queue_not_found(queue))?;
        let now = Instant::now();
        let error_list: Vec<WireDeleteError> = handles
            .into_iter()
            .filter_map(|handle| {
                target
                    .delete(handle, now)
                    .err()
                    .map(|(code, message)| WireDeleteError {
                        code,
                        message,
                        receipt_handle: handle.to_string(),
                    })
            })
            .collect();

        if error_list.is_empty() {
            return Ok(WireResponse::success());
        }
        Ok(WireResponse {
            error_list,
            ..WireResponse::error(codes::PARTIAL_DELETE_FAILURE, "some receipt handles failed")
        })
    }

    fn publish(&self, request: &Request, batch: bool) -> Handled {
        let topic = required(request, "topicName")?;
        let bodies = if batch {
            let bodies = request.indexed_params("msgBody");
            if bodies.is_empty() || bodies.len() > MAX_BATCH_SIZE {
                return Err(invalid(format!("batch must contain 1-{} bodies", MAX_BATCH_SIZE)));
            }
            bodies
        } else {
            vec![required(request, "msgBody")?]
        };
        let tags = request.indexed_params("msgTag");
        let routing_key = request.param("routingKey");

        let mut state = self.state();
        let subscriptions = state
            .topics
            .get(topic)
            .ok_or_else(|| {
                WireResponse::error(codes::TOPIC_NOT_FOUND, format!("topic {} does not exist", topic))
            })?
            .iter()
            .filter(|s| s.matches(&tags, routing_key))
            .map(|s| s.queue.as_str().to_string())
            .collect::<Vec<_>>();

        let mut msg_list = Vec::with_capacity(bodies.len());
        for body in bodies {
            let msg_id = new_message_id();
            for queue in &subscriptions {
                if let Some(target) = state.queues.get_mut(queue) {
                    target.enqueue(StoredMessage::new(
                        msg_id.clone(),
                        body.to_string(),
                        Duration::ZERO,
                    ));
                }
            }
            msg_list.push(WireMessageId { msg_id });
        }

        debug!(
            topic = %topic,
            delivered_to = subscriptions.len(),
            "Published message to in-memory topic"
        );

        if batch {
            Ok(WireResponse {
                msg_list,
                ..WireResponse::success()
            })
        } else {
            Ok(WireResponse {
                msg_id: msg_list.pop().map(|entry| entry.msg_id),
                ..WireResponse::success()
            })
        }
    }
}

impl Default for InMemoryService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for InMemoryService {
    async fn call(&self, request: &Request) -> Result<RawResponse, CmqError> {
        self.requests.fetch_add(1, Ordering::SeqCst);

        match self.take_fault() {
            Some(Fault::HttpStatus(status)) => return Ok(RawResponse::new(status, "")),
            Some(Fault::ConnectionReset) => {
                return Err(CmqError::transport("connection reset by in-memory service"))
            }
            Some(Fault::ServiceCode(code)) => {
                let wire = WireResponse::error(code, "injected fault");
                return encode(wire);
            }
            None => {}
        }

        let handled = match request.action() {
            Action::SendMessage => self.send(request),
            Action::BatchSendMessage => self.batch_send(request),
            Action::ReceiveMessage => self.receive(request, false).await,
            Action::BatchReceiveMessage => self.receive(request, true).await,
            Action::DeleteMessage => self.delete(request),
            Action::BatchDeleteMessage => self.batch_delete(request),
            Action::PublishMessage => self.publish(request, false),
            Action::BatchPublishMessage => self.publish(request, true),
        };

        let mut wire = handled.unwrap_or_else(|error| error);
        wire.request_id = Some(new_request_id());
        debug!(
            action = %request.action(),
            code = wire.code,
            "In-memory service handled request"
        );
        encode(wire)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

fn encode(wire: WireResponse) -> Result<RawResponse, CmqError> {
    let body = serde_json::to_string(&wire)
        .map_err(|e| CmqError::decode(format!("failed to encode response: {}", e)))?;
    Ok(RawResponse::new(200, body))
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
