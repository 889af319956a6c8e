//! Message broker interface and an in-process implementation.
//!
//! The broker is the only coordination point between the dispatcher and the
//! workers. Delivery is at-least-once: a message handed to a consumer stays
//! owned by the broker until it is acknowledged, and a delivery dropped without
//! an ack or nack is put back on its queue.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Notify;

use crate::routing::dead_letter_queue;

/// Errors from broker operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
    #[error("Publish to '{queue}' rejected: {reason}")]
    PublishRejected { queue: String, reason: String },
    #[error("Cannot consume from '{queue}': {reason}")]
    ConsumeFailed { queue: String, reason: String },
}

/// A durable queue broker.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Broker implementation name, for logs.
    fn broker_type(&self) -> &'static str;

    /// Check the broker is reachable. Called once at startup.
    async fn ping(&self) -> Result<(), BrokerError>;

    /// Durably enqueue `payload` on `queue`. `Ok` means the broker accepted it.
    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Open a consumer on `queue`.
    async fn consume(&self, queue: &str) -> Result<Box<dyn Consumer>, BrokerError>;
}

/// A stream of deliveries from one queue.
#[async_trait]
pub trait Consumer: Send {
    /// Wait for the next delivery. `None` means the consumer was closed by the broker.
    async fn next(&mut self) -> Option<Delivery>;
}

/// Settles a single delivery with the broker.
#[async_trait]
pub trait Acknowledger: Send {
    async fn ack(&mut self) -> Result<(), BrokerError>;

    /// Reject the delivery. `requeue = false` routes it to the dead-letter queue.
    async fn nack(&mut self, requeue: bool) -> Result<(), BrokerError>;
}

/// A message handed to a consumer, together with its acknowledgement handle.
pub struct Delivery {
    pub payload: Vec<u8>,
    /// True when this message was delivered before and not acknowledged.
    pub redelivered: bool,
    acker: Box<dyn Acknowledger>,
}

impl Delivery {
    pub fn new(payload: Vec<u8>, redelivered: bool, acker: Box<dyn Acknowledger>) -> Self {
        Self {
            payload,
            redelivered,
            acker,
        }
    }

    pub async fn ack(mut self) -> Result<(), BrokerError> {
        self.acker.ack().await
    }

    pub async fn nack(mut self, requeue: bool) -> Result<(), BrokerError> {
        self.acker.nack(requeue).await
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("payload_len", &self.payload.len())
            .field("redelivered", &self.redelivered)
            .finish()
    }
}

// ============================================================================
// In-process broker
// ============================================================================

struct Message {
    payload: Vec<u8>,
    redelivered: bool,
}

#[derive(Default)]
struct QueueState {
    ready: VecDeque<Message>,
    unacked: usize,
    published: u64,
    notify: Arc<Notify>,
}

/// Dead-lettered messages kept per queue before the oldest are discarded.
pub const DEFAULT_DEAD_LETTER_CAPACITY: usize = 10_000;

struct Queues {
    queues: Mutex<HashMap<String, QueueState>>,
    dead_letter_capacity: usize,
}

impl Queues {
    fn new(dead_letter_capacity: usize) -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            dead_letter_capacity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, QueueState>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn push(&self, queue: &str, message: Message) {
        let mut queues = self.lock();
        let state = queues.entry(queue.to_string()).or_default();
        state.ready.push_back(message);
        state.notify.notify_one();
    }

    /// Append to a dead-letter queue, discarding its oldest entries past capacity.
    fn push_dead_letter(&self, queue: &str, message: Message) {
        let mut queues = self.lock();
        let state = queues.entry(queue.to_string()).or_default();
        state.ready.push_back(message);
        let excess = state.ready.len().saturating_sub(self.dead_letter_capacity);
        if excess > 0 {
            state.ready.drain(..excess);
            tracing::warn!(
                queue = %queue,
                discarded = excess,
                capacity = self.dead_letter_capacity,
                "Dead-letter queue full, discarding oldest messages"
            );
        }
        state.notify.notify_one();
    }

    fn pop(&self, queue: &str) -> Option<Message> {
        let mut queues = self.lock();
        let state = queues.get_mut(queue)?;
        let message = state.ready.pop_front()?;
        state.unacked += 1;
        Some(message)
    }

    fn settle(&self, queue: &str) {
        if let Some(state) = self.lock().get_mut(queue) {
            state.unacked = state.unacked.saturating_sub(1);
        }
    }

    fn notifier(&self, queue: &str) -> Arc<Notify> {
        self.lock().entry(queue.to_string()).or_default().notify.clone()
    }
}

/// Broker keeping its queues in process memory.
///
/// Suitable for a single process hosting both the gateway and its worker
/// pool. Queues are created on first use. Nothing consumes the dead-letter
/// queues, so each keeps at most `dead_letter_capacity` messages.
#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<Queues>,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::with_dead_letter_capacity(DEFAULT_DEAD_LETTER_CAPACITY)
    }

    pub fn with_dead_letter_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Queues::new(capacity)),
        }
    }

    /// Messages waiting on `queue`.
    pub fn depth(&self, queue: &str) -> usize {
        self.inner.lock().get(queue).map(|q| q.ready.len()).unwrap_or(0)
    }

    /// Messages delivered from `queue` but not yet settled.
    pub fn unacked(&self, queue: &str) -> usize {
        self.inner.lock().get(queue).map(|q| q.unacked).unwrap_or(0)
    }

    /// Messages ever published to `queue` by producers (requeues excluded).
    pub fn published(&self, queue: &str) -> u64 {
        self.inner.lock().get(queue).map(|q| q.published).unwrap_or(0)
    }

    /// Messages ever published by producers across all queues.
    pub fn total_published(&self) -> u64 {
        self.inner.lock().values().map(|q| q.published).sum()
    }
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    fn broker_type(&self) -> &'static str {
        "memory"
    }

    async fn ping(&self) -> Result<(), BrokerError> {
        Ok(())
    }

    async fn publish(&self, queue: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if queue.is_empty() {
            return Err(BrokerError::PublishRejected {
                queue: queue.to_string(),
                reason: "queue name is empty".to_string(),
            });
        }

        {
            let mut queues = self.inner.lock();
            let state = queues.entry(queue.to_string()).or_default();
            state.published += 1;
        }
        self.inner.push(
            queue,
            Message {
                payload,
                redelivered: false,
            },
        );
        Ok(())
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn Consumer>, BrokerError> {
        if queue.is_empty() {
            return Err(BrokerError::ConsumeFailed {
                queue: queue.to_string(),
                reason: "queue name is empty".to_string(),
            });
        }

        Ok(Box::new(MemoryConsumer {
            inner: self.inner.clone(),
            queue: queue.to_string(),
            notify: self.inner.notifier(queue),
        }))
    }
}

struct MemoryConsumer {
    inner: Arc<Queues>,
    queue: String,
    notify: Arc<Notify>,
}

#[async_trait]
impl Consumer for MemoryConsumer {
    async fn next(&mut self) -> Option<Delivery> {
        loop {
            if let Some(message) = self.inner.pop(&self.queue) {
                let acker = MemoryAcker {
                    inner: self.inner.clone(),
                    queue: self.queue.clone(),
                    payload: Some(message.payload.clone()),
                };
                return Some(Delivery::new(
                    message.payload,
                    message.redelivered,
                    Box::new(acker),
                ));
            }
            self.notify.notified().await;
        }
    }
}

/// Holds a copy of the payload until settled so it can be redelivered.
struct MemoryAcker {
    inner: Arc<Queues>,
    queue: String,
    payload: Option<Vec<u8>>,
}

enum Settle {
    Ack,
    Requeue,
    DeadLetter,
}

impl MemoryAcker {
    fn settle(&mut self, how: Settle) {
        let Some(payload) = self.payload.take() else {
            return;
        };
        self.inner.settle(&self.queue);

        let message = Message {
            payload,
            redelivered: true,
        };
        match how {
            Settle::Ack => {}
            Settle::Requeue => self.inner.push(&self.queue, message),
            Settle::DeadLetter => self
                .inner
                .push_dead_letter(&dead_letter_queue(&self.queue), message),
        }
    }
}

#[async_trait]
impl Acknowledger for MemoryAcker {
    async fn ack(&mut self) -> Result<(), BrokerError> {
        self.settle(Settle::Ack);
        Ok(())
    }

    async fn nack(&mut self, requeue: bool) -> Result<(), BrokerError> {
        self.settle(if requeue {
            Settle::Requeue
        } else {
            Settle::DeadLetter
        });
        Ok(())
    }
}

impl Drop for MemoryAcker {
    fn drop(&mut self) {
        if self.payload.is_some() {
            tracing::debug!(queue = %self.queue, "Delivery dropped unsettled, requeueing");
            self.settle(Settle::Requeue);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const QUEUE: &str = "text_embedding_small_queue";

    #[tokio::test]
    async fn test_publish_consume_ack() {
        let broker = MemoryBroker::new();
        broker.publish(QUEUE, b"one".to_vec()).await.unwrap();
        assert_eq!(broker.depth(QUEUE), 1);

        let mut consumer = broker.consume(QUEUE).await.unwrap();
        let delivery = consumer.next().await.unwrap();
        assert_eq!(delivery.payload, b"one");
        assert!(!delivery.redelivered);
        assert_eq!(broker.depth(QUEUE), 0);
        assert_eq!(broker.unacked(QUEUE), 1);

        delivery.ack().await.unwrap();
        assert_eq!(broker.unacked(QUEUE), 0);
        assert_eq!(broker.depth(QUEUE), 0);
        assert_eq!(broker.published(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_nack_with_requeue_redelivers() {
        let broker = MemoryBroker::new();
        broker.publish(QUEUE, b"one".to_vec()).await.unwrap();

        let mut consumer = broker.consume(QUEUE).await.unwrap();
        consumer.next().await.unwrap().nack(true).await.unwrap();

        let again = consumer.next().await.unwrap();
        assert_eq!(again.payload, b"one");
        assert!(again.redelivered);
        // Requeues are not counted as producer publishes
        assert_eq!(broker.published(QUEUE), 1);
    }

    #[tokio::test]
    async fn test_nack_without_requeue_dead_letters() {
        let broker = MemoryBroker::new();
        broker.publish(QUEUE, b"poison".to_vec()).await.unwrap();

        let mut consumer = broker.consume(QUEUE).await.unwrap();
        consumer.next().await.unwrap().nack(false).await.unwrap();

        assert_eq!(broker.depth(QUEUE), 0);
        let dead_letter = dead_letter_queue(QUEUE);
        assert_eq!(broker.depth(&dead_letter), 1);

        let mut dlq = broker.consume(&dead_letter).await.unwrap();
        assert_eq!(dlq.next().await.unwrap().payload, b"poison");
    }

    #[tokio::test]
    async fn test_dead_letter_queue_is_capped() {
        let broker = MemoryBroker::with_dead_letter_capacity(2);
        for payload in [b"a", b"b", b"c"] {
            broker.publish(QUEUE, payload.to_vec()).await.unwrap();
        }

        let mut consumer = broker.consume(QUEUE).await.unwrap();
        for _ in 0..3 {
            consumer.next().await.unwrap().nack(false).await.unwrap();
        }

        let dead_letter = dead_letter_queue(QUEUE);
        assert_eq!(broker.depth(&dead_letter), 2);
        let mut dlq = broker.consume(&dead_letter).await.unwrap();
        assert_eq!(dlq.next().await.unwrap().payload, b"b");
        assert_eq!(dlq.next().await.unwrap().payload, b"c");
    }

    #[tokio::test]
    async fn test_dropped_delivery_is_redelivered() {
        let broker = MemoryBroker::new();
        broker.publish(QUEUE, b"one".to_vec()).await.unwrap();

        let mut consumer = broker.consume(QUEUE).await.unwrap();
        drop(consumer.next().await.unwrap());

        assert_eq!(broker.unacked(QUEUE), 0);
        assert_eq!(broker.depth(QUEUE), 1);
        assert!(consumer.next().await.unwrap().redelivered);
    }

    #[tokio::test]
    async fn test_consumer_waits_for_publish() {
        let broker = MemoryBroker::new();
        let mut consumer = broker.consume(QUEUE).await.unwrap();

        let producer = broker.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.publish(QUEUE, b"late".to_vec()).await.unwrap();
        });

        let delivery = tokio::time::timeout(Duration::from_secs(2), consumer.next())
            .await
            .expect("consumer should wake on publish")
            .unwrap();
        assert_eq!(delivery.payload, b"late");
    }

    #[tokio::test]
    async fn test_competing_consumers_get_distinct_messages() {
        let broker = MemoryBroker::new();
        broker.publish(QUEUE, b"a".to_vec()).await.unwrap();
        broker.publish(QUEUE, b"b".to_vec()).await.unwrap();

        let mut first = broker.consume(QUEUE).await.unwrap();
        let mut second = broker.consume(QUEUE).await.unwrap();

        let a = first.next().await.unwrap();
        let b = second.next().await.unwrap();
        assert_ne!(a.payload, b.payload);
        assert_eq!(broker.unacked(QUEUE), 2);
    }

    #[tokio::test]
    async fn test_queues_are_isolated() {
        let broker = MemoryBroker::new();
        broker.publish("q-a", b"a".to_vec()).await.unwrap();

        assert_eq!(broker.depth("q-a"), 1);
        assert_eq!(broker.depth("q-b"), 0);
        assert_eq!(broker.total_published(), 1);
    }

    #[tokio::test]
    async fn test_empty_queue_name_rejected() {
        let broker = MemoryBroker::new();
        assert!(matches!(
            broker.publish("", b"x".to_vec()).await,
            Err(BrokerError::PublishRejected { .. })
        ));
        assert!(broker.consume("").await.is_err());
        assert_eq!(broker.total_published(), 0);
    }
}
