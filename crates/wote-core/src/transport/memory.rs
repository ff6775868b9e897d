//! In-process transport with retained history
//!
//! A broker that keeps the full message log per topic and fans live
//! publishes out to subscribers. Cloning shares the broker, so several
//! sessions in one process see the same topics. This is the primary
//! harness for integration tests and works for single-process demos.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::error::WoteResult;
use crate::topic::Topic;
use crate::transport::{
    History, RawMessage, Subscription, Transport, HISTORY_PAGE_SIZE,
};

struct Subscriber {
    tx: mpsc::Sender<RawMessage>,
    token: CancellationToken,
}

#[derive(Default)]
struct TopicState {
    history: Vec<RawMessage>,
    subscribers: Vec<Subscriber>,
}

/// Shared in-memory broker implementing [`Transport`].
#[derive(Clone, Default)]
pub struct MemoryTransport {
    topics: Arc<Mutex<HashMap<Topic, TopicState>>>,
}

impl MemoryTransport {
    /// Create an empty broker.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn query_history(&self, topic: &Topic) -> WoteResult<History> {
        let topics = self.topics.lock().await;
        let messages = topics
            .get(topic)
            .map(|state| state.history.clone())
            .unwrap_or_default();
        Ok(History::from_messages(messages, HISTORY_PAGE_SIZE))
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        tx: mpsc::Sender<RawMessage>,
    ) -> WoteResult<Subscription> {
        let token = CancellationToken::new();
        let mut topics = self.topics.lock().await;
        topics.entry(*topic).or_default().subscribers.push(Subscriber {
            tx,
            token: token.clone(),
        });
        Ok(Subscription::new(token))
    }

    async fn publish(&self, topic: &Topic, payload: RawMessage) -> WoteResult<()> {
        let mut topics = self.topics.lock().await;
        let state = topics.entry(*topic).or_default();

        state.history.push(payload.clone());
        trace!(topic = %topic, len = payload.len(), "Published to in-memory topic");

        // Drop detached or dead subscribers, deliver to the rest
        state.subscribers.retain(|s| !s.token.is_cancelled());
        for subscriber in &state.subscribers {
            let _ = subscriber.tx.send(payload.clone()).await;
        }
        state.subscribers.retain(|s| !s.tx.is_closed());

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KEY_LEN;

    fn topic(byte: u8) -> Topic {
        Topic::from_bytes([byte; KEY_LEN])
    }

    #[tokio::test]
    async fn test_history_accumulates_in_order() {
        let transport = MemoryTransport::new();
        let t = topic(1);

        transport.publish(&t, b"one".to_vec()).await.unwrap();
        transport.publish(&t, b"two".to_vec()).await.unwrap();

        let mut history = transport.query_history(&t).await.unwrap();
        let page = history.next_page().await.unwrap();
        assert_eq!(page.messages, vec![b"one".to_vec(), b"two".to_vec()]);
        assert!(history.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_history_is_paginated() {
        let transport = MemoryTransport::new();
        let t = topic(1);

        for i in 0..(HISTORY_PAGE_SIZE + 3) {
            transport.publish(&t, vec![i as u8]).await.unwrap();
        }

        let mut history = transport.query_history(&t).await.unwrap();
        let first = history.next_page().await.unwrap();
        assert_eq!(first.messages.len(), HISTORY_PAGE_SIZE);
        let second = history.next_page().await.unwrap();
        assert_eq!(second.messages.len(), 3);
        assert!(history.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_topics_are_isolated() {
        let transport = MemoryTransport::new();
        transport.publish(&topic(1), b"a".to_vec()).await.unwrap();

        let mut history = transport.query_history(&topic(2)).await.unwrap();
        assert!(history.next_page().await.is_none());
    }

    #[tokio::test]
    async fn test_subscriber_receives_publishes() {
        let transport = MemoryTransport::new();
        let t = topic(1);

        let (tx, mut rx) = mpsc::channel(8);
        let _subscription = transport.subscribe(&t, tx).await.unwrap();

        transport.publish(&t, b"live".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"live".to_vec());
    }

    #[tokio::test]
    async fn test_unsubscribed_receiver_gets_nothing() {
        let transport = MemoryTransport::new();
        let t = topic(1);

        let (tx, mut rx) = mpsc::channel(8);
        let subscription = transport.subscribe(&t, tx).await.unwrap();
        subscription.unsubscribe();

        transport.publish(&t, b"late".to_vec()).await.unwrap();
        // The subscriber was pruned before delivery; channel closes instead
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_clones_share_the_broker() {
        let transport = MemoryTransport::new();
        let other = transport.clone();
        let t = topic(1);

        transport.publish(&t, b"shared".to_vec()).await.unwrap();

        let mut history = other.query_history(&t).await.unwrap();
        let page = history.next_page().await.unwrap();
        assert_eq!(page.messages, vec![b"shared".to_vec()]);
    }
}
