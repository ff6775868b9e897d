//! The transport contract and its shipped implementations
//!
//! The core treats the messaging layer as a black box with a narrow
//! surface: fetch the durable history of a topic, subscribe to live
//! traffic, and publish raw bytes. Message bodies are opaque here; the
//! codec and reducer live above this seam.
//!
//! ## Handoff contract
//!
//! A session folds the full history before attaching its live
//! subscription. Implementations must sequence the two so that no message
//! is lost or delivered twice across the boundary: everything durable at
//! `query_history` time appears in the history (and only there), and
//! everything arriving afterwards reaches subscriptions attached
//! afterwards. The core performs no deduplication.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WoteResult;
use crate::topic::Topic;

mod gossip;
mod memory;

pub use gossip::{GossipConfig, GossipTransport};
pub use memory::MemoryTransport;

/// A raw wire payload, opaque to the transport.
pub type RawMessage = Vec<u8>;

/// Number of messages per history page.
pub(crate) const HISTORY_PAGE_SIZE: usize = 16;

/// One page of historical messages, oldest first.
#[derive(Debug, Default)]
pub struct HistoryPage {
    /// Raw payloads in store retrieval order
    pub messages: Vec<RawMessage>,
}

/// A finite, paginated sequence of historical messages for one topic.
///
/// Pages are awaited in order; the store's retrieval order is the only
/// ordering guarantee. The sequence ends when [`History::next_page`]
/// returns `None`. Restarting requires reissuing the query.
pub struct History {
    rx: mpsc::Receiver<HistoryPage>,
}

impl History {
    /// Build a history from a channel of pages.
    pub fn new(rx: mpsc::Receiver<HistoryPage>) -> Self {
        Self { rx }
    }

    /// Build a history over an already-materialized message log.
    pub fn from_messages(messages: Vec<RawMessage>, page_size: usize) -> Self {
        let pages: Vec<HistoryPage> = messages
            .chunks(page_size.max(1))
            .map(|chunk| HistoryPage {
                messages: chunk.to_vec(),
            })
            .collect();

        let (tx, rx) = mpsc::channel(pages.len().max(1));
        for page in pages {
            // Capacity covers every page, so this cannot fail
            let _ = tx.try_send(page);
        }
        Self { rx }
    }

    /// Await the next page, or `None` once the history is exhausted.
    pub async fn next_page(&mut self) -> Option<HistoryPage> {
        self.rx.recv().await
    }
}

/// Handle detaching a live subscription.
///
/// `unsubscribe` is idempotent; messages already queued for delivery when
/// it is called may still be processed by the consumer.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
}

impl Subscription {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Detach the subscription. Safe to call more than once.
    pub fn unsubscribe(&self) {
        self.token.cancel();
    }

    /// Whether the subscription is still attached.
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }
}

/// The external messaging collaborator.
///
/// Implementations own connectivity, retry policy, and durability; the
/// core only sequences calls and folds payloads.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Fetch the durable message log for a topic, oldest first.
    async fn query_history(&self, topic: &Topic) -> WoteResult<History>;

    /// Register a live subscription. Each new raw message is pushed into
    /// `tx` until the returned [`Subscription`] is cancelled.
    async fn subscribe(
        &self,
        topic: &Topic,
        tx: mpsc::Sender<RawMessage>,
    ) -> WoteResult<Subscription>;

    /// Best-effort publish of a raw payload to a topic.
    async fn publish(&self, topic: &Topic, payload: RawMessage) -> WoteResult<()>;
}
