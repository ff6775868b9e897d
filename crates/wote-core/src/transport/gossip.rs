//! Gossip-backed transport using iroh-gossip
//!
//! Live traffic rides iroh-gossip topics derived from the wote topic hash.
//! Durability is delegated to a local [`HistoryStore`]: every payload this
//! node observes (including its own publishes) is appended to the per-topic
//! log, and history queries replay that log. A node that stays online for a
//! topic therefore acts as its store node across restarts.
//!
//! Own publishes are also echoed to local subscriptions, since gossip does
//! not deliver a broadcast back to its sender.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use iroh::discovery::static_provider::StaticProvider;
use iroh::protocol::Router;
use iroh::{Endpoint, EndpointAddr, SecretKey};
use iroh_gossip::net::{Gossip, GOSSIP_ALPN};
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{WoteError, WoteResult};
use crate::store::HistoryStore;
use crate::topic::Topic;
use crate::transport::{
    History, RawMessage, Subscription, Transport, HISTORY_PAGE_SIZE,
};

/// Configuration for [`GossipTransport::connect`].
pub struct GossipConfig {
    /// Directory holding the history log
    pub data_dir: PathBuf,
    /// Peers to bootstrap topic swarms from (can be empty for a first node)
    pub bootstrap: Vec<iroh::EndpointId>,
    /// Endpoint secret key; generated when absent
    pub secret_key: Option<SecretKey>,
}

impl GossipConfig {
    /// Config with no bootstrap peers and a fresh endpoint key.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            bootstrap: Vec::new(),
            secret_key: None,
        }
    }
}

struct LocalSubscriber {
    tx: mpsc::Sender<RawMessage>,
    token: CancellationToken,
}

/// Per-topic gossip machinery, shared with the receive loop.
#[derive(Clone)]
struct TopicRuntime {
    sender: Arc<Mutex<iroh_gossip::api::GossipSender>>,
    subscribers: Arc<Mutex<Vec<LocalSubscriber>>>,
    joined: watch::Receiver<bool>,
}

/// [`Transport`] over iroh-gossip with a redb-backed history log.
pub struct GossipTransport {
    endpoint: Endpoint,
    gossip: Gossip,
    router: Router,
    static_provider: StaticProvider,
    store: HistoryStore,
    bootstrap: Vec<iroh::EndpointId>,
    topics: Mutex<HashMap<Topic, TopicRuntime>>,
}

impl GossipTransport {
    /// Bind an endpoint, spawn the gossip protocol, and open the history
    /// log. Suspends until the endpoint is bound.
    pub async fn connect(config: GossipConfig) -> WoteResult<Self> {
        let secret_key = config
            .secret_key
            .unwrap_or_else(|| SecretKey::generate(&mut rand::rng()));

        let static_provider = StaticProvider::new();

        let endpoint = Endpoint::builder()
            .secret_key(secret_key)
            .alpns(vec![GOSSIP_ALPN.to_vec()])
            .discovery(static_provider.clone())
            .bind()
            .await
            .map_err(|e| WoteError::Transport(format!("Failed to bind endpoint: {}", e)))?;

        let endpoint_id = endpoint.id();
        info!(%endpoint_id, "Endpoint bound");

        let gossip = Gossip::builder().spawn(endpoint.clone());
        let router = Router::builder(endpoint.clone())
            .accept(GOSSIP_ALPN, gossip.clone())
            .spawn();

        let store = HistoryStore::open(config.data_dir.join("history.redb"))?;

        Ok(Self {
            endpoint,
            gossip,
            router,
            static_provider,
            store,
            bootstrap: config.bootstrap,
            topics: Mutex::new(HashMap::new()),
        })
    }

    /// This node's endpoint id, shareable with peers for bootstrapping.
    pub fn endpoint_id(&self) -> iroh::EndpointId {
        self.endpoint.id()
    }

    /// Add a peer's full address for direct connection establishment.
    pub fn add_peer_addr(&self, endpoint_addr: EndpointAddr) {
        debug!(peer = %endpoint_addr.id, "Adding peer address to static discovery");
        self.static_provider.add_endpoint_info(endpoint_addr);
    }

    /// Wait until at least one neighbor is present on the topic's swarm.
    ///
    /// Returns `false` on timeout. Useful before a one-shot publish, since
    /// gossip delivers only to currently connected neighbors.
    pub async fn wait_for_neighbor(&self, topic: &Topic, timeout: Duration) -> WoteResult<bool> {
        let runtime = self.runtime_for(topic).await?;
        let mut joined = runtime.joined.clone();
        let result = match tokio::time::timeout(timeout, joined.wait_for(|j| *j)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(_)) => Ok(false),
            Err(_) => {
                debug!(topic = %topic, "Timeout waiting for neighbor");
                Ok(false)
            }
        };
        result
    }

    /// Gracefully shut down the router and endpoint.
    pub async fn shutdown(self) -> WoteResult<()> {
        info!("Shutting down gossip transport");
        if let Err(e) = self.router.shutdown().await {
            warn!(error = ?e, "Failed to shutdown router cleanly");
        }
        self.endpoint.close().await;
        Ok(())
    }

    /// Join the gossip swarm for a topic, or reuse the existing join.
    async fn runtime_for(&self, topic: &Topic) -> WoteResult<TopicRuntime> {
        let mut topics = self.topics.lock().await;
        if let Some(runtime) = topics.get(topic) {
            return Ok(runtime.clone());
        }

        let topic_id = topic.gossip_id();
        info!(topic = %topic, ?topic_id, peers = self.bootstrap.len(), "Joining gossip topic");

        let gossip_topic = self
            .gossip
            .subscribe(topic_id, self.bootstrap.clone())
            .await
            .map_err(|e| WoteError::Transport(format!("Failed to subscribe: {}", e)))?;
        let (sender, receiver) = gossip_topic.split();

        let subscribers = Arc::new(Mutex::new(Vec::new()));
        let (joined_tx, joined_rx) = watch::channel(false);

        let runtime = TopicRuntime {
            sender: Arc::new(Mutex::new(sender)),
            subscribers: subscribers.clone(),
            joined: joined_rx,
        };
        topics.insert(*topic, runtime.clone());

        let store = self.store.clone();
        let topic = *topic;
        tokio::spawn(async move {
            receive_loop(topic, receiver, store, subscribers, joined_tx).await;
        });

        Ok(runtime)
    }
}

/// Consume gossip events for one topic: persist and fan out messages,
/// track neighbor presence.
async fn receive_loop(
    topic: Topic,
    mut receiver: iroh_gossip::api::GossipReceiver,
    store: HistoryStore,
    subscribers: Arc<Mutex<Vec<LocalSubscriber>>>,
    joined_tx: watch::Sender<bool>,
) {
    use iroh_gossip::api::Event;
    use n0_future::StreamExt;

    loop {
        match receiver.try_next().await {
            Ok(Some(event)) => match event {
                Event::Received(msg) => {
                    debug!(topic = %topic, from = ?msg.delivered_from, "Received message");
                    if let Err(e) = store.append(&topic, &msg.content) {
                        warn!(topic = %topic, error = %e, "Failed to persist message");
                    }
                    deliver(&subscribers, msg.content.to_vec()).await;
                }
                Event::NeighborUp(peer) => {
                    info!(topic = %topic, ?peer, "Neighbor joined");
                    let _ = joined_tx.send(true);
                }
                Event::NeighborDown(peer) => {
                    debug!(topic = %topic, ?peer, "Neighbor left");
                }
                Event::Lagged => {
                    warn!(topic = %topic, "Lagged behind on topic");
                }
            },
            Ok(None) => {
                debug!(topic = %topic, "Topic subscription closed");
                break;
            }
            Err(e) => {
                warn!(topic = %topic, error = ?e, "Error receiving from topic");
                break;
            }
        }
    }
}

/// Push a payload to every attached local subscription, pruning detached
/// and dead ones.
async fn deliver(subscribers: &Mutex<Vec<LocalSubscriber>>, payload: RawMessage) {
    let mut subs = subscribers.lock().await;
    subs.retain(|s| !s.token.is_cancelled());
    for subscriber in subs.iter() {
        let _ = subscriber.tx.send(payload.clone()).await;
    }
    subs.retain(|s| !s.tx.is_closed());
}

#[async_trait]
impl Transport for GossipTransport {
    async fn query_history(&self, topic: &Topic) -> WoteResult<History> {
        let messages = self.store.load(topic)?;
        debug!(topic = %topic, messages = messages.len(), "Serving history from store");
        Ok(History::from_messages(messages, HISTORY_PAGE_SIZE))
    }

    async fn subscribe(
        &self,
        topic: &Topic,
        tx: mpsc::Sender<RawMessage>,
    ) -> WoteResult<Subscription> {
        let runtime = self.runtime_for(topic).await?;
        let token = CancellationToken::new();
        runtime.subscribers.lock().await.push(LocalSubscriber {
            tx,
            token: token.clone(),
        });
        Ok(Subscription::new(token))
    }

    async fn publish(&self, topic: &Topic, payload: RawMessage) -> WoteResult<()> {
        let runtime = self.runtime_for(topic).await?;

        // Persist first: the local log is this node's durable store
        self.store.append(topic, &payload)?;

        runtime
            .sender
            .lock()
            .await
            .broadcast(payload.clone().into())
            .await
            .map_err(|e| WoteError::Transport(format!("Failed to broadcast: {}", e)))?;

        // Gossip does not echo to the sender; local subscriptions still
        // need to observe this publish
        deliver(&runtime.subscribers, payload).await;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::KEY_LEN;
    use tempfile::TempDir;

    fn topic(byte: u8) -> Topic {
        Topic::from_bytes([byte; KEY_LEN])
    }

    async fn transport(dir: &TempDir) -> GossipTransport {
        GossipTransport::connect(GossipConfig::new(dir.path()))
            .await
            .expect("Failed to create gossip transport")
    }

    #[tokio::test]
    async fn test_connect_and_shutdown() {
        let dir = TempDir::new().unwrap();
        let t = transport(&dir).await;
        assert!(!t.endpoint_id().to_string().is_empty());
        t.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_publish_lands_in_history() {
        let dir = TempDir::new().unwrap();
        let t = transport(&dir).await;
        let topic = topic(1);

        t.publish(&topic, b"first".to_vec()).await.unwrap();
        t.publish(&topic, b"second".to_vec()).await.unwrap();

        let mut history = t.query_history(&topic).await.unwrap();
        let page = history.next_page().await.unwrap();
        assert_eq!(page.messages, vec![b"first".to_vec(), b"second".to_vec()]);

        t.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_local_subscription_sees_own_publish() {
        let dir = TempDir::new().unwrap();
        let t = transport(&dir).await;
        let topic = topic(1);

        let (tx, mut rx) = mpsc::channel(8);
        let _subscription = t.subscribe(&topic, tx).await.unwrap();

        t.publish(&topic, b"echoed".to_vec()).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), b"echoed".to_vec());

        t.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_history_survives_restart() {
        let dir = TempDir::new().unwrap();
        let topic = topic(1);

        {
            let t = transport(&dir).await;
            t.publish(&topic, b"durable".to_vec()).await.unwrap();
            t.shutdown().await.unwrap();
        }

        let t = transport(&dir).await;
        let mut history = t.query_history(&topic).await.unwrap();
        let page = history.next_page().await.unwrap();
        assert_eq!(page.messages, vec![b"durable".to_vec()]);
        t.shutdown().await.unwrap();
    }
}
