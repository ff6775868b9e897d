//! Sessions: replay history, then fold live traffic
//!
//! A session bootstraps in two strictly ordered phases. First the topic's
//! durable history is fetched and folded page by page into a fresh
//! [`Board`]; only then is the live subscription attached. From that point
//! a single spawned task owns all mutation: raw messages flow through one
//! queue into it, it folds them, publishes board snapshots through a watch
//! channel, and emits per-message notifications on a broadcast channel.
//! Serializing every fold through one owner removes any read-modify-write
//! race between replay and live delivery.
//!
//! A corrupt payload is never fatal: it is logged, surfaced as
//! [`BoardEvent::Dropped`], and the stream continues.

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::board::Board;
use crate::error::WoteResult;
use crate::event::{identifier_of, Event};
use crate::identity::Identity;
use crate::topic::Topic;
use crate::transport::{Subscription, Transport};

const EVENT_CHANNEL_CAPACITY: usize = 256;
const LIVE_QUEUE_CAPACITY: usize = 256;

/// Notification emitted for each live message.
#[derive(Debug, Clone)]
pub enum BoardEvent {
    /// A decoded event was folded into the board
    Message {
        /// Content-addressed identifier of the message
        id: String,
        /// The decoded event
        event: Event,
    },
    /// A raw payload failed to decode and was dropped
    Dropped {
        /// Decode failure description
        reason: String,
    },
}

/// A continuously updated board for one topic.
///
/// Holds the live subscription and the fold task. Snapshot reads go
/// through [`LiveBoard::board`]; consumers needing change notifications
/// use [`LiveBoard::watch`] or [`LiveBoard::subscribe_events`].
pub struct LiveBoard {
    board_rx: watch::Receiver<Board>,
    event_tx: broadcast::Sender<BoardEvent>,
    subscription: Subscription,
    fold_task: JoinHandle<()>,
}

impl LiveBoard {
    /// Replay a topic's history, then attach the live subscription.
    pub async fn open(transport: &dyn Transport, topic: &Topic) -> WoteResult<Self> {
        // Phase 1: fold the durable history before anything can interleave
        let mut board = Board::new();
        let mut replayed = 0usize;
        let mut history = transport.query_history(topic).await?;
        while let Some(page) = history.next_page().await {
            for raw in &page.messages {
                match Event::decode(raw) {
                    Ok(event) => {
                        board.apply(&event, &identifier_of(raw));
                        replayed += 1;
                    }
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable message from history");
                    }
                }
            }
        }
        debug!(topic = %topic, messages = replayed, posts = board.len(), "History replayed");

        // Phase 2: go live; the spawned task is the board's only writer
        let (raw_tx, mut raw_rx) = mpsc::channel(LIVE_QUEUE_CAPACITY);
        let subscription = transport.subscribe(topic, raw_tx).await?;

        let (board_tx, board_rx) = watch::channel(board);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let notifier = event_tx.clone();
        let topic = *topic;
        let fold_task = tokio::spawn(async move {
            while let Some(raw) = raw_rx.recv().await {
                match Event::decode(&raw) {
                    Ok(event) => {
                        let id = identifier_of(&raw);
                        board_tx.send_modify(|board| {
                            board.apply(&event, &id);
                        });
                        let _ = notifier.send(BoardEvent::Message { id, event });
                    }
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping undecodable live message");
                        let _ = notifier.send(BoardEvent::Dropped {
                            reason: e.to_string(),
                        });
                    }
                }
            }
            debug!(topic = %topic, "Fold task finished");
        });

        Ok(Self {
            board_rx,
            event_tx,
            subscription,
            fold_task,
        })
    }

    /// Snapshot of the current board.
    pub fn board(&self) -> Board {
        self.board_rx.borrow().clone()
    }

    /// Watch receiver notified after every folded message.
    pub fn watch(&self) -> watch::Receiver<Board> {
        self.board_rx.clone()
    }

    /// Subscribe to per-message notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.event_tx.subscribe()
    }

    /// Detach the live subscription. Idempotent; messages already queued
    /// may still be folded, which is harmless by reducer idempotence.
    pub fn unsubscribe(&self) {
        self.subscription.unsubscribe();
    }
}

impl Drop for LiveBoard {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
        self.fold_task.abort();
    }
}

/// Encode and publish an event, returning its content identifier.
async fn publish_event(
    transport: &dyn Transport,
    topic: &Topic,
    event: &Event,
) -> WoteResult<String> {
    let payload = event.encode()?;
    let id = identifier_of(&payload);
    transport.publish(topic, payload).await?;
    Ok(id)
}

/// One-shot publish of a post to the topic derived from a shared secret.
/// Returns the new post's identifier.
pub async fn post_message(
    transport: &dyn Transport,
    secret_hex: &str,
    message: &str,
) -> WoteResult<String> {
    let topic = Topic::from_secret_hex(secret_hex)?;
    publish_event(
        transport,
        &topic,
        &Event::Post {
            message: message.to_string(),
        },
    )
    .await
}

/// One-shot publish of a vote for an existing post.
pub async fn cast_vote(transport: &dyn Transport, secret_hex: &str, id: &str) -> WoteResult<()> {
    let topic = Topic::from_secret_hex(secret_hex)?;
    publish_event(transport, &topic, &Event::Vote { id: id.to_string() }).await?;
    Ok(())
}

/// One-shot publish of a removal for an existing post.
pub async fn remove_post(transport: &dyn Transport, secret_hex: &str, id: &str) -> WoteResult<()> {
    let topic = Topic::from_secret_hex(secret_hex)?;
    publish_event(transport, &topic, &Event::Remove { id: id.to_string() }).await?;
    Ok(())
}

/// Participant session: a live board plus publish operations, derived
/// from the shared content secret alone.
pub struct Session {
    transport: Arc<dyn Transport>,
    topic: Topic,
    live: LiveBoard,
}

impl Session {
    /// Join a topic with the shared content secret.
    ///
    /// Replays the topic's history and attaches the live subscription
    /// before returning. The secret grants read/write access to the board
    /// and nothing else; the admin channel is out of reach from here.
    pub async fn join(transport: Arc<dyn Transport>, secret_hex: &str) -> WoteResult<Self> {
        let topic = Topic::from_secret_hex(secret_hex)?;
        debug!(topic = %topic, "Joining content topic");
        let live = LiveBoard::open(transport.as_ref(), &topic).await?;
        Ok(Self {
            transport,
            topic,
            live,
        })
    }

    /// The content topic this session is attached to.
    pub fn topic(&self) -> &Topic {
        &self.topic
    }

    /// Snapshot of the current board.
    pub fn board(&self) -> Board {
        self.live.board()
    }

    /// Watch receiver notified after every folded message.
    pub fn watch_board(&self) -> watch::Receiver<Board> {
        self.live.watch()
    }

    /// Subscribe to per-message notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.live.subscribe_events()
    }

    /// Publish a new post. Returns its content identifier.
    pub async fn post(&self, message: &str) -> WoteResult<String> {
        publish_event(
            self.transport.as_ref(),
            &self.topic,
            &Event::Post {
                message: message.to_string(),
            },
        )
        .await
    }

    /// Publish a vote for an existing post.
    pub async fn vote(&self, id: &str) -> WoteResult<()> {
        publish_event(
            self.transport.as_ref(),
            &self.topic,
            &Event::Vote { id: id.to_string() },
        )
        .await?;
        Ok(())
    }

    /// Publish a removal for an existing post.
    pub async fn remove(&self, id: &str) -> WoteResult<()> {
        publish_event(
            self.transport.as_ref(),
            &self.topic,
            &Event::Remove { id: id.to_string() },
        )
        .await?;
        Ok(())
    }

    /// Detach the live subscription. Idempotent.
    pub fn unsubscribe(&self) {
        self.live.unsubscribe();
    }
}

/// Admin session: the participant surface plus the identity material and
/// the admin side channel.
///
/// Admin-channel traffic is decoded as JSON and logged at debug level;
/// no board transitions are driven from it.
pub struct AdminSession {
    identity: Identity,
    session: Session,
    admin_subscription: Subscription,
    admin_task: JoinHandle<()>,
}

impl AdminSession {
    /// Bootstrap an admin session, generating a private key when none is
    /// supplied.
    ///
    /// Joins the content topic exactly like a participant would (via the
    /// derived content secret) and additionally subscribes to the admin
    /// topic, which only the private key can derive.
    pub async fn create(
        transport: Arc<dyn Transport>,
        private_key_hex: Option<&str>,
    ) -> WoteResult<Self> {
        let identity = match private_key_hex {
            Some(hex_key) => Identity::from_hex(hex_key)?,
            None => Identity::generate(),
        };

        let session = Session::join(transport.clone(), &identity.content_secret_hex()).await?;

        let admin_topic = *identity.admin_topic();
        let (tx, mut rx) = mpsc::channel(LIVE_QUEUE_CAPACITY);
        let admin_subscription = transport.subscribe(&admin_topic, tx).await?;
        let admin_task = tokio::spawn(async move {
            while let Some(raw) = rx.recv().await {
                match serde_json::from_slice::<serde_json::Value>(&raw) {
                    Ok(message) => {
                        debug!(topic = %admin_topic, %message, "Admin channel message");
                    }
                    Err(e) => {
                        warn!(topic = %admin_topic, error = %e, "Undecodable admin channel message");
                    }
                }
            }
        });

        Ok(Self {
            identity,
            session,
            admin_subscription,
            admin_task,
        })
    }

    /// The full identity material, private key included.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The underlying participant session on the content topic.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Snapshot of the current board.
    pub fn board(&self) -> Board {
        self.session.board()
    }

    /// Subscribe to per-message notifications.
    pub fn subscribe_events(&self) -> broadcast::Receiver<BoardEvent> {
        self.session.subscribe_events()
    }

    /// Publish a new post. Returns its content identifier.
    pub async fn post(&self, message: &str) -> WoteResult<String> {
        self.session.post(message).await
    }

    /// Publish a vote for an existing post.
    pub async fn vote(&self, id: &str) -> WoteResult<()> {
        self.session.vote(id).await
    }

    /// Publish a removal for an existing post.
    pub async fn remove(&self, id: &str) -> WoteResult<()> {
        self.session.remove(id).await
    }

    /// Detach both the content and admin subscriptions. Idempotent.
    pub fn unsubscribe(&self) {
        self.session.unsubscribe();
        self.admin_subscription.unsubscribe();
    }
}

impl Drop for AdminSession {
    fn drop(&mut self) {
        self.admin_subscription.unsubscribe();
        self.admin_task.abort();
    }
}
