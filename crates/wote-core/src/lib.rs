//! wote core library
//!
//! Event-sourced P2P posting and voting over gossip topics.
//!
//! ## Overview
//!
//! An admin derives a chain of secrets and topics from a private key; anyone
//! holding the shared content secret can post messages and vote on or remove
//! them. Nothing is coordinated centrally: every node rebuilds the board by
//! replaying the topic's message log from a store and folding live gossip
//! traffic on top of it with a deterministic reducer.
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use wote_core::{AdminSession, Session, Transport, MemoryTransport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport: Arc<dyn Transport> = Arc::new(MemoryTransport::new());
//!
//!     // Admin creates a topic and shares the content secret
//!     let admin = AdminSession::create(transport.clone(), None).await?;
//!     let secret = admin.identity().content_secret_hex();
//!
//!     // A participant joins with the secret alone
//!     let session = Session::join(transport.clone(), &secret).await?;
//!     let id = session.post("hello").await?;
//!     session.vote(&id).await?;
//!
//!     Ok(())
//! }
//! ```

pub mod board;
pub mod error;
pub mod event;
pub mod identity;
pub mod session;
pub mod store;
pub mod topic;
pub mod transport;

// Re-exports
pub use board::{Board, PostRecord};
pub use error::{WoteError, WoteResult};
pub use event::{identifier_of, Event};
pub use identity::Identity;
pub use session::{
    cast_vote, post_message, remove_post, AdminSession, BoardEvent, LiveBoard, Session,
};
pub use store::HistoryStore;
pub use topic::{Topic, APP_NAME, APP_VERSION};
pub use transport::{
    GossipConfig, GossipTransport, History, HistoryPage, MemoryTransport, RawMessage,
    Subscription, Transport,
};
