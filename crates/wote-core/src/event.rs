//! Domain events and their wire codec
//!
//! Events travel as UTF-8 JSON text tagged by a `type` discriminator:
//!
//! ```text
//! {"type":"post","message":"hello"}
//! {"type":"vote","id":"<hex>"}
//! {"type":"remove","id":"<hex>"}
//! ```
//!
//! A post's permanent identifier is the SHA-256 of its raw wire bytes, not
//! any field of the event. Two byte-identical submissions therefore collapse
//! to the same identifier, and votes/removals reference that same space.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{WoteError, WoteResult};

/// A domain event published on a content topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Event {
    /// A new message posted to the board
    Post {
        /// The message text
        message: String,
    },
    /// A single upvote for an existing post
    Vote {
        /// Identifier of the post being voted for
        id: String,
    },
    /// Marks an existing post as removed
    Remove {
        /// Identifier of the post being removed
        id: String,
    },
}

impl Event {
    /// Serialize to the JSON wire payload.
    pub fn encode(&self) -> WoteResult<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| WoteError::Serialization(e.to_string()))
    }

    /// Deserialize an event from raw wire bytes.
    ///
    /// # Errors
    ///
    /// Returns [`WoteError::Decode`] for malformed JSON or an unknown
    /// `type` discriminator. Callers processing a stream are expected to
    /// drop the message and continue.
    pub fn decode(raw: &[u8]) -> WoteResult<Self> {
        serde_json::from_slice(raw).map_err(|e| WoteError::Decode(e.to_string()))
    }
}

/// Content-addressed identifier of a raw wire payload.
///
/// Lowercase hex of SHA-256 over the exact bytes as received. This is the
/// identifier space shared by posts, votes, and removals.
pub fn identifier_of(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}
