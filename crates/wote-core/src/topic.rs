//! Derived topics and their wire naming
//!
//! A [`Topic`] is the 32-byte tail of the one-way derivation chain in
//! [`crate::identity`]. On the wire it is addressed by a namespaced string,
//! and on the gossip layer by a `TopicId` derived from that string with
//! BLAKE3 under a domain-separation prefix.

use std::fmt;

use iroh_gossip::proto::TopicId;
use sha2::{Digest, Sha256};

use crate::error::WoteResult;
use crate::identity::{decode_key, KEY_LEN};

/// Application namespace in topic names
pub const APP_NAME: &str = "wote-app";

/// Topic naming convention version
pub const APP_VERSION: u32 = 1;

/// Domain separation prefix for gossip topic ids.
const GOSSIP_TOPIC_PREFIX: &[u8] = b"wote-gossip-topic-v1:";

/// A derived 32-byte topic hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Topic([u8; KEY_LEN]);

impl Topic {
    /// Wrap raw derived topic bytes.
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a hex-encoded topic.
    pub fn from_hex(hex_topic: &str) -> WoteResult<Self> {
        Ok(Self(decode_key(hex_topic, "topic")?))
    }

    /// Derive the content topic from a hex-encoded shared secret.
    ///
    /// This is the participant path: it reaches the content topic without
    /// ever touching the private key, and cannot reach the admin topic.
    pub fn from_secret_hex(secret_hex: &str) -> WoteResult<Self> {
        let secret = decode_key(secret_hex, "secret")?;
        Ok(Self(Sha256::digest(secret).into()))
    }

    /// The raw topic bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Hex encoding of the topic bytes.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// The namespaced topic name used on the wire: `/wote-app/1/<hex>`.
    pub fn name(&self) -> String {
        format!("/{}/{}/{}", APP_NAME, APP_VERSION, self.to_hex())
    }

    /// Derive the gossip `TopicId` for this topic.
    ///
    /// Hashes the namespaced topic name under a domain-separation prefix so
    /// gossip topic ids can never collide with other uses of the hash.
    pub fn gossip_id(&self) -> TopicId {
        let name = self.name();
        let mut input = Vec::with_capacity(GOSSIP_TOPIC_PREFIX.len() + name.len());
        input.extend_from_slice(GOSSIP_TOPIC_PREFIX);
        input.extend_from_slice(name.as_bytes());

        let hash = blake3::hash(&input);
        TopicId::from_bytes(*hash.as_bytes())
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Topic({})", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Identity;

    #[test]
    fn test_name_follows_wire_convention() {
        let topic = Topic::from_bytes([0xab; KEY_LEN]);
        let name = topic.name();
        assert!(name.starts_with("/wote-app/1/"));
        assert!(name.ends_with(&"ab".repeat(KEY_LEN)));
    }

    #[test]
    fn test_hex_roundtrip() {
        let topic = Topic::from_bytes([3u8; KEY_LEN]);
        let restored = Topic::from_hex(&topic.to_hex()).unwrap();
        assert_eq!(topic, restored);
    }

    #[test]
    fn test_from_hex_rejects_bad_input() {
        assert!(Topic::from_hex("xyz").is_err());
        assert!(Topic::from_hex("abcd").is_err());
    }

    #[test]
    fn test_from_secret_matches_identity_derivation() {
        let identity = Identity::generate();
        let topic = Topic::from_secret_hex(&identity.content_secret_hex()).unwrap();
        assert_eq!(&topic, identity.content_topic());
    }

    #[test]
    fn test_gossip_id_deterministic_and_distinct() {
        let a = Topic::from_bytes([1u8; KEY_LEN]);
        let b = Topic::from_bytes([2u8; KEY_LEN]);

        assert_eq!(a.gossip_id(), a.gossip_id());
        assert_ne!(a.gossip_id(), b.gossip_id());
    }

    #[test]
    fn test_gossip_id_is_not_the_topic_bytes() {
        // The gossip id is a separate derivation, not the raw topic hash
        let topic = Topic::from_bytes([9u8; KEY_LEN]);
        assert_ne!(topic.gossip_id().as_bytes(), topic.as_bytes());
    }
}
