//! Identity and topic derivation
//!
//! Every wote topic is rooted in a 32-byte private key owned by the admin.
//! All downstream material is derived from it with a one-way SHA-256 chain:
//!
//! ```text
//! public_key     = ed25519(private_key)
//! content_secret = SHA-256(public_key)      -- shared with participants
//! content_topic  = SHA-256(content_secret)  -- where posts and votes live
//! admin_secret   = SHA-256(private_key)     -- known only to the admin
//! admin_topic    = SHA-256(admin_secret)    -- operator side channel
//! ```
//!
//! Knowing a topic does not reveal the secret that produced it, and knowing
//! the content secret does not reveal the private key, so handing out the
//! content secret grants read/write access to the board without granting
//! admin capabilities.

use ed25519_dalek::SigningKey;
use rand::RngCore;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{WoteError, WoteResult};
use crate::topic::Topic;

/// Length of a private key, shared secret, or derived topic in bytes
pub const KEY_LEN: usize = 32;

fn sha256(data: &[u8]) -> [u8; KEY_LEN] {
    Sha256::digest(data).into()
}

/// Identity material for an admin: the private key and everything
/// derived from it.
///
/// Construction is deterministic: the same private key always yields the
/// same public key, secrets, and topics.
#[derive(Clone)]
pub struct Identity {
    private_key: [u8; KEY_LEN],
    public_key: [u8; KEY_LEN],
    content_secret: [u8; KEY_LEN],
    content_topic: Topic,
    admin_secret: [u8; KEY_LEN],
    admin_topic: Topic,
}

impl Identity {
    /// Derive a full identity from a 32-byte private key.
    pub fn from_bytes(private_key: [u8; KEY_LEN]) -> Self {
        let signing_key = SigningKey::from_bytes(&private_key);
        let public_key = signing_key.verifying_key().to_bytes();

        let content_secret = sha256(&public_key);
        let content_topic = Topic::from_bytes(sha256(&content_secret));
        let admin_secret = sha256(&private_key);
        let admin_topic = Topic::from_bytes(sha256(&admin_secret));

        let identity = Self {
            private_key,
            public_key,
            content_secret,
            content_topic,
            admin_secret,
            admin_topic,
        };

        debug!(
            public_key = %identity.public_key_hex(),
            content_topic = %identity.content_topic,
            admin_topic = %identity.admin_topic,
            "Derived identity"
        );

        identity
    }

    /// Derive a full identity from a hex-encoded private key.
    ///
    /// # Errors
    ///
    /// Returns [`WoteError::InvalidKey`] if the input is not valid hex or
    /// does not decode to exactly 32 bytes.
    pub fn from_hex(private_key_hex: &str) -> WoteResult<Self> {
        let bytes = decode_key(private_key_hex, "private key")?;
        Ok(Self::from_bytes(bytes))
    }

    /// Generate a new identity from a random private key.
    pub fn generate() -> Self {
        let mut private_key = [0u8; KEY_LEN];
        rand::rng().fill_bytes(&mut private_key);
        Self::from_bytes(private_key)
    }

    /// The raw private key bytes. Never transmitted.
    pub fn private_key(&self) -> &[u8; KEY_LEN] {
        &self.private_key
    }

    /// Hex encoding of the private key.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key)
    }

    /// Hex encoding of the Ed25519 public key.
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key)
    }

    /// The shared secret granting participant access to the content topic.
    pub fn content_secret_hex(&self) -> String {
        hex::encode(self.content_secret)
    }

    /// The content topic where posts, votes, and removals are published.
    pub fn content_topic(&self) -> &Topic {
        &self.content_topic
    }

    /// The admin-only secret. Derivable only from the private key.
    pub fn admin_secret_hex(&self) -> String {
        hex::encode(self.admin_secret)
    }

    /// The admin side-channel topic.
    pub fn admin_topic(&self) -> &Topic {
        &self.admin_topic
    }
}

impl std::fmt::Debug for Identity {
    // Keep secret material out of debug output
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Identity")
            .field("public_key", &self.public_key_hex())
            .field("content_topic", &self.content_topic)
            .field("admin_topic", &self.admin_topic)
            .finish_non_exhaustive()
    }
}

/// Decode hex key material, requiring exactly 32 bytes.
pub(crate) fn decode_key(input: &str, what: &str) -> WoteResult<[u8; KEY_LEN]> {
    let bytes = hex::decode(input)
        .map_err(|e| WoteError::InvalidKey(format!("{} is not valid hex: {}", what, e)))?;
    if bytes.len() != KEY_LEN {
        return Err(WoteError::InvalidKey(format!(
            "{} must be {} bytes (got {})",
            what,
            KEY_LEN,
            bytes.len()
        )));
    }
    let mut out = [0u8; KEY_LEN];
    out.copy_from_slice(&bytes);
    Ok(out)
}
