//! The board: a materialized view folded from the event stream
//!
//! [`Board::apply`] is a pure, total fold. It is deterministic for any fixed
//! event order, first-writer-wins for duplicate posts, and silently ignores
//! votes and removals that reference unknown identifiers (events may arrive
//! for posts not yet seen, or carry garbage ids). These properties make it
//! safe to replay history and fold live traffic through the same code path
//! without deduplication at the boundary.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::event::Event;

fn is_false(value: &bool) -> bool {
    !*value
}

/// Current state of a single post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostRecord {
    /// The posted message text
    pub message: String,
    /// Number of votes folded so far; never decreases
    pub vote: u64,
    /// Whether the post has been removed; once set it never reverts
    #[serde(default, skip_serializing_if = "is_false")]
    pub removed: bool,
}

/// Mapping from content-addressed identifier to post state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Board {
    posts: HashMap<String, PostRecord>,
}

impl Board {
    /// Create an empty board.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event into the board.
    ///
    /// `id` is the content-addressed identifier of the event's own wire
    /// bytes; only `Post` uses it. `Vote` and `Remove` carry their target
    /// identifier as a field.
    ///
    /// Returns whether the board changed. Never fails: unknown targets and
    /// duplicate posts are no-ops.
    pub fn apply(&mut self, event: &Event, id: &str) -> bool {
        match event {
            Event::Post { message } => {
                if self.posts.contains_key(id) {
                    return false;
                }
                self.posts.insert(
                    id.to_string(),
                    PostRecord {
                        message: message.clone(),
                        vote: 0,
                        removed: false,
                    },
                );
                true
            }
            Event::Vote { id: target } => match self.posts.get_mut(target) {
                Some(record) => {
                    record.vote += 1;
                    true
                }
                None => false,
            },
            Event::Remove { id: target } => match self.posts.get_mut(target) {
                Some(record) => {
                    let changed = !record.removed;
                    record.removed = true;
                    changed
                }
                None => false,
            },
        }
    }

    /// Look up a post by identifier.
    pub fn get(&self, id: &str) -> Option<&PostRecord> {
        self.posts.get(id)
    }

    /// Number of posts on the board (including removed ones).
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    /// Whether the board holds no posts.
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    /// Iterate over all posts.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &PostRecord)> {
        self.posts.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn post(message: &str) -> Event {
        Event::Post {
            message: message.to_string(),
        }
    }

    fn vote(id: &str) -> Event {
        Event::Vote { id: id.to_string() }
    }

    fn remove(id: &str) -> Event {
        Event::Remove { id: id.to_string() }
    }

    #[test]
    fn test_post_inserts_with_zero_votes() {
        let mut board = Board::new();
        assert!(board.apply(&post("hello"), "id-a"));

        let record = board.get("id-a").unwrap();
        assert_eq!(record.message, "hello");
        assert_eq!(record.vote, 0);
        assert!(!record.removed);
    }

    #[test]
    fn test_duplicate_post_is_first_writer_wins() {
        let mut board = Board::new();
        assert!(board.apply(&post("first"), "id-a"));
        assert!(!board.apply(&post("second"), "id-a"));

        assert_eq!(board.get("id-a").unwrap().message, "first");
        assert_eq!(board.len(), 1);
    }

    #[test]
    fn test_vote_increments_existing_post() {
        let mut board = Board::new();
        board.apply(&post("hello"), "id-a");

        assert!(board.apply(&vote("id-a"), "vote-1"));
        assert!(board.apply(&vote("id-a"), "vote-2"));
        assert_eq!(board.get("id-a").unwrap().vote, 2);
    }

    #[test]
    fn test_orphan_vote_is_a_noop() {
        let mut board = Board::new();
        assert!(!board.apply(&vote("nonexistent"), "vote-1"));
        assert!(board.is_empty());
    }

    #[test]
    fn test_orphan_remove_is_a_noop() {
        let mut board = Board::new();
        assert!(!board.apply(&remove("nonexistent"), "rm-1"));
        assert!(board.is_empty());
    }

    #[test]
    fn test_remove_is_monotonic() {
        let mut board = Board::new();
        board.apply(&post("hello"), "id-a");

        assert!(board.apply(&remove("id-a"), "rm-1"));
        assert!(board.get("id-a").unwrap().removed);

        // A second removal changes nothing, and nothing un-removes
        assert!(!board.apply(&remove("id-a"), "rm-2"));
        board.apply(&vote("id-a"), "vote-1");
        board.apply(&post("hello again"), "id-a");
        assert!(board.get("id-a").unwrap().removed);
    }

    #[test]
    fn test_removed_post_still_counts_votes() {
        let mut board = Board::new();
        board.apply(&post("hello"), "id-a");
        board.apply(&remove("id-a"), "rm-1");
        board.apply(&vote("id-a"), "vote-1");
        assert_eq!(board.get("id-a").unwrap().vote, 1);
    }

    #[test]
    fn test_full_lifecycle_scenario() {
        // Post, two votes, removal, then an exact duplicate of the post
        let mut board = Board::new();
        board.apply(&post("hello"), "id-a");
        board.apply(&vote("id-a"), "v1");
        board.apply(&vote("id-a"), "v2");
        board.apply(&remove("id-a"), "r1");
        board.apply(&post("hello"), "id-a");

        assert_eq!(board.len(), 1);
        let record = board.get("id-a").unwrap();
        assert_eq!(record.message, "hello");
        assert_eq!(record.vote, 2);
        assert!(record.removed);
    }

    #[test]
    fn test_removed_serializes_only_when_set() {
        let live = PostRecord {
            message: "m".to_string(),
            vote: 0,
            removed: false,
        };
        let gone = PostRecord {
            message: "m".to_string(),
            vote: 0,
            removed: true,
        };

        let live_json = serde_json::to_string(&live).unwrap();
        let gone_json = serde_json::to_string(&gone).unwrap();
        assert!(!live_json.contains("removed"));
        assert!(gone_json.contains(r#""removed":true"#));

        // Absent means false on the way back in
        let parsed: PostRecord = serde_json::from_str(&live_json).unwrap();
        assert!(!parsed.removed);
    }
}
