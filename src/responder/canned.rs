//! Offline responder with a fixed list of short replies.

use super::{Responder, ResponderError};
use async_trait::async_trait;
use rand::seq::SliceRandom;
use std::sync::atomic::{AtomicUsize, Ordering};

const DEFAULT_REPLIES: &[&str] = &[
    "Yes, exactly!",
    "That's an interesting story.",
    "I think so too.",
    "Really? That's surprising!",
    "So that's what happened.",
    "Good point.",
    "I see it a little differently.",
    "Right, that could be.",
    "That's fascinating!",
    "I've had something similar happen to me.",
];

#[derive(Debug)]
enum Pick {
    Random,
    RoundRobin(AtomicUsize),
}

/// Replies without contacting any service.
#[derive(Debug)]
pub struct CannedResponder {
    replies: Vec<String>,
    pick: Pick,
}

impl CannedResponder {
    /// The built-in reply list, picked at random.
    pub fn new() -> Self {
        Self {
            replies: DEFAULT_REPLIES.iter().map(|s| s.to_string()).collect(),
            pick: Pick::Random,
        }
    }

    /// Cycle through `replies` in order. An empty list yields
    /// [`ResponderError::EmptyCompletion`] on every call.
    pub fn in_order(replies: Vec<String>) -> Self {
        Self {
            replies,
            pick: Pick::RoundRobin(AtomicUsize::new(0)),
        }
    }
}

impl Default for CannedResponder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Responder for CannedResponder {
    async fn complete(&self, _prompt: &str) -> Result<String, ResponderError> {
        let reply = match &self.pick {
            Pick::Random => self.replies.choose(&mut rand::thread_rng()),
            Pick::RoundRobin(next) => {
                if self.replies.is_empty() {
                    None
                } else {
                    let idx = next.fetch_add(1, Ordering::Relaxed) % self.replies.len();
                    self.replies.get(idx)
                }
            }
        };
        reply.cloned().ok_or(ResponderError::EmptyCompletion)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn default_reply_comes_from_builtin_list() {
        let responder = CannedResponder::new();
        let reply = responder.complete("You are Player A.").await.unwrap();
        assert!(DEFAULT_REPLIES.contains(&reply.as_str()));
    }

    #[tokio::test]
    async fn in_order_cycles() {
        let responder = CannedResponder::in_order(vec!["one".into(), "two".into()]);
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(responder.complete("").await.unwrap());
        }
        assert_eq!(seen, ["one", "two", "one"]);
    }

    #[tokio::test]
    async fn empty_list_is_an_error() {
        let responder = CannedResponder::in_order(Vec::new());
        assert!(matches!(
            responder.complete("").await,
            Err(ResponderError::EmptyCompletion)
        ));
    }
}
