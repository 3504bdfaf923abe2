use std::collections::{HashSet, VecDeque};

use chrono::{DateTime, Utc};

/// Number of recently rendered keys remembered by default.
pub const DEFAULT_CAPACITY: usize = 100;

/// Characters of message text that take part in the key.
const TEXT_PREFIX_CHARS: usize = 10;

/// Receiver-side guard against rendering the same public message twice.
///
/// A message is fingerprinted by sender credential, timestamp and the first
/// ten characters of its text. Only the most recent `capacity` keys are kept;
/// the oldest is evicted first, after which a repeat of it is accepted again.
#[derive(Debug)]
pub struct MessageDeduplicator {
    capacity: usize,
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl Default for MessageDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MessageDeduplicator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            seen: HashSet::with_capacity(capacity + 1),
            order: VecDeque::with_capacity(capacity + 1),
        }
    }

    pub fn key(sender: &str, timestamp: &DateTime<Utc>, text: &str) -> String {
        let prefix: String = text.chars().take(TEXT_PREFIX_CHARS).collect();
        format!("{}_{}_{}", sender, timestamp.to_rfc3339(), prefix)
    }

    /// Record a message. Returns `true` if it should be rendered, `false`
    /// if an identical key is still tracked.
    pub fn observe(&mut self, sender: &str, timestamp: &DateTime<Utc>, text: &str) -> bool {
        let key = Self::key(sender, timestamp, text);
        if self.seen.contains(&key) {
            return false;
        }

        self.seen.insert(key.clone());
        self.order.push_back(key);

        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
