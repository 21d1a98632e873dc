//! Message types and the delivery state machine.
//!
//! A stored message moves through three states:
//!
//! - **Pending**: `visible_from < now`, eligible for delivery
//! - **InFlight**: `visible_from >= now`, holds a live receipt
//! - **Deleted**: removed from storage by a delete carrying the live receipt
//!
//! InFlight falls back to Pending on its own once `visible_from` passes.
//! Nothing schedules that transition; every scan recomputes it from the
//! stored timestamp and the current time.

use std::cmp::Ordering;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A delivered message as handed to consumers.
///
/// This is a detached snapshot: mutating it has no effect on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    body: String,
    receipt_id: String,
}

impl Message {
    pub fn new(body: impl Into<String>, receipt_id: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            receipt_id: receipt_id.into(),
        }
    }

    /// The message payload.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Token required to delete this delivery.
    pub fn receipt_id(&self) -> &str {
        &self.receipt_id
    }

    pub fn into_body(self) -> String {
        self.body
    }
}

/// Generate a fresh receipt id.
///
/// Receipts are hyphenated UUID v4 strings and therefore only contain
/// `[0-9a-f-]`. The record codec relies on this when validating delimiters.
pub fn new_receipt_id() -> String {
    Uuid::new_v4().to_string()
}

/// Internal bookkeeping for one queued message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    /// The message payload
    pub body: String,

    /// Number of deliveries so far
    pub attempts: u32,

    /// Epoch milliseconds before which the message may not be delivered
    pub visible_from: i64,

    /// Receipt of the most recent delivery, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_id: Option<String>,
}

impl StoredMessage {
    /// A fresh, immediately visible message.
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            attempts: 0,
            visible_from: 0,
            receipt_id: None,
        }
    }

    /// Whether the message may be delivered at `now`.
    pub fn is_visible_at(&self, now: i64) -> bool {
        self.visible_from < now
    }

    /// Whether `receipt_id` is the live receipt of an in-flight delivery.
    pub fn is_deletable_with(&self, receipt_id: &str, now: i64) -> bool {
        !self.is_visible_at(now) && self.receipt_id.as_deref() == Some(receipt_id)
    }

    /// Deliver the message: new receipt, one more attempt, hidden until
    /// `now + visibility_timeout`. Returns the snapshot for the consumer.
    pub fn deliver(&mut self, now: i64, visibility_timeout: Duration) -> Message {
        let receipt_id = new_receipt_id();
        self.attempts += 1;
        self.visible_from = now.saturating_add(visibility_timeout.as_millis() as i64);
        self.receipt_id = Some(receipt_id.clone());
        Message::new(self.body.clone(), receipt_id)
    }
}

/// Ordering key for priority delivery.
///
/// Compared field by field: lower rank first, then earlier enqueue time,
/// then lower sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PriorityKey {
    pub rank: i32,
    pub enqueued_at: i64,
    pub sequence: u64,
}

/// A stored message together with its priority key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorityMessage {
    #[serde(flatten)]
    pub key: PriorityKey,
    pub message: StoredMessage,
}

impl PriorityMessage {
    pub fn new(body: impl Into<String>, rank: i32, enqueued_at: i64, sequence: u64) -> Self {
        Self {
            key: PriorityKey {
                rank,
                enqueued_at,
                sequence,
            },
            message: StoredMessage::new(body),
        }
    }
}

impl PartialOrd for PriorityMessage {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PriorityMessage {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(30);

    #[test]
    fn test_new_message_is_pending() {
        let msg = StoredMessage::new("hello");
        assert_eq!(msg.attempts, 0);
        assert!(msg.receipt_id.is_none());
        assert!(msg.is_visible_at(1));
    }

    #[test]
    fn test_deliver_hides_message() {
        let mut msg = StoredMessage::new("hello");
        let delivered = msg.deliver(1_000, TIMEOUT);

        assert_eq!(delivered.body(), "hello");
        assert_eq!(msg.receipt_id.as_deref(), Some(delivered.receipt_id()));
        assert_eq!(msg.attempts, 1);
        assert_eq!(msg.visible_from, 31_000);

        assert!(!msg.is_visible_at(1_000));
        // Boundary instant is still in flight
        assert!(!msg.is_visible_at(31_000));
        assert!(msg.is_visible_at(31_001));
    }

    #[test]
    fn test_redelivery_changes_receipt() {
        let mut msg = StoredMessage::new("hello");
        let first = msg.deliver(1_000, TIMEOUT);
        let second = msg.deliver(31_001, TIMEOUT);

        assert_ne!(first.receipt_id(), second.receipt_id());
        assert_eq!(msg.attempts, 2);
    }

    #[test]
    fn test_deletable_only_while_in_flight() {
        let mut msg = StoredMessage::new("hello");
        assert!(!msg.is_deletable_with("anything", 0));

        let delivered = msg.deliver(1_000, TIMEOUT);
        assert!(msg.is_deletable_with(delivered.receipt_id(), 2_000));
        assert!(!msg.is_deletable_with("other-receipt", 2_000));

        // Expired receipts are stale
        assert!(!msg.is_deletable_with(delivered.receipt_id(), 31_001));
    }

    #[test]
    fn test_receipt_alphabet() {
        let receipt = new_receipt_id();
        assert!(!receipt.is_empty());
        assert!(receipt
            .chars()
            .all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn test_priority_order() {
        let x = PriorityMessage::new("x", 3, 10, 0);
        let y = PriorityMessage::new("y", 1, 20, 1);
        let z = PriorityMessage::new("z", 2, 30, 2);

        let mut all = vec![x.clone(), y.clone(), z.clone()];
        all.sort();
        assert_eq!(all, vec![y, z, x]);
    }

    #[test]
    fn test_priority_tie_break() {
        let earlier = PriorityMessage::new("a", 1, 10, 5);
        let later = PriorityMessage::new("b", 1, 11, 0);
        assert!(earlier < later);

        let same_ms_first = PriorityMessage::new("c", 1, 10, 1);
        let same_ms_second = PriorityMessage::new("d", 1, 10, 2);
        assert!(same_ms_first < same_ms_second);
    }

    #[test]
    fn test_priority_message_serialization() {
        let msg = PriorityMessage::new("payload", 2, 1_700_000_000_000, 7);
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"rank\":2"));
        assert!(!json.contains("receipt_id"));

        let back: PriorityMessage = serde_json::from_str(&json).unwrap();
        assert_eq!(back, msg);
    }
}
