//! Per-connection subscription manager.
//!
//! Tracks which token IDs a WebSocket client is subscribed to and
//! provides server-side event filtering.

use std::collections::HashSet;

/// Manages the set of token subscriptions for a single WebSocket
/// connection.
#[derive(Debug, Default)]
pub struct SubscriptionManager {
    /// Subscribed token IDs. If `subscribe_all` is true, this set is
    /// ignored.
    token_ids: HashSet<u64>,
    /// Whether the client subscribes to all tokens (wildcard `"*"`).
    subscribe_all: bool,
}

impl SubscriptionManager {
    /// Creates a new empty subscription manager.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds token IDs to the subscription set. `wildcard` enables the
    /// catch-all subscription.
    pub fn subscribe(&mut self, ids: &[u64], wildcard: bool) {
        if wildcard {
            self.subscribe_all = true;
        }
        for id in ids {
            self.token_ids.insert(*id);
        }
    }

    /// Removes token IDs from the subscription set.
    pub fn unsubscribe(&mut self, ids: &[u64]) {
        for id in ids {
            self.token_ids.remove(id);
        }
    }

    /// Returns `true` if the given token ID matches the subscription
    /// filter.
    #[must_use]
    pub fn matches(&self, token_id: u64) -> bool {
        self.subscribe_all || self.token_ids.contains(&token_id)
    }

    /// Returns the number of explicitly subscribed token IDs.
    #[must_use]
    pub fn count(&self) -> usize {
        self.token_ids.len()
    }

    /// Returns `true` if the wildcard subscription is active.
    #[must_use]
    pub fn is_subscribed_all(&self) -> bool {
        self.subscribe_all
    }
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn empty_matches_nothing() {
        let mgr = SubscriptionManager::new();
        assert!(!mgr.matches(1));
    }

    #[test]
    fn subscribe_specific_token() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[42], false);
        assert!(mgr.matches(42));
        assert!(!mgr.matches(43));
    }

    #[test]
    fn wildcard_matches_everything() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[], true);
        assert!(mgr.matches(1));
        assert!(mgr.matches(9999));
    }

    #[test]
    fn unsubscribe_removes_token() {
        let mut mgr = SubscriptionManager::new();
        mgr.subscribe(&[42], false);
        assert!(mgr.matches(42));
        mgr.unsubscribe(&[42]);
        assert!(!mgr.matches(42));
    }

    #[test]
    fn count_tracks_explicit() {
        let mut mgr = SubscriptionManager::new();
        assert_eq!(mgr.count(), 0);
        mgr.subscribe(&[1, 2], false);
        assert_eq!(mgr.count(), 2);
    }
}
