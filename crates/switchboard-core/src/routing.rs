//! Reply-based message routing table.
//!
//! Every user message copied to the operator is recorded as
//! `relayed id → originating user`, so an operator reply to that copy can be
//! routed back without cross-talk between concurrently connected users.
//! Entries live for the duration of a conversation and are purged when the
//! session ends.

use crate::session::RelayId;
use dashmap::DashMap;

/// Identifier of a relayed copy, in the receiving chat's namespace.
pub type RelayedMessageId = i64;

/// Bidirectional association between relayed copies and their originators.
///
/// All maps are sharded concurrent maps: inserts and lookups are independent
/// per key and no guard is held across outbound I/O.
pub struct RoutingTable<Id: RelayId> {
    /// Operator-side relayed id → originating user.
    by_message: DashMap<RelayedMessageId, Id>,
    /// User → most recent relayed id touching that conversation.
    /// Informational only, never consulted for routing.
    last_relay: DashMap<Id, RelayedMessageId>,
    /// User → operator-side ids recorded for them, for purge on session end.
    history: DashMap<Id, Vec<RelayedMessageId>>,
}

impl<Id: RelayId> Default for RoutingTable<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: RelayId> RoutingTable<Id> {
    /// Create a new empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_message: DashMap::new(),
            last_relay: DashMap::new(),
            history: DashMap::new(),
        }
    }

    /// Record that `relayed` is the operator-side copy of a message from `user`.
    pub fn record_relay(&self, relayed: RelayedMessageId, user: Id) {
        self.by_message.insert(relayed, user.clone());
        self.history.entry(user.clone()).or_default().push(relayed);
        self.last_relay.insert(user, relayed);
    }

    /// Resolve a relayed id back to its originating user.
    ///
    /// `None` means "not a tracked reply target" — a normal outcome, not an
    /// error.
    #[must_use]
    pub fn resolve_user(&self, relayed: RelayedMessageId) -> Option<Id> {
        self.by_message.get(&relayed).map(|slot| slot.value().clone())
    }

    /// Most recent relayed id for `user`, if any.
    #[must_use]
    pub fn last_relay_of(&self, user: &Id) -> Option<RelayedMessageId> {
        self.last_relay.get(user).map(|slot| *slot.value())
    }

    /// Note a copy delivered into `user`'s own chat.
    ///
    /// Updates only the back-reference: the delivered id lives in the user's
    /// chat namespace and must not become a forward-map key, where it could
    /// collide with an operator-side id.
    pub fn note_delivery(&self, user: Id, delivered: RelayedMessageId) {
        self.last_relay.insert(user, delivered);
    }

    /// Drop everything recorded for `user`.
    ///
    /// Forward entries are removed value-checked, so a numerically equal id
    /// recorded for another user is left alone.
    pub fn forget_user(&self, user: &Id) {
        if let Some((_, recorded)) = self.history.remove(user) {
            for relayed in recorded {
                self.by_message.remove_if(&relayed, |_, owner| owner == user);
            }
        }
        self.last_relay.remove(user);
    }
}
