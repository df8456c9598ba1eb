//! Per-user session registry.
//!
//! Holds the authoritative connection state for every user. Absence from the
//! backing map *is* the `Unrequested` state: entries are created when a user
//! enters `Pending` or `Active` and removed again on any transition back to
//! `Unrequested`, so a stored entry is never in that state.
//!
//! Generic over the user identifier to stay transport-agnostic:
//! - Telegram: `i64` (user id)
//! - Web: `String` (session token)

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Bounds required of a user identifier.
///
/// Blanket-implemented; callers never implement this by hand.
pub trait RelayId: Hash + Eq + Clone + Display + Debug + Send + Sync + 'static {}

impl<T> RelayId for T where T: Hash + Eq + Clone + Display + Debug + Send + Sync + 'static {}

/// Connection state of a single user session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No request on file; the user must apply before chatting.
    Unrequested,
    /// Request submitted, waiting for the operator's decision.
    Pending,
    /// Connected; messages relay between the user and the operator.
    Active,
}

/// Result of [`SessionRegistry::request_connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// Transitioned `Unrequested` → `Pending`.
    Accepted,
    /// A request was already pending; no state change.
    AlreadyPending,
    /// The session is already active; no state change.
    AlreadyActive,
}

/// Result of [`SessionRegistry::cancel_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Transitioned `Pending` → `Unrequested`.
    Cancelled,
    /// Nothing was pending; no state change.
    NotPending,
}

/// Result of [`SessionRegistry::approve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApproveOutcome {
    /// Transitioned `Pending` → `Active`.
    Approved,
    /// Nothing was pending; no state change.
    NotPending,
}

/// Result of [`SessionRegistry::reject`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectOutcome {
    /// Transitioned `Pending` → `Unrequested`.
    Rejected,
    /// Nothing was pending; no state change.
    NotPending,
}

/// Result of [`SessionRegistry::end_by_user`] / [`SessionRegistry::end_by_operator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndOutcome {
    /// Transitioned `Active` → `Unrequested`.
    Ended,
    /// No session was active; no state change.
    NotActive,
}

/// Registry of all user sessions.
///
/// Backed by a sharded concurrent map: a read-modify-write of one user's
/// state goes through the per-key entry API and is atomic, and transitions
/// for distinct users never contend on a shared lock. Every operation is a
/// total function over the state space — the enumerated result variants are
/// the only outcomes.
pub struct SessionRegistry<Id: RelayId> {
    sessions: DashMap<Id, SessionState>,
}

impl<Id: RelayId> Default for SessionRegistry<Id> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Id: RelayId> SessionRegistry<Id> {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Current state of `user`, with explicit `Unrequested` for absent entries.
    #[must_use]
    pub fn state_of(&self, user: &Id) -> SessionState {
        self.sessions
            .get(user)
            .map_or(SessionState::Unrequested, |slot| *slot.value())
    }

    /// File a connection request. Idempotent while already `Pending`.
    pub fn request_connection(&self, user: Id) -> RequestOutcome {
        match self.sessions.entry(user) {
            Entry::Occupied(slot) => match *slot.get() {
                SessionState::Pending => RequestOutcome::AlreadyPending,
                SessionState::Active => RequestOutcome::AlreadyActive,
                // Never stored; treat a stray entry like a fresh request.
                SessionState::Unrequested => {
                    *slot.into_ref() = SessionState::Pending;
                    RequestOutcome::Accepted
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(SessionState::Pending);
                RequestOutcome::Accepted
            }
        }
    }

    /// Withdraw a pending request.
    pub fn cancel_request(&self, user: &Id) -> CancelOutcome {
        if self
            .sessions
            .remove_if(user, |_, state| *state == SessionState::Pending)
            .is_some()
        {
            CancelOutcome::Cancelled
        } else {
            CancelOutcome::NotPending
        }
    }

    /// Approve a pending request, connecting the user.
    pub fn approve(&self, user: &Id) -> ApproveOutcome {
        match self.sessions.entry(user.clone()) {
            Entry::Occupied(mut slot) if *slot.get() == SessionState::Pending => {
                slot.insert(SessionState::Active);
                ApproveOutcome::Approved
            }
            _ => ApproveOutcome::NotPending,
        }
    }

    /// Turn down a pending request.
    pub fn reject(&self, user: &Id) -> RejectOutcome {
        if self
            .sessions
            .remove_if(user, |_, state| *state == SessionState::Pending)
            .is_some()
        {
            RejectOutcome::Rejected
        } else {
            RejectOutcome::NotPending
        }
    }

    /// Unconditionally connect `user`, clearing any pending request.
    ///
    /// Privileged operator override: always succeeds, idempotent when the
    /// session is already active.
    pub fn force_connect(&self, user: Id) {
        self.sessions.insert(user, SessionState::Active);
    }

    /// End an active session at the user's initiative.
    pub fn end_by_user(&self, user: &Id) -> EndOutcome {
        self.end(user)
    }

    /// End an active session at the operator's initiative.
    ///
    /// Same transition as [`Self::end_by_user`]; the two exist separately
    /// because the relay engine notifies a different party for each.
    pub fn end_by_operator(&self, user: &Id) -> EndOutcome {
        self.end(user)
    }

    fn end(&self, user: &Id) -> EndOutcome {
        if self
            .sessions
            .remove_if(user, |_, state| *state == SessionState::Active)
            .is_some()
        {
            EndOutcome::Ended
        } else {
            EndOutcome::NotActive
        }
    }

    /// Snapshot of users currently `Pending`, in no particular order.
    #[must_use]
    pub fn list_pending(&self) -> Vec<Id> {
        self.snapshot(SessionState::Pending)
    }

    /// Snapshot of users currently `Active`, in no particular order.
    #[must_use]
    pub fn list_active(&self) -> Vec<Id> {
        self.snapshot(SessionState::Active)
    }

    fn snapshot(&self, wanted: SessionState) -> Vec<Id> {
        self.sessions
            .iter()
            .filter(|entry| *entry.value() == wanted)
            .map(|entry| entry.key().clone())
            .collect()
    }
}
