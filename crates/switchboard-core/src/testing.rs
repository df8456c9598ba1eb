//! Testing helpers and transport doubles.
//!
//! Provides a permissive mockall transport for tests that only care about
//! engine outcomes, and a recording fake for tests that assert on what went
//! out and where.

use crate::relay::{
    DeliveryError, InboundEnvelope, MenuKind, MockRelayTransport, RelayTransport,
};
use crate::routing::RelayedMessageId;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Mutex;

/// A mock transport where every call quietly succeeds.
///
/// Copies are acknowledged with id `1`; notifications vanish. Use it when a
/// test asserts on engine outcomes and registry state, not on traffic.
#[must_use]
pub fn mock_transport_quiet() -> MockRelayTransport<i64> {
    let mut mock = MockRelayTransport::new();
    mock.expect_deliver_copy().returning(|_, _| Ok(1));
    mock.expect_notify().returning(|_, _| ());
    mock.expect_notify_with_menu().returning(|_, _, _| ());
    mock
}

/// A fake transport that records everything sent through it.
///
/// Copy attempts get fresh ids from an internal counter; targets registered
/// via [`RecordingTransport::fail_deliveries_to`] fail instead, simulating a
/// blocked or unreachable chat.
pub struct RecordingTransport {
    /// `(source message id, target)` per successful copy.
    deliveries: Mutex<Vec<(RelayedMessageId, i64)>>,
    /// `(target, text)` per notification, menus included.
    notices: Mutex<Vec<(i64, String)>>,
    failing: Mutex<HashSet<i64>>,
    next_id: AtomicI64,
}

impl Default for RecordingTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingTransport {
    /// Create an empty recorder. Issued copy ids start at 1000 so they never
    /// collide with the small message ids tests hand-pick.
    #[must_use]
    pub fn new() -> Self {
        Self {
            deliveries: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            next_id: AtomicI64::new(1000),
        }
    }

    /// Make every future copy towards `target` fail.
    pub fn fail_deliveries_to(&self, target: i64) {
        self.failing
            .lock()
            .expect("failing set poisoned")
            .insert(target);
    }

    /// All successful copies so far, as `(source message id, target)`.
    #[must_use]
    pub fn deliveries(&self) -> Vec<(RelayedMessageId, i64)> {
        self.deliveries
            .lock()
            .expect("deliveries poisoned")
            .clone()
    }

    /// Texts notified to `target`, in send order.
    #[must_use]
    pub fn notices_for(&self, target: i64) -> Vec<String> {
        self.notices
            .lock()
            .expect("notices poisoned")
            .iter()
            .filter(|(to, _)| *to == target)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Forget recorded notifications (not deliveries).
    pub fn clear_notices(&self) {
        self.notices.lock().expect("notices poisoned").clear();
    }
}

#[async_trait]
impl RelayTransport<i64> for RecordingTransport {
    async fn deliver_copy(
        &self,
        envelope: &InboundEnvelope<i64>,
        target: i64,
    ) -> Result<RelayedMessageId, DeliveryError> {
        if self
            .failing
            .lock()
            .expect("failing set poisoned")
            .contains(&target)
        {
            return Err(DeliveryError::Rejected("target unreachable".to_string()));
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .lock()
            .expect("deliveries poisoned")
            .push((envelope.message_id, target));
        Ok(id)
    }

    async fn notify(&self, target: i64, text: &str) {
        self.notices
            .lock()
            .expect("notices poisoned")
            .push((target, text.to_string()));
    }

    async fn notify_with_menu(&self, target: i64, text: &str, _menu: MenuKind<i64>) {
        self.notify(target, text).await;
    }
}
