//! Relay decision engine.
//!
//! Given an inbound message and its sender's role, decides whether to copy
//! it across, reject it with a reason, or prompt the sender — and performs
//! the two-sided notifications that accompany every session transition. The
//! engine owns neither the session registry nor the routing table; both are
//! injected, as is the transport collaborator that does the actual sending.

use crate::routing::{RelayedMessageId, RoutingTable};
use crate::session::{
    ApproveOutcome, CancelOutcome, EndOutcome, RejectOutcome, RelayId, RequestOutcome,
    SessionRegistry, SessionState,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors surfaced by an outbound copy attempt.
///
/// Always recovered locally: the initiating party is told, nothing retries,
/// and no session state changes.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The transport refused or failed the send (blocked, unreachable, API error).
    #[error("send rejected: {0}")]
    Rejected(String),
    /// The outbound payload could not be expressed by the transport.
    #[error("malformed outbound payload: {0}")]
    Malformed(String),
}

/// Button set the transport should attach to a notification.
///
/// The core names the kind and its parameters; the transport owns the
/// visual layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MenuKind<Id> {
    /// The user's main menu; shows exactly one of apply / cancel / end.
    User {
        /// A request is pending.
        pending: bool,
        /// A session is active.
        active: bool,
    },
    /// The operator's panel entry menu.
    OperatorPanel,
    /// Accept/reject buttons for one pending request.
    PendingItem(Id),
    /// End button for one active session.
    ActiveItem(Id),
}

/// An inbound message as seen by the engine.
///
/// The content itself stays opaque: the transport copies it by reference to
/// the originating chat and message id.
#[derive(Debug, Clone)]
pub struct InboundEnvelope<Id> {
    /// Who sent it.
    pub sender: Id,
    /// Whether the sender is the configured operator.
    pub from_operator: bool,
    /// Transport-level id of the message, used as the copy source.
    pub message_id: RelayedMessageId,
    /// Id of the message this one replies to, if any.
    pub reply_to: Option<RelayedMessageId>,
}

/// Outbound contract the engine drives.
///
/// `notify` and `notify_with_menu` are best-effort: failures are logged by
/// the implementation and never surfaced to the engine.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayTransport<Id: RelayId>: Send + Sync {
    /// Copy the message carried by `envelope` into `target`'s chat.
    ///
    /// Returns the id of the new copy in the target chat.
    ///
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the send fails; the caller reports
    /// it to the initiating party and moves on.
    async fn deliver_copy(
        &self,
        envelope: &InboundEnvelope<Id>,
        target: Id,
    ) -> Result<RelayedMessageId, DeliveryError>;

    /// Best-effort informational send.
    async fn notify(&self, target: Id, text: &str);

    /// Best-effort informational send with an attached button set.
    async fn notify_with_menu(&self, target: Id, text: &str, menu: MenuKind<Id>);
}

/// What the engine decided to do with a plain message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome<Id> {
    /// Operator reply copied into the resolved user's chat.
    DeliveredToUser(Id),
    /// User message copied to the operator and recorded for reply routing.
    DeliveredToOperator {
        /// The originating user.
        user: Id,
        /// Operator-side id of the copy.
        relayed: RelayedMessageId,
    },
    /// Outbound copy failed; the initiating party was told.
    DeliveryFailed {
        /// The chat the copy was headed for.
        target: Id,
    },
    /// Operator message had no resolvable reply target.
    PromptedOperator,
    /// Pending user reminded to wait or cancel.
    RemindedPending,
    /// Unrequested user prompted to apply.
    PromptedApply,
}

/// The relay decision core.
pub struct RelayEngine<Id: RelayId, T: RelayTransport<Id>> {
    registry: Arc<SessionRegistry<Id>>,
    routing: Arc<RoutingTable<Id>>,
    transport: Arc<T>,
    operator: Id,
}

impl<Id: RelayId, T: RelayTransport<Id>> RelayEngine<Id, T> {
    /// Wire an engine to its collaborators.
    pub fn new(
        registry: Arc<SessionRegistry<Id>>,
        routing: Arc<RoutingTable<Id>>,
        transport: Arc<T>,
        operator: Id,
    ) -> Self {
        Self {
            registry,
            routing,
            transport,
            operator,
        }
    }

    /// The configured operator identity.
    pub fn operator(&self) -> &Id {
        &self.operator
    }

    /// Current session state of `user` (for menu rendering).
    pub fn session_state(&self, user: &Id) -> SessionState {
        self.registry.state_of(user)
    }

    /// Snapshot of users waiting for a decision.
    pub fn pending_users(&self) -> Vec<Id> {
        self.registry.list_pending()
    }

    /// Snapshot of users currently connected.
    pub fn active_users(&self) -> Vec<Id> {
        self.registry.list_active()
    }

    /// Route a plain (non-command) message from either side.
    pub async fn handle_message(&self, envelope: InboundEnvelope<Id>) -> RelayOutcome<Id> {
        if envelope.from_operator {
            return self.relay_from_operator(envelope).await;
        }
        // State is read and released before any outbound call; a session
        // ended mid-flight surfaces as a reported delivery failure.
        match self.registry.state_of(&envelope.sender) {
            SessionState::Active => self.relay_from_user(envelope).await,
            SessionState::Pending => {
                self.transport
                    .notify_with_menu(
                        envelope.sender,
                        "⏳ Your request is waiting for the operator. Please wait, or cancel it below.",
                        MenuKind::User {
                            pending: true,
                            active: false,
                        },
                    )
                    .await;
                RelayOutcome::RemindedPending
            }
            SessionState::Unrequested => {
                self.transport
                    .notify_with_menu(
                        envelope.sender,
                        "You are not connected to the operator yet. Apply with the button below:",
                        MenuKind::User {
                            pending: false,
                            active: false,
                        },
                    )
                    .await;
                RelayOutcome::PromptedApply
            }
        }
    }

    async fn relay_from_operator(&self, envelope: InboundEnvelope<Id>) -> RelayOutcome<Id> {
        let target = envelope
            .reply_to
            .and_then(|relayed| self.routing.resolve_user(relayed));
        let Some(target) = target else {
            self.transport
                .notify(
                    self.operator.clone(),
                    "To reach a user, reply directly to one of their relayed messages, \
                     check the panel for active sessions, or use /connect <user_id>.",
                )
                .await;
            return RelayOutcome::PromptedOperator;
        };

        match self.transport.deliver_copy(&envelope, target.clone()).await {
            Ok(delivered) => {
                self.routing.note_delivery(target.clone(), delivered);
                self.transport
                    .notify(self.operator.clone(), &format!("Delivered to user {target}."))
                    .await;
                debug!(user = %target, "operator reply relayed");
                RelayOutcome::DeliveredToUser(target)
            }
            Err(err) => {
                warn!(user = %target, error = %err, "operator → user copy failed");
                self.transport
                    .notify(
                        self.operator.clone(),
                        &format!("⚠️ Delivery to user {target} failed: {err}"),
                    )
                    .await;
                RelayOutcome::DeliveryFailed { target }
            }
        }
    }

    async fn relay_from_user(&self, envelope: InboundEnvelope<Id>) -> RelayOutcome<Id> {
        let sender = envelope.sender.clone();
        match self
            .transport
            .deliver_copy(&envelope, self.operator.clone())
            .await
        {
            Ok(relayed) => {
                self.routing.record_relay(relayed, sender.clone());
                debug!(user = %sender, relayed, "user message relayed to operator");
                RelayOutcome::DeliveredToOperator {
                    user: sender,
                    relayed,
                }
            }
            Err(err) => {
                // A single failed delivery does not end the session.
                warn!(user = %sender, error = %err, "user → operator copy failed");
                self.transport
                    .notify_with_menu(
                        sender,
                        "⚠️ Sending failed. Please try again later.",
                        MenuKind::User {
                            pending: false,
                            active: true,
                        },
                    )
                    .await;
                RelayOutcome::DeliveryFailed {
                    target: self.operator.clone(),
                }
            }
        }
    }

    /// User applies for a connection.
    ///
    /// On a fresh request the operator is notified with accept/reject
    /// buttons; the applicant's username (when known) is included so the
    /// operator sees who is asking.
    pub async fn handle_apply(&self, user: Id, username: Option<&str>) -> RequestOutcome {
        let outcome = self.registry.request_connection(user.clone());
        if outcome == RequestOutcome::Accepted {
            info!(user = %user, "connection request filed");
            let name = username.map_or_else(|| user.to_string(), |u| format!("@{u}"));
            self.transport
                .notify_with_menu(
                    self.operator.clone(),
                    &format!("📌 New connection request from {name}\nID: {user}\nApprove?"),
                    MenuKind::PendingItem(user),
                )
                .await;
        }
        outcome
    }

    /// User withdraws a pending request. Notifies the operator only; the
    /// acting user already sees the result directly.
    pub async fn handle_cancel(&self, user: Id) -> CancelOutcome {
        let outcome = self.registry.cancel_request(&user);
        if outcome == CancelOutcome::Cancelled {
            info!(user = %user, "connection request cancelled");
            self.transport
                .notify(
                    self.operator.clone(),
                    &format!("ℹ️ User {user} cancelled their request."),
                )
                .await;
        }
        outcome
    }

    /// User ends their active session. Notifies the operator only.
    pub async fn handle_end_by_user(&self, user: Id) -> EndOutcome {
        let outcome = self.registry.end_by_user(&user);
        if outcome == EndOutcome::Ended {
            info!(user = %user, "session ended by user");
            self.routing.forget_user(&user);
            self.transport
                .notify(
                    self.operator.clone(),
                    &format!("⚠️ User {user} ended the session."),
                )
                .await;
        }
        outcome
    }

    /// Operator approves a pending request: courtesy notice to the user,
    /// confirmation to the operator.
    pub async fn handle_approve(&self, user: Id) -> ApproveOutcome {
        let outcome = self.registry.approve(&user);
        if outcome == ApproveOutcome::Approved {
            info!(user = %user, "connection request approved");
            self.transport
                .notify_with_menu(
                    user.clone(),
                    "✅ The operator approved your request. You are now connected.",
                    MenuKind::User {
                        pending: false,
                        active: true,
                    },
                )
                .await;
            self.transport
                .notify(
                    self.operator.clone(),
                    &format!("🟢 Session with user {user} established."),
                )
                .await;
        }
        outcome
    }

    /// Operator turns down a pending request; the user is told.
    pub async fn handle_reject(&self, user: Id) -> RejectOutcome {
        let outcome = self.registry.reject(&user);
        if outcome == RejectOutcome::Rejected {
            info!(user = %user, "connection request rejected");
            self.transport
                .notify_with_menu(
                    user,
                    "The operator declined your chat request.",
                    MenuKind::User {
                        pending: false,
                        active: false,
                    },
                )
                .await;
        }
        outcome
    }

    /// Operator opens a session directly, no prior request needed.
    /// Always succeeds; both parties are notified.
    pub async fn handle_connect(&self, user: Id) {
        self.registry.force_connect(user.clone());
        info!(user = %user, "session opened by operator");
        self.transport
            .notify_with_menu(
                user.clone(),
                "✅ The operator opened a direct chat session with you.",
                MenuKind::User {
                    pending: false,
                    active: true,
                },
            )
            .await;
        self.transport
            .notify(
                self.operator.clone(),
                &format!("✅ Session with user {user} established (operator initiated)."),
            )
            .await;
    }

    /// Operator ends an active session; the user is told.
    pub async fn handle_end_by_operator(&self, user: Id) -> EndOutcome {
        let outcome = self.registry.end_by_operator(&user);
        if outcome == EndOutcome::Ended {
            info!(user = %user, "session ended by operator");
            self.routing.forget_user(&user);
            self.transport
                .notify_with_menu(
                    user,
                    "⚠️ The operator ended this session.",
                    MenuKind::User {
                        pending: false,
                        active: false,
                    },
                )
                .await;
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{mock_transport_quiet, RecordingTransport};

    const OPERATOR: i64 = 42;

    fn recording_engine() -> (
        RelayEngine<i64, RecordingTransport>,
        Arc<SessionRegistry<i64>>,
        Arc<RoutingTable<i64>>,
        Arc<RecordingTransport>,
    ) {
        let registry = Arc::new(SessionRegistry::new());
        let routing = Arc::new(RoutingTable::new());
        let transport = Arc::new(RecordingTransport::new());
        let engine = RelayEngine::new(
            registry.clone(),
            routing.clone(),
            transport.clone(),
            OPERATOR,
        );
        (engine, registry, routing, transport)
    }

    fn from_user(sender: i64, message_id: i64) -> InboundEnvelope<i64> {
        InboundEnvelope {
            sender,
            from_operator: false,
            message_id,
            reply_to: None,
        }
    }

    fn operator_reply(message_id: i64, reply_to: i64) -> InboundEnvelope<i64> {
        InboundEnvelope {
            sender: OPERATOR,
            from_operator: true,
            message_id,
            reply_to: Some(reply_to),
        }
    }

    #[tokio::test]
    async fn rejected_user_is_prompted_to_apply_again() {
        // Scenario: request filed, operator rejects, user writes anyway.
        let (engine, registry, _, transport) = recording_engine();

        assert_eq!(
            engine.handle_apply(100, Some("alice")).await,
            RequestOutcome::Accepted
        );
        assert_eq!(registry.state_of(&100), SessionState::Pending);

        assert_eq!(engine.handle_reject(100).await, RejectOutcome::Rejected);
        assert_eq!(registry.state_of(&100), SessionState::Unrequested);

        let outcome = engine.handle_message(from_user(100, 1)).await;
        assert_eq!(outcome, RelayOutcome::PromptedApply);
        assert!(transport.deliveries().is_empty());
        assert!(transport
            .notices_for(100)
            .iter()
            .any(|text| text.contains("not connected")));
    }

    #[tokio::test]
    async fn direct_connect_then_round_trip_relay() {
        let (engine, registry, routing, transport) = recording_engine();

        engine.handle_connect(200).await;
        assert_eq!(registry.state_of(&200), SessionState::Active);

        let outcome = engine.handle_message(from_user(200, 55)).await;
        let RelayOutcome::DeliveredToOperator { user, relayed } = outcome else {
            panic!("expected relay to operator, got {outcome:?}");
        };
        assert_eq!(user, 200);
        assert_eq!(routing.resolve_user(relayed), Some(200));

        let outcome = engine.handle_message(operator_reply(900, relayed)).await;
        assert_eq!(outcome, RelayOutcome::DeliveredToUser(200));
        assert!(transport.deliveries().contains(&(900, 200)));
        assert!(transport
            .notices_for(OPERATOR)
            .iter()
            .any(|text| text.contains("Delivered to user 200")));
    }

    #[tokio::test]
    async fn failed_delivery_reports_and_keeps_session_active() {
        let (engine, registry, routing, transport) = recording_engine();

        engine.handle_connect(300).await;
        transport.fail_deliveries_to(OPERATOR);

        let outcome = engine.handle_message(from_user(300, 7)).await;
        assert_eq!(outcome, RelayOutcome::DeliveryFailed { target: OPERATOR });
        assert_eq!(registry.state_of(&300), SessionState::Active);
        assert_eq!(routing.last_relay_of(&300), None);
        assert!(transport
            .notices_for(300)
            .iter()
            .any(|text| text.contains("Sending failed")));
    }

    #[tokio::test]
    async fn concurrent_operator_replies_never_swap_targets() {
        let (engine, _, routing, transport) = recording_engine();

        engine.handle_connect(1).await;
        engine.handle_connect(2).await;

        let RelayOutcome::DeliveredToOperator { relayed: m1, .. } =
            engine.handle_message(from_user(1, 11)).await
        else {
            panic!("relay for user 1 failed");
        };
        let RelayOutcome::DeliveredToOperator { relayed: m2, .. } =
            engine.handle_message(from_user(2, 22)).await
        else {
            panic!("relay for user 2 failed");
        };
        assert_ne!(m1, m2);
        assert_eq!(routing.resolve_user(m1), Some(1));
        assert_eq!(routing.resolve_user(m2), Some(2));

        let (a, b) = tokio::join!(
            engine.handle_message(operator_reply(901, m1)),
            engine.handle_message(operator_reply(902, m2)),
        );
        assert_eq!(a, RelayOutcome::DeliveredToUser(1));
        assert_eq!(b, RelayOutcome::DeliveredToUser(2));

        let deliveries = transport.deliveries();
        assert!(deliveries.contains(&(901, 1)));
        assert!(deliveries.contains(&(902, 2)));
        assert!(!deliveries.contains(&(901, 2)));
        assert!(!deliveries.contains(&(902, 1)));
    }

    #[tokio::test]
    async fn operator_without_reply_target_is_prompted() {
        let (engine, _, _, transport) = recording_engine();

        let envelope = InboundEnvelope {
            sender: OPERATOR,
            from_operator: true,
            message_id: 5,
            reply_to: None,
        };
        assert_eq!(
            engine.handle_message(envelope).await,
            RelayOutcome::PromptedOperator
        );
        assert!(transport.deliveries().is_empty());
        assert!(transport
            .notices_for(OPERATOR)
            .iter()
            .any(|text| text.contains("/connect")));
    }

    #[tokio::test]
    async fn pending_user_is_reminded_to_wait() {
        let (engine, _, _, transport) = recording_engine();

        engine.handle_apply(50, None).await;
        assert_eq!(
            engine.handle_message(from_user(50, 3)).await,
            RelayOutcome::RemindedPending
        );
        assert!(transport.deliveries().is_empty());
        assert!(transport
            .notices_for(50)
            .iter()
            .any(|text| text.contains("waiting for the operator")));
    }

    #[tokio::test]
    async fn session_end_purges_reply_routing() {
        let (engine, _, routing, _) = recording_engine();

        engine.handle_connect(70).await;
        let RelayOutcome::DeliveredToOperator { relayed, .. } =
            engine.handle_message(from_user(70, 9)).await
        else {
            panic!("relay failed");
        };
        assert_eq!(routing.resolve_user(relayed), Some(70));

        assert_eq!(engine.handle_end_by_operator(70).await, EndOutcome::Ended);
        assert_eq!(routing.resolve_user(relayed), None);

        // A stale reply now degrades to the no-target prompt.
        assert_eq!(
            engine.handle_message(operator_reply(910, relayed)).await,
            RelayOutcome::PromptedOperator
        );
    }

    #[tokio::test]
    async fn apply_notifies_operator_with_pending_item_buttons() {
        let registry = Arc::new(SessionRegistry::new());
        let routing = Arc::new(RoutingTable::new());

        let mut mock = MockRelayTransport::<i64>::new();
        mock.expect_notify_with_menu()
            .withf(|target, text, menu| {
                *target == OPERATOR
                    && text.contains("@bob")
                    && text.contains("ID: 100")
                    && *menu == MenuKind::PendingItem(100)
            })
            .times(1)
            .returning(|_, _, _| ());

        let engine = RelayEngine::new(registry, routing, Arc::new(mock), OPERATOR);
        assert_eq!(
            engine.handle_apply(100, Some("bob")).await,
            RequestOutcome::Accepted
        );
    }

    #[tokio::test]
    async fn repeated_apply_notifies_operator_once() {
        let registry = Arc::new(SessionRegistry::new());
        let routing = Arc::new(RoutingTable::new());
        let mut mock = MockRelayTransport::<i64>::new();
        mock.expect_notify_with_menu().times(1).returning(|_, _, _| ());

        let engine = RelayEngine::new(registry, routing, Arc::new(mock), OPERATOR);
        assert_eq!(
            engine.handle_apply(100, None).await,
            RequestOutcome::Accepted
        );
        assert_eq!(
            engine.handle_apply(100, None).await,
            RequestOutcome::AlreadyPending
        );
    }

    #[tokio::test]
    async fn stale_operator_actions_report_already_processed() {
        let registry = Arc::new(SessionRegistry::new());
        let routing = Arc::new(RoutingTable::new());
        let engine = RelayEngine::new(
            registry,
            routing,
            Arc::new(mock_transport_quiet()),
            OPERATOR,
        );

        assert_eq!(engine.handle_approve(1).await, ApproveOutcome::NotPending);
        assert_eq!(engine.handle_reject(1).await, RejectOutcome::NotPending);
        assert_eq!(engine.handle_cancel(1).await, CancelOutcome::NotPending);
        assert_eq!(
            engine.handle_end_by_operator(1).await,
            EndOutcome::NotActive
        );
    }

    #[tokio::test]
    async fn cancel_and_user_end_notify_operator_only() {
        let (engine, _, _, transport) = recording_engine();

        engine.handle_apply(60, None).await;
        transport.clear_notices();
        assert_eq!(engine.handle_cancel(60).await, CancelOutcome::Cancelled);
        assert!(transport.notices_for(60).is_empty());
        assert!(transport
            .notices_for(OPERATOR)
            .iter()
            .any(|text| text.contains("cancelled")));

        engine.handle_connect(61).await;
        transport.clear_notices();
        assert_eq!(engine.handle_end_by_user(61).await, EndOutcome::Ended);
        assert!(transport.notices_for(61).is_empty());
        assert!(transport
            .notices_for(OPERATOR)
            .iter()
            .any(|text| text.contains("ended the session")));
    }

    #[tokio::test]
    async fn approve_notifies_both_parties() {
        let (engine, registry, _, transport) = recording_engine();

        engine.handle_apply(80, None).await;
        transport.clear_notices();
        assert_eq!(engine.handle_approve(80).await, ApproveOutcome::Approved);
        assert_eq!(registry.state_of(&80), SessionState::Active);
        assert!(transport
            .notices_for(80)
            .iter()
            .any(|text| text.contains("approved your request")));
        assert!(transport
            .notices_for(OPERATOR)
            .iter()
            .any(|text| text.contains("Session with user 80")));

        // Stale approval: state is Active now, nothing more goes out.
        transport.clear_notices();
        assert_eq!(engine.handle_approve(80).await, ApproveOutcome::NotPending);
        assert!(transport.notices_for(80).is_empty());
        assert!(transport.notices_for(OPERATOR).is_empty());
    }
}
