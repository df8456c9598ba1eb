//! Inline button callback handling.
//!
//! Every query is answered first (stops the client spinner), then decoded
//! into a [`CallbackAction`]. Operator-tagged actions from any other sender
//! are ignored. The actor's button message is edited in place with the
//! outcome text and the state-appropriate menu; counterpart notifications
//! come from the relay engine.

use crate::bot::action::{CallbackAction, DecodeError};
use crate::bot::handlers::TelegramRelayEngine;
use crate::bot::views;
use anyhow::Result;
use std::sync::Arc;
use switchboard_core::session::{
    ApproveOutcome, CancelOutcome, EndOutcome, RejectOutcome, RequestOutcome,
};
use teloxide::prelude::*;
use teloxide::types::{CallbackQuery, InlineKeyboardMarkup, MessageId};
use tracing::debug;

/// The actor's button message, edited in place to reflect outcomes.
struct Screen<'a> {
    bot: &'a Bot,
    chat: ChatId,
    message: MessageId,
}

impl Screen<'_> {
    async fn replace(&self, text: &str, menu: Option<InlineKeyboardMarkup>) -> Result<()> {
        let mut req = self.bot.edit_message_text(self.chat, self.message, text);
        if let Some(markup) = menu {
            req = req.reply_markup(markup);
        }
        match req.await {
            Ok(_) => Ok(()),
            // Re-pressing a button re-renders the same text; not an error.
            Err(e) if e.to_string().contains("message is not modified") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Handle a single callback query end to end.
///
/// # Errors
///
/// Returns an error if a Telegram API call fails.
pub async fn handle_callback(
    bot: Bot,
    q: CallbackQuery,
    engine: Arc<TelegramRelayEngine>,
) -> Result<()> {
    let Some(data) = q.data.as_deref() else {
        return Ok(());
    };
    let _ = bot.answer_callback_query(q.id.clone()).await;

    let sender = q.from.id.0.cast_signed();
    let Some((chat, message)) = q.message.as_ref().map(|msg| (msg.chat().id, msg.id())) else {
        return Ok(());
    };
    let screen = Screen {
        bot: &bot,
        chat,
        message,
    };

    let action = match CallbackAction::decode(data) {
        Ok(action) => action,
        Err(DecodeError::UnknownTag) => {
            debug!(data, "unrecognized callback payload ignored");
            return Ok(());
        }
        Err(DecodeError::BadParameter) => {
            return screen
                .replace("That action is no longer available.", None)
                .await;
        }
    };

    if action.operator_only() {
        if sender != *engine.operator() {
            debug!(user = sender, ?action, "operator action from non-operator ignored");
            return Ok(());
        }
        return operator_action(&bot, &screen, &engine, action).await;
    }
    user_action(&screen, &engine, &q, sender, action).await
}

async fn user_action(
    screen: &Screen<'_>,
    engine: &TelegramRelayEngine,
    q: &CallbackQuery,
    sender: i64,
    action: CallbackAction,
) -> Result<()> {
    let text = match action {
        CallbackAction::Apply => {
            let username = q.from.username.as_deref();
            match engine.handle_apply(sender, username).await {
                RequestOutcome::Accepted => {
                    "✅ Request sent. Please wait for the operator to confirm."
                }
                RequestOutcome::AlreadyPending => {
                    "You already have a pending request. Please wait for the operator."
                }
                RequestOutcome::AlreadyActive => {
                    "You are already connected. Use the end button to disconnect."
                }
            }
        }
        CallbackAction::CancelRequest => match engine.handle_cancel(sender).await {
            CancelOutcome::Cancelled => "Request cancelled.",
            CancelOutcome::NotPending => "You have no pending request.",
        },
        CallbackAction::EndChat => match engine.handle_end_by_user(sender).await {
            EndOutcome::Ended => "You have left the chat with the operator.",
            EndOutcome::NotActive => "You have no active session.",
        },
        // Operator actions are dispatched before this point.
        _ => return Ok(()),
    };
    let menu = views::user_menu_for(engine.session_state(&sender));
    screen.replace(text, Some(menu)).await
}

async fn operator_action(
    bot: &Bot,
    screen: &Screen<'_>,
    engine: &TelegramRelayEngine,
    action: CallbackAction,
) -> Result<()> {
    match action {
        CallbackAction::ViewPending => {
            let pending = engine.pending_users();
            if pending.is_empty() {
                return screen
                    .replace("No pending requests.", Some(views::operator_panel()))
                    .await;
            }
            screen
                .replace("Pending requests:", Some(views::operator_panel()))
                .await?;
            for user in pending {
                bot.send_message(screen.chat, format!("📌 Requesting user ID: {user}"))
                    .reply_markup(views::pending_item(user))
                    .await?;
            }
        }
        CallbackAction::ViewActive => {
            let active = engine.active_users();
            if active.is_empty() {
                return screen
                    .replace("No active sessions.", Some(views::operator_panel()))
                    .await;
            }
            screen
                .replace("Active sessions:", Some(views::operator_panel()))
                .await?;
            for user in active {
                bot.send_message(screen.chat, format!("🟢 Active user ID: {user}"))
                    .reply_markup(views::active_item(user))
                    .await?;
            }
        }
        CallbackAction::ConnectHint => {
            screen
                .replace(
                    "Use /connect <user_id> to open a session with a user directly \
                     (no request needed).",
                    Some(views::operator_panel()),
                )
                .await?;
        }
        CallbackAction::Accept(user) => {
            let text = match engine.handle_approve(user).await {
                ApproveOutcome::Approved => format!("✅ Request from user {user} approved."),
                ApproveOutcome::NotPending => "That request is no longer pending.".to_string(),
            };
            screen.replace(&text, None).await?;
        }
        CallbackAction::Reject(user) => {
            let text = match engine.handle_reject(user).await {
                RejectOutcome::Rejected => format!("❌ Request from user {user} rejected."),
                RejectOutcome::NotPending => "That request is no longer pending.".to_string(),
            };
            screen.replace(&text, None).await?;
        }
        CallbackAction::EndSession(user) => {
            let text = match engine.handle_end_by_operator(user).await {
                EndOutcome::Ended => format!("🔚 Session with user {user} ended."),
                EndOutcome::NotActive => "That user has no active session.".to_string(),
            };
            screen.replace(&text, None).await?;
        }
        // User actions are dispatched before this point.
        _ => {}
    }
    Ok(())
}
