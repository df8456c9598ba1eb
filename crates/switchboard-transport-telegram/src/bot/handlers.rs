//! Command and relay message handlers.

use crate::bot::transport::TelegramTransport;
use crate::bot::views;
use anyhow::Result;
use std::sync::Arc;
use switchboard_core::relay::{InboundEnvelope, RelayEngine};
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tracing::{debug, info};

/// Engine instantiation shared by every Telegram handler.
pub type TelegramRelayEngine = RelayEngine<i64, TelegramTransport>;

const PANEL_TEXT: &str = "Operator panel:\n\
    - review pending requests and approve or reject them\n\
    - inspect active sessions and end them\n\n\
    Use /connect <user_id> to open a session without a request.";

/// Safe extraction of the sender id from a message.
/// Returns 0 if the user information is missing.
#[must_use]
pub fn get_user_id_safe(msg: &Message) -> i64 {
    msg.from.as_ref().map_or(0, |u| u.id.0.cast_signed())
}

/// Supported commands for the bot.
#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "Supported commands:")]
pub enum Command {
    /// Role-aware entry point.
    #[command(description = "Start the bot.")]
    Start,
    /// Role-aware command summary.
    #[command(description = "Show available commands.")]
    Help,
    /// Operator panel refresh.
    #[command(description = "Refresh the operator panel.")]
    Panel,
    /// Operator-initiated session, no request needed.
    #[command(description = "Open a session with a user directly.")]
    Connect(String),
}

/// Start handler: panel for the operator, apply menu for everyone else.
///
/// # Errors
///
/// Returns an error if the greeting cannot be sent.
pub async fn start(bot: Bot, msg: Message, engine: Arc<TelegramRelayEngine>) -> Result<()> {
    let sender = get_user_id_safe(&msg);
    info!(user = sender, "received /start");

    if sender == *engine.operator() {
        bot.send_message(msg.chat.id, format!("Welcome, operator.\n\n{PANEL_TEXT}"))
            .reply_markup(views::operator_panel())
            .await?;
    } else {
        let state = engine.session_state(&sender);
        bot.send_message(
            msg.chat.id,
            "Welcome. Use the button below to request a chat with the operator.",
        )
        .reply_markup(views::user_menu_for(state))
        .await?;
    }
    Ok(())
}

/// Help handler with a role-dependent command summary.
///
/// # Errors
///
/// Returns an error if the summary cannot be sent.
pub async fn help(bot: Bot, msg: Message, engine: Arc<TelegramRelayEngine>) -> Result<()> {
    let text = if get_user_id_safe(&msg) == *engine.operator() {
        "/start - operator panel\n\
         /connect <user_id> - open a session with a user directly\n\
         /panel - refresh the operator panel"
    } else {
        "Use /start and the button below it to request a connection with the operator."
    };
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

/// Panel refresh, operator only; silently ignored for anyone else.
///
/// # Errors
///
/// Returns an error if the panel cannot be sent.
pub async fn panel(bot: Bot, msg: Message, engine: Arc<TelegramRelayEngine>) -> Result<()> {
    if get_user_id_safe(&msg) != *engine.operator() {
        return Ok(());
    }
    bot.send_message(msg.chat.id, PANEL_TEXT)
        .reply_markup(views::operator_panel())
        .await?;
    Ok(())
}

/// Operator-initiated connect: `/connect <user_id>`.
///
/// Silently ignored for non-operators; argument problems get a usage notice.
///
/// # Errors
///
/// Returns an error if a response cannot be sent.
pub async fn connect(
    bot: Bot,
    msg: Message,
    args: String,
    engine: Arc<TelegramRelayEngine>,
) -> Result<()> {
    if get_user_id_safe(&msg) != *engine.operator() {
        return Ok(());
    }
    let args = args.trim();
    if args.is_empty() {
        bot.send_message(msg.chat.id, "Usage: /connect <user_id>")
            .await?;
        return Ok(());
    }
    let Ok(user) = args.parse::<i64>() else {
        bot.send_message(msg.chat.id, "user_id must be a number.")
            .await?;
        return Ok(());
    };
    // Confirmation to the operator and courtesy notice to the user both
    // come from the engine.
    engine.handle_connect(user).await;
    Ok(())
}

/// Route every non-command private message through the relay engine.
///
/// # Errors
///
/// Infallible today; kept fallible to match the other handlers.
pub async fn relay_message(msg: Message, engine: Arc<TelegramRelayEngine>) -> Result<()> {
    if !msg.chat.is_private() {
        debug!(chat = msg.chat.id.0, "ignoring non-private message");
        return Ok(());
    }
    let sender = get_user_id_safe(&msg);
    if sender == 0 {
        return Ok(());
    }

    let envelope = InboundEnvelope {
        sender,
        from_operator: sender == *engine.operator(),
        message_id: i64::from(msg.id.0),
        reply_to: msg.reply_to_message().map(|reply| i64::from(reply.id.0)),
    };
    let outcome = engine.handle_message(envelope).await;
    debug!(user = sender, ?outcome, "relay decision");
    Ok(())
}
