//! Relay transport over the Telegram Bot API.

use crate::bot::views;
use async_trait::async_trait;
use switchboard_core::relay::{DeliveryError, InboundEnvelope, MenuKind, RelayTransport};
use switchboard_core::routing::RelayedMessageId;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::warn;

/// [`RelayTransport`] implementation backed by a [`Bot`] handle.
///
/// Copies use `copyMessage`, so any content kind (text, photo, file, voice,
/// video, sticker) relays as a fresh message without forwarding attribution.
/// In private chats the chat id equals the user id, so envelope identities
/// double as chat addresses.
pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    /// Wrap a bot handle.
    #[must_use]
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

fn as_message_id(raw: RelayedMessageId) -> Result<MessageId, DeliveryError> {
    i32::try_from(raw)
        .map(MessageId)
        .map_err(|_| DeliveryError::Malformed(format!("message id {raw} out of range")))
}

#[async_trait]
impl RelayTransport<i64> for TelegramTransport {
    async fn deliver_copy(
        &self,
        envelope: &InboundEnvelope<i64>,
        target: i64,
    ) -> Result<RelayedMessageId, DeliveryError> {
        let source = as_message_id(envelope.message_id)?;
        let copied = self
            .bot
            .copy_message(ChatId(target), ChatId(envelope.sender), source)
            .await
            .map_err(|e| DeliveryError::Rejected(e.to_string()))?;
        Ok(RelayedMessageId::from(copied.0))
    }

    async fn notify(&self, target: i64, text: &str) {
        if let Err(e) = self.bot.send_message(ChatId(target), text).await {
            warn!(chat = target, error = %e, "notification failed");
        }
    }

    async fn notify_with_menu(&self, target: i64, text: &str, menu: MenuKind<i64>) {
        let markup = views::render_menu(&menu);
        if let Err(e) = self
            .bot
            .send_message(ChatId(target), text)
            .reply_markup(markup)
            .await
        {
            warn!(chat = target, error = %e, "menu notification failed");
        }
    }
}
