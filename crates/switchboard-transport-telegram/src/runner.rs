//! Telegram runtime entrypoint.

use crate::bot::callbacks;
use crate::bot::handlers::{self, Command, TelegramRelayEngine};
use crate::bot::transport::TelegramTransport;
use crate::config::TelegramSettings;
use std::sync::Arc;
use switchboard_core::relay::RelayEngine;
use switchboard_core::routing::RoutingTable;
use switchboard_core::session::SessionRegistry;
use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::CallbackQuery;
use tracing::{error, info};

/// Run the Telegram relay runtime until shutdown.
pub async fn run_bot(settings: Arc<TelegramSettings>) {
    let bot = Bot::new(settings.telegram_token.clone());

    let registry = Arc::new(SessionRegistry::new());
    let routing = Arc::new(RoutingTable::new());
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let engine: Arc<TelegramRelayEngine> = Arc::new(RelayEngine::new(
        registry,
        routing,
        transport,
        settings.operator_id,
    ));

    info!(operator = settings.operator_id, "Relay bot is running...");

    Dispatcher::builder(bot, setup_handler())
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn setup_handler() -> UpdateHandler<teloxide::RequestError> {
    dptree::entry()
        .branch(Update::filter_callback_query().endpoint(handle_callback_query))
        .branch(
            Update::filter_message()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(Update::filter_message().endpoint(handle_relay_message))
}

async fn handle_callback_query(
    bot: Bot,
    q: CallbackQuery,
    engine: Arc<TelegramRelayEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = callbacks::handle_callback(bot, q, engine).await {
        error!("Callback handler error: {e}");
    }
    respond(())
}

async fn handle_command(
    bot: Bot,
    msg: Message,
    cmd: Command,
    engine: Arc<TelegramRelayEngine>,
) -> Result<(), teloxide::RequestError> {
    let res = match cmd {
        Command::Start => handlers::start(bot, msg, engine).await,
        Command::Help => handlers::help(bot, msg, engine).await,
        Command::Panel => handlers::panel(bot, msg, engine).await,
        Command::Connect(args) => handlers::connect(bot, msg, args, engine).await,
    };
    if let Err(e) = res {
        error!("Command error: {e}");
    }
    respond(())
}

async fn handle_relay_message(
    msg: Message,
    engine: Arc<TelegramRelayEngine>,
) -> Result<(), teloxide::RequestError> {
    if let Err(e) = handlers::relay_message(msg, engine).await {
        error!("Relay handler error: {e}");
    }
    respond(())
}
