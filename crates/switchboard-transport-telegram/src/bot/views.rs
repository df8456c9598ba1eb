//! Keyboards for the user menu and the operator panel.

use crate::bot::action::CallbackAction;
use switchboard_core::relay::MenuKind;
use switchboard_core::session::SessionState;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

fn button(caption: &str, action: &CallbackAction) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(caption, action.encode())
}

/// The user's main menu: exactly one of apply / cancel / end.
#[must_use]
pub fn user_menu(pending: bool, active: bool) -> InlineKeyboardMarkup {
    let row = if active {
        vec![button("🔚 End chat", &CallbackAction::EndChat)]
    } else if pending {
        vec![button("⏳ Cancel request", &CallbackAction::CancelRequest)]
    } else {
        vec![button("📨 Request operator chat", &CallbackAction::Apply)]
    };
    InlineKeyboardMarkup::new(vec![row])
}

/// The user menu matching a session state.
#[must_use]
pub fn user_menu_for(state: SessionState) -> InlineKeyboardMarkup {
    user_menu(
        state == SessionState::Pending,
        state == SessionState::Active,
    )
}

/// Operator panel entry keyboard.
#[must_use]
pub fn operator_panel() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![
        vec![
            button("📥 Pending requests", &CallbackAction::ViewPending),
            button("📋 Active sessions", &CallbackAction::ViewActive),
        ],
        vec![button(
            "📤 Connect to a user (command)",
            &CallbackAction::ConnectHint,
        )],
    ])
}

/// Approve/reject buttons under one pending request.
#[must_use]
pub fn pending_item(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![
        button("✅ Approve", &CallbackAction::Accept(user_id)),
        button("❌ Reject", &CallbackAction::Reject(user_id)),
    ]])
}

/// End button under one active session entry.
#[must_use]
pub fn active_item(user_id: i64) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new(vec![vec![button(
        "🔚 End this session",
        &CallbackAction::EndSession(user_id),
    )]])
}

/// Render the menu kind named by the relay core.
#[must_use]
pub fn render_menu(menu: &MenuKind<i64>) -> InlineKeyboardMarkup {
    match menu {
        MenuKind::User { pending, active } => user_menu(*pending, *active),
        MenuKind::OperatorPanel => operator_panel(),
        MenuKind::PendingItem(user) => pending_item(*user),
        MenuKind::ActiveItem(user) => active_item(*user),
    }
}
