/// Typed callback actions decoded at the transport boundary.
pub mod action;
/// Inline button callback handling.
pub mod callbacks;
/// Command and relay message handlers.
pub mod handlers;
/// Relay transport implementation over the Bot API.
pub mod transport;
/// View layer for UI components (keyboards).
pub mod views;
