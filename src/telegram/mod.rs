//! Telegram bot integration and handlers

pub mod bot;
pub mod handlers;
pub mod notifications;
pub mod webapp_auth;

// Re-exports for convenience
pub use bot::{create_bot, setup_bot_commands, Command};
pub use handlers::{schema, HandlerDeps, HandlerError};
pub use notifications::{notification_channel, run_notifier, Notification, NotificationSender};
pub use webapp_auth::{validate_init_data, WebAppUser};
