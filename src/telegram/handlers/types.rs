//! Handler types, dependencies, and user management helpers

use teloxide::types::Message;

use crate::core::context::AppContext;
use crate::core::error::{AppError, AppResult};
use crate::storage::db::ensure_user;
use crate::storage::get_connection;
use crate::telegram::notifications::{Notification, NotificationSender};

/// Error type for handlers
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Dependencies required by handlers
#[derive(Clone)]
pub struct HandlerDeps {
    pub ctx: AppContext,
    pub notifier: NotificationSender,
}

impl HandlerDeps {
    /// Create new handler dependencies
    pub fn new(ctx: AppContext, notifier: NotificationSender) -> Self {
        Self { ctx, notifier }
    }

    /// Queues a notification; a closed channel only means we are shutting down
    pub fn notify(&self, notification: Notification) {
        if self.notifier.send(notification).is_err() {
            log::warn!("Notification channel closed, dropping notification");
        }
    }
}

/// Telegram id of the message author
pub fn sender_id(msg: &Message) -> Option<i64> {
    msg.from.as_ref().and_then(|u| i64::try_from(u.id.0).ok())
}

/// Stores or refreshes the author's profile.
///
/// # Returns
/// `true` if the user was seen for the first time.
pub fn register_user(deps: &HandlerDeps, msg: &Message) -> AppResult<bool> {
    let user = msg
        .from
        .as_ref()
        .ok_or_else(|| AppError::Validation("Message has no sender".to_string()))?;
    let tg_id = i64::try_from(user.id.0).map_err(|_| AppError::Validation("Invalid user id".to_string()))?;

    let conn = get_connection(&deps.ctx.pool)?;
    let created = ensure_user(&conn, tg_id, user.username.as_deref(), Some(user.first_name.as_str()))?;
    if created {
        log::info!("New user registered: {} (@{})", tg_id, user.username.as_deref().unwrap_or("-"));
    }
    Ok(created)
}

/// Splits command arguments, `None` unless there are exactly `N`
pub fn split_args<const N: usize>(raw: &str) -> Option<[&str; N]> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    parts.try_into().ok()
}
