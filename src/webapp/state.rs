use secrecy::ExposeSecret;

use crate::core::context::AppContext;
use crate::telegram::notifications::{Notification, NotificationSender};

/// Shared state for all endpoints
#[derive(Clone)]
pub struct WebAppState {
    pub ctx: AppContext,
    /// Absent when the process runs without a bot
    pub notifier: Option<NotificationSender>,
}

impl WebAppState {
    pub fn new(ctx: AppContext, notifier: Option<NotificationSender>) -> Self {
        Self { ctx, notifier }
    }

    pub fn bot_token(&self) -> &str {
        self.ctx.settings.bot_token.expose_secret()
    }

    pub fn session_secret(&self) -> &[u8] {
        self.ctx.settings.session_secret.expose_secret().as_bytes()
    }

    pub fn notify(&self, notification: Notification) {
        match &self.notifier {
            Some(notifier) => {
                if notifier.send(notification).is_err() {
                    log::warn!("Notification channel closed, dropping notification");
                }
            }
            None => log::debug!("No bot running, dropping notification {:?}", notification),
        }
    }
}
