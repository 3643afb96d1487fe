//! Outgoing notifications.
//!
//! Domain code and the scheduler never talk to Telegram directly: they push a
//! [`Notification`] into an unbounded channel and [`run_notifier`] delivers it.

use teloxide::prelude::*;
use teloxide::types::ChatId;
use tokio::sync::mpsc;

pub type NotificationSender = mpsc::UnboundedSender<Notification>;
pub type NotificationReceiver = mpsc::UnboundedReceiver<Notification>;

#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// Someone placed a higher bid
    Outbid {
        tg_id: i64,
        auction_id: i64,
        title: String,
        refunded: f64,
    },
    AuctionWon {
        tg_id: i64,
        auction_id: i64,
        title: String,
        amount: f64,
    },
    PremiumExpired {
        tg_id: i64,
    },
    WatchCredits {
        tg_id: i64,
        credits: f64,
    },
    /// Free text for every configured admin
    Admin(String),
}

impl Notification {
    pub fn text(&self) -> String {
        match self {
            Notification::Outbid {
                auction_id,
                title,
                refunded,
                ..
            } => format!(
                "⚠️ You have been outbid on auction #{} \"{}\". {:.2} credits were returned to you.",
                auction_id, title, refunded
            ),
            Notification::AuctionWon {
                auction_id,
                title,
                amount,
                ..
            } => format!(
                "🏆 You won auction #{} \"{}\" for {:.2} credits! An admin will contact you.",
                auction_id, title, amount
            ),
            Notification::PremiumExpired { .. } => {
                "⌛ Your premium membership has expired. Use /premium to extend it.".to_string()
            }
            Notification::WatchCredits { credits, .. } => {
                format!("🎬 You earned {:.2} credits for watching. Enjoy!", credits)
            }
            Notification::Admin(text) => text.clone(),
        }
    }

    /// Chats the notification goes to
    pub fn recipients(&self, admin_ids: &[i64]) -> Vec<i64> {
        match self {
            Notification::Outbid { tg_id, .. }
            | Notification::AuctionWon { tg_id, .. }
            | Notification::PremiumExpired { tg_id }
            | Notification::WatchCredits { tg_id, .. } => vec![*tg_id],
            Notification::Admin(_) => admin_ids.to_vec(),
        }
    }
}

pub fn notification_channel() -> (NotificationSender, NotificationReceiver) {
    mpsc::unbounded_channel()
}

/// Sends a text to every admin, failures are logged
pub async fn notify_admins(bot: &Bot, admin_ids: &[i64], text: &str) {
    for admin_id in admin_ids {
        if let Err(e) = bot.send_message(ChatId(*admin_id), text).await {
            log::error!("Failed to notify admin {}: {}", admin_id, e);
        }
    }
}

/// Delivers notifications until every sender is dropped
pub async fn run_notifier(bot: Bot, admin_ids: Vec<i64>, mut rx: NotificationReceiver) {
    log::info!("Notifier started");
    while let Some(notification) = rx.recv().await {
        let text = notification.text();
        for chat_id in notification.recipients(&admin_ids) {
            if let Err(e) = bot.send_message(ChatId(chat_id), &text).await {
                log::warn!("Failed to deliver notification to {}: {}", chat_id, e);
            }
        }
    }
    log::info!("Notifier stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recipients() {
        let admins = [10, 11];
        assert_eq!(Notification::PremiumExpired { tg_id: 5 }.recipients(&admins), vec![5]);
        assert_eq!(Notification::Admin("hi".to_string()).recipients(&admins), vec![10, 11]);
    }

    #[test]
    fn test_text() {
        let text = Notification::AuctionWon {
            tg_id: 1,
            auction_id: 3,
            title: "Lifetime".to_string(),
            amount: 120.0,
        }
        .text();
        assert!(text.contains("#3"));
        assert!(text.contains("120.00"));
    }
}
