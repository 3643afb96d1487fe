//! Periodic background jobs.
//!
//! Every job runs on its own tokio interval with the first immediate tick
//! skipped. A failing run is logged and the loop keeps going.

use chrono::Utc;
use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::core::context::AppContext;
use crate::core::error::AppResult;
use crate::core::{auction, premium, watch};
use crate::storage::backup::create_backup;
use crate::storage::{get_connection, CacheKeys};
use crate::telegram::notifications::{Notification, NotificationSender};

fn send(notifier: &NotificationSender, notification: Notification) {
    if notifier.send(notification).is_err() {
        log::warn!("Notification channel closed, dropping notification");
    }
}

/// Settles finished auctions and notifies winners and admins
pub async fn settle_auctions(ctx: &AppContext, notifier: &NotificationSender) -> AppResult<usize> {
    let settled = {
        let conn = get_connection(&ctx.pool)?;
        auction::settle_due(&conn, Utc::now())?
    };
    if settled.is_empty() {
        return Ok(0);
    }

    let mut summary = vec![format!("🔨 {} auction(s) ended:", settled.len())];
    for item in &settled {
        match &item.winning_bid {
            Some(bid) => {
                send(
                    notifier,
                    Notification::AuctionWon {
                        tg_id: bid.tg_id,
                        auction_id: item.auction.id,
                        title: item.auction.title.clone(),
                        amount: bid.amount,
                    },
                );
                summary.push(format!(
                    "#{} \"{}\": won by {} for {:.2}",
                    item.auction.id, item.auction.title, bid.tg_id, bid.amount
                ));
            }
            None => summary.push(format!("#{} \"{}\": no bids", item.auction.id, item.auction.title)),
        }
    }
    send(notifier, Notification::Admin(summary.join("\n")));
    ctx.invalidate_credit_caches().await;

    Ok(settled.len())
}

/// Ends expired premium memberships and tells the affected users
pub async fn expire_premium(ctx: &AppContext, notifier: &NotificationSender) -> AppResult<usize> {
    let expired = {
        let conn = get_connection(&ctx.pool)?;
        premium::expire_due(&conn, Utc::now())?
    };
    for tg_id in &expired {
        send(notifier, Notification::PremiumExpired { tg_id: *tg_id });
    }
    if !expired.is_empty() {
        ctx.invalidate_system_stats().await;
    }
    Ok(expired.len())
}

/// Pays credits for new watch time. Does nothing without a media server.
pub async fn sync_watch_time(ctx: &AppContext, notifier: &NotificationSender) -> AppResult<usize> {
    let Some(media) = ctx.media.as_deref() else {
        log::debug!("No media server configured, skipping watch sync");
        return Ok(0);
    };

    let report = watch::sync_watch_credits(&ctx.pool, media, ctx.settings.economy.credits_per_watched_hour).await?;
    for (tg_id, credits) in &report.awarded {
        send(
            notifier,
            Notification::WatchCredits {
                tg_id: *tg_id,
                credits: *credits,
            },
        );
    }

    let mut keys = CacheKeys::credit_dependent();
    keys.push(CacheKeys::ranking("watched"));
    ctx.cache.invalidate(&keys).await;

    Ok(report.awarded.len())
}

pub fn backup_database(ctx: &AppContext) -> AppResult<PathBuf> {
    let conn = get_connection(&ctx.pool)?;
    create_backup(&conn, &ctx.settings.db_path(), &ctx.settings.backup_dir())
}

fn spawn_job<F, Fut, T>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = AppResult<T>> + Send,
    T: std::fmt::Debug,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first immediate tick
        interval.tick().await;

        loop {
            interval.tick().await;
            match job().await {
                Ok(result) => log::debug!("Job '{}' finished: {:?}", name, result),
                Err(e) => log::error!("Job '{}' failed: {}", name, e),
            }
        }
    })
}

/// Starts every periodic job
pub fn start_scheduler(ctx: AppContext, notifier: NotificationSender) -> Vec<JoinHandle<()>> {
    let jobs = ctx.settings.jobs.clone();
    let mut handles = Vec::new();

    {
        let (ctx, notifier) = (ctx.clone(), notifier.clone());
        handles.push(spawn_job("auction settlement", jobs.auction_check_interval, move || {
            let (ctx, notifier) = (ctx.clone(), notifier.clone());
            async move { settle_auctions(&ctx, &notifier).await }
        }));
    }
    {
        let (ctx, notifier) = (ctx.clone(), notifier.clone());
        handles.push(spawn_job("premium expiry", jobs.premium_check_interval, move || {
            let (ctx, notifier) = (ctx.clone(), notifier.clone());
            async move { expire_premium(&ctx, &notifier).await }
        }));
    }
    if ctx.media.is_some() {
        let (ctx, notifier) = (ctx.clone(), notifier.clone());
        handles.push(spawn_job("watch sync", jobs.watch_sync_interval, move || {
            let (ctx, notifier) = (ctx.clone(), notifier.clone());
            async move { sync_watch_time(&ctx, &notifier).await }
        }));
    } else {
        log::info!("No media server configured, watch sync job disabled");
    }
    {
        let ctx = ctx.clone();
        handles.push(spawn_job("database backup", jobs.backup_interval, move || {
            let ctx = ctx.clone();
            async move { backup_database(&ctx) }
        }));
    }

    log::info!(
        "Scheduler started: auctions every {:?}, premium every {:?}, watch sync every {:?}, backup every {:?}",
        jobs.auction_check_interval,
        jobs.premium_check_interval,
        jobs.watch_sync_interval,
        jobs.backup_interval
    );

    handles
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Settings;
    use crate::core::invitation::tests::FakeMediaServer;
    use crate::media::MediaServer;
    use crate::storage::accounts::insert_account;
    use crate::storage::auctions::{insert_auction, NewAuction};
    use crate::storage::db::{adjust_credits, ensure_user, extend_premium, test_pool};
    use crate::storage::Cache;
    use chrono::Duration as ChronoDuration;
    use pretty_assertions::assert_eq;
    use std::sync::Arc;
    use tokio::sync::mpsc;

    fn context(pool: crate::storage::DbPool, data_path: &std::path::Path) -> AppContext {
        let data_path = data_path.display().to_string();
        let settings = Settings::from_lookup(|key| match key {
            "DATA_PATH" => Some(data_path.clone()),
            "ADMIN_CHAT_ID" => Some("99".to_string()),
            _ => None,
        })
        .unwrap();
        AppContext::new(pool, Cache::disabled(), None, Arc::new(settings))
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Notification>) -> Vec<Notification> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn test_settle_notifies_winner_and_admins() {
        let (dir, pool) = test_pool();
        let ctx = context(pool, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        let now = Utc::now();
        let id = {
            let conn = get_connection(&ctx.pool).unwrap();
            ensure_user(&conn, 7, None, None).unwrap();
            adjust_credits(&conn, 7, 50.0, "test").unwrap();
            let id = insert_auction(
                &conn,
                &NewAuction {
                    title: "Poster",
                    description: "",
                    starting_price: 10.0,
                    min_increment: 1.0,
                    ends_at: now + ChronoDuration::minutes(1),
                    created_by: 99,
                },
            )
            .unwrap();
            auction::place_bid(&conn, id, 7, 12.0, now).unwrap();
            conn.execute(
                "UPDATE auctions SET ends_at = ?2 WHERE id = ?1",
                rusqlite::params![id, now - ChronoDuration::minutes(1)],
            )
            .unwrap();
            id
        };

        assert_eq!(settle_auctions(&ctx, &tx).await.unwrap(), 1);

        let sent = drain(&mut rx);
        assert_eq!(sent.len(), 2);
        assert_eq!(
            sent[0],
            Notification::AuctionWon {
                tg_id: 7,
                auction_id: id,
                title: "Poster".to_string(),
                amount: 12.0,
            }
        );
        assert!(matches!(&sent[1], Notification::Admin(text) if text.contains("won by 7")));

        // Nothing left to settle
        assert_eq!(settle_auctions(&ctx, &tx).await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_expire_premium_notifies_users() {
        let (dir, pool) = test_pool();
        let ctx = context(pool, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        {
            let conn = get_connection(&ctx.pool).unwrap();
            ensure_user(&conn, 3, None, None).unwrap();
            extend_premium(&conn, 3, 1, Utc::now() - ChronoDuration::days(2)).unwrap();
        }

        assert_eq!(expire_premium(&ctx, &tx).await.unwrap(), 1);
        assert_eq!(drain(&mut rx), vec![Notification::PremiumExpired { tg_id: 3 }]);
    }

    #[tokio::test]
    async fn test_watch_sync_without_media_is_noop() {
        let (dir, pool) = test_pool();
        let ctx = context(pool, dir.path());
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(sync_watch_time(&ctx, &tx).await.unwrap(), 0);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn test_watch_sync_notifies_credited_users() {
        let (dir, pool) = test_pool();
        let mut ctx = context(pool, dir.path());
        let media = FakeMediaServer::default();
        {
            let conn = get_connection(&ctx.pool).unwrap();
            ensure_user(&conn, 5, None, None).unwrap();
            insert_account(&conn, 5, media.kind(), "srv-5", "eve").unwrap();
        }
        media.watched.lock().unwrap().insert("srv-5".to_string(), 120);
        ctx.media = Some(Arc::new(media));
        let (tx, mut rx) = mpsc::unbounded_channel();

        assert_eq!(sync_watch_time(&ctx, &tx).await.unwrap(), 1);
        let sent = drain(&mut rx);
        assert!(matches!(sent.as_slice(), [Notification::WatchCredits { tg_id: 5, .. }]));
    }

    #[test]
    fn test_backup_job_writes_file() {
        let (dir, pool) = test_pool();
        let ctx = context(pool, dir.path());

        let path = backup_database(&ctx).unwrap();
        assert!(path.starts_with(dir.path().join("backups")));
        assert!(path.exists());
    }
}
