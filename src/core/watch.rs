//! Converting watch time on the media server into credits

use serde::Serialize;

use crate::core::error::AppResult;
use crate::media::MediaServer;
use crate::storage::accounts;
use crate::storage::db::{apply_credit_delta, get_connection, round_credits, write_transaction, DbPool};

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WatchSyncReport {
    pub accounts_checked: usize,
    pub failures: usize,
    /// `(tg_id, credits)` for every user who earned something
    pub awarded: Vec<(i64, f64)>,
}

/// Reads watched minutes for every active account and pays `credits_per_hour`
/// for minutes not credited before.
///
/// Minutes worth less than 0.01 credits stay uncredited and carry over to the
/// next run. A failing account is logged and skipped.
pub async fn sync_watch_credits(
    pool: &DbPool,
    media: &dyn MediaServer,
    credits_per_hour: f64,
) -> AppResult<WatchSyncReport> {
    let active = {
        let conn = get_connection(pool)?;
        accounts::list_active_accounts(&conn, media.kind())?
    };
    let mut report = WatchSyncReport::default();

    for account in active {
        report.accounts_checked += 1;
        let watched = match media.watched_minutes(&account.server_user_id).await {
            Ok(minutes) => minutes.max(account.watched_minutes),
            Err(e) => {
                log::warn!("Failed to read watch time of '{}': {}", account.username, e);
                report.failures += 1;
                continue;
            }
        };

        let conn = get_connection(pool)?;
        let tx = write_transaction(&conn)?;
        accounts::set_watched_minutes(&tx, account.id, watched)?;

        let new_minutes = watched - account.credited_minutes;
        let credits = round_credits(new_minutes as f64 / 60.0 * credits_per_hour);
        if credits > 0.0 {
            apply_credit_delta(
                &tx,
                account.tg_id,
                credits,
                &format!("watch time {} min", new_minutes),
            )?;
            accounts::mark_credited(&tx, account.id, watched)?;
            report.awarded.push((account.tg_id, credits));
        }
        tx.commit()?;
    }

    log::info!(
        "Watch sync: {} accounts checked, {} users credited, {} failures",
        report.accounts_checked,
        report.awarded.len(),
        report.failures
    );
    Ok(report)
}
