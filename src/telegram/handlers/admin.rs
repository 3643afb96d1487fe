//! Admin command handlers

use rand::rngs::StdRng;
use rand::SeedableRng;

use super::types::{split_args, HandlerDeps};
use crate::core::accounts::set_account_enabled;
use crate::core::error::{AppError, AppResult};
use crate::core::{credits, invitation, stats};
use crate::storage::backup::create_backup;
use crate::storage::get_connection;

fn usage(text: &str) -> AppError {
    AppError::Validation(format!("Usage: {}", text))
}

fn parse_user_and_amount(args: &str, usage_text: &str) -> AppResult<(i64, f64)> {
    let [tg_id, amount] = split_args::<2>(args).ok_or_else(|| usage(usage_text))?;
    let tg_id = tg_id.parse::<i64>().map_err(|_| usage(usage_text))?;
    let amount = amount
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| usage(usage_text))?;
    Ok((tg_id, amount))
}

pub(super) async fn add_credits(deps: &HandlerDeps, admin_id: i64, args: &str) -> AppResult<String> {
    let (tg_id, amount) = parse_user_and_amount(args, "/addcredits <telegram id> <amount>")?;
    let balance = {
        let conn = get_connection(&deps.ctx.pool)?;
        credits::grant(&conn, tg_id, amount, &format!("admin {}", admin_id))?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!("✅ Credits of {} changed by {:.2}, balance {:.2}", tg_id, amount, balance))
}

pub(super) async fn donate(deps: &HandlerDeps, args: &str) -> AppResult<String> {
    let (tg_id, amount) = parse_user_and_amount(args, "/donate <telegram id> <amount>")?;
    let outcome = {
        let conn = get_connection(&deps.ctx.pool)?;
        credits::record_donation(
            &conn,
            tg_id,
            amount,
            deps.ctx.settings.economy.donation_credits_multiplier,
        )?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!(
        "✅ Donation of {:.2} recorded for {} (+{:.2} credits, donated in total {:.2})",
        amount, tg_id, outcome.credits_awarded, outcome.donation_total
    ))
}

pub(super) async fn generate_codes(deps: &HandlerDeps, admin_id: i64, args: &str) -> AppResult<String> {
    let [count] = split_args::<1>(args).ok_or_else(|| usage("/gencodes <count>"))?;
    let count = count.parse::<usize>().map_err(|_| usage("/gencodes <count>"))?;

    let codes = {
        let conn = get_connection(&deps.ctx.pool)?;
        invitation::generate_batch(&conn, admin_id, count, &mut StdRng::from_os_rng())?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!("🎟 Generated {} codes:\n{}", codes.len(), codes.join("\n")))
}

pub(super) async fn set_enabled(deps: &HandlerDeps, args: &str, enabled: bool) -> AppResult<String> {
    let command = if enabled { "/unban" } else { "/ban" };
    let [username] = split_args::<1>(args).ok_or_else(|| usage(&format!("{} <username>", command)))?;
    let media = deps.ctx.media()?;

    let account = set_account_enabled(&deps.ctx.pool, media, username, enabled).await?;
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!(
        "✅ Account '{}' of user {} is now {}",
        account.username,
        account.tg_id,
        if enabled { "enabled" } else { "disabled" }
    ))
}

pub(super) async fn stats_text(deps: &HandlerDeps) -> AppResult<String> {
    let stats = stats::cached_system_stats(&deps.ctx.pool, &deps.ctx.cache, deps.ctx.settings.cache_ttl).await?;
    Ok(stats.to_message())
}

pub(super) fn backup(deps: &HandlerDeps) -> AppResult<String> {
    let conn = get_connection(&deps.ctx.pool)?;
    let settings = &deps.ctx.settings;
    let path = create_backup(&conn, &settings.db_path(), &settings.backup_dir())?;
    Ok(format!("💾 Backup created: {}", path.display()))
}
