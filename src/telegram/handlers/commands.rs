//! User command handlers

use chrono::Utc;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::str::FromStr;
use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, Message, WebAppInfo};
use teloxide::utils::command::BotCommands;

use super::types::{split_args, HandlerDeps};
use crate::core::error::{AppError, AppResult};
use crate::core::rankings::{self, RankingKind};
use crate::core::{auction, credits, invitation, premium, wheel};
use crate::storage::db::require_user;
use crate::storage::{accounts, auctions, get_connection, invitations};
use crate::telegram::bot::Command;
use crate::telegram::notifications::Notification;

const LEADERBOARD_SIZE: usize = 10;

fn usage(text: &str) -> AppError {
    AppError::Validation(format!("Usage: {}", text))
}

fn parse_amount(raw: &str) -> AppResult<f64> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AppError::Validation(format!("'{}' is not a valid amount", raw)))
}

fn parse_id(raw: &str) -> AppResult<i64> {
    raw.parse::<i64>()
        .map_err(|_| AppError::Validation(format!("'{}' is not a valid id", raw)))
}

pub(super) async fn handle_start_command(bot: &Bot, msg: &Message, deps: &HandlerDeps) -> AppResult<()> {
    let name = msg.from.as_ref().map(|u| u.first_name.clone()).unwrap_or_default();
    let text = format!(
        "👋 Hi {}!\n\n\
         Earn credits by watching and donating, then spend them on invitation codes, \
         premium, the lucky wheel and auctions.\n\n\
         Send /help for the list of commands.",
        name
    );

    let mut request = bot.send_message(msg.chat.id, text);
    if let Some(webapp_url) = &deps.ctx.settings.webapp_url {
        match url::Url::parse(webapp_url) {
            Ok(url) => {
                request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::web_app(
                    "Open WebApp",
                    WebAppInfo { url },
                )]]));
            }
            Err(e) => log::warn!("WEBAPP_URL '{}' is not a valid URL: {}", webapp_url, e),
        }
    }
    request.await?;
    Ok(())
}

pub(super) fn help_text() -> String {
    Command::descriptions().to_string()
}

pub(super) fn info_text(deps: &HandlerDeps, tg_id: i64) -> AppResult<String> {
    let conn = get_connection(&deps.ctx.pool)?;
    let user = require_user(&conn, tg_id)?;
    let user_accounts = accounts::accounts_for_user(&conn, tg_id)?;

    let premium = match (user.is_premium, user.premium_expires_at) {
        (true, Some(expires)) => format!("active until {}", expires.format("%Y-%m-%d %H:%M UTC")),
        _ => "inactive".to_string(),
    };
    let mut text = format!(
        "👤 {} (ID {})\n💰 Credits: {:.2}\n💝 Donated: {:.2}\n⭐ Premium: {}\n",
        user.display_name(),
        user.tg_id,
        user.credits,
        user.donation,
        premium
    );

    if user_accounts.is_empty() {
        text.push_str("🎬 No media account yet. Redeem an invitation code with /redeem.");
    } else {
        text.push_str("🎬 Accounts:");
        for account in user_accounts {
            text.push_str(&format!(
                "\n • {}: {} ({}, {:.1} h watched)",
                account.server,
                account.username,
                if account.is_active { "active" } else { "disabled" },
                account.watched_minutes as f64 / 60.0
            ));
        }
    }
    Ok(text)
}

pub(super) async fn redeem(deps: &HandlerDeps, tg_id: i64, args: &str) -> AppResult<String> {
    let [code, username] = split_args::<2>(args).ok_or_else(|| usage("/redeem <code> <username>"))?;
    let media = deps.ctx.media()?;
    let mut rng = StdRng::from_os_rng();

    let account = invitation::redeem(&deps.ctx.pool, media, code, tg_id, username, &mut rng).await?;
    deps.ctx.invalidate_system_stats().await;
    deps.notify(Notification::Admin(format!(
        "🆕 New {} account '{}' for user {}",
        account.server, account.username, tg_id
    )));

    Ok(format!(
        "✅ Your {} account is ready!\n\nUsername: {}\nPassword: {}\n\nPlease change the password after the first login.",
        account.server, account.username, account.password
    ))
}

pub(super) async fn invite(deps: &HandlerDeps, tg_id: i64) -> AppResult<String> {
    let cost = if deps.ctx.is_admin(tg_id) {
        0.0
    } else {
        deps.ctx.settings.economy.invitation_credits
    };
    let code = {
        let conn = get_connection(&deps.ctx.pool)?;
        invitation::generate(&conn, tg_id, cost, &mut StdRng::from_os_rng())?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!("🎟 Your invitation code: {}\nCost: {:.2} credits", code, cost))
}

pub(super) fn codes_text(deps: &HandlerDeps, tg_id: i64) -> AppResult<String> {
    let conn = get_connection(&deps.ctx.pool)?;
    let codes = invitations::codes_by_owner(&conn, tg_id)?;
    if codes.is_empty() {
        return Ok("You have no invitation codes. Buy one with /invite.".to_string());
    }

    let lines: Vec<String> = codes
        .iter()
        .map(|code| match code.used_by {
            Some(user) => format!("• {} (used by {})", code.code, user),
            None => format!("• {} (unused)", code.code),
        })
        .collect();
    Ok(format!("🎟 Your invitation codes:\n{}", lines.join("\n")))
}

pub(super) async fn buy_premium(deps: &HandlerDeps, tg_id: i64, args: &str) -> AppResult<String> {
    let [days] = split_args::<1>(args).ok_or_else(|| usage("/premium <days>"))?;
    let days: i64 = days
        .parse()
        .map_err(|_| AppError::Validation(format!("'{}' is not a number of days", days)))?;

    let purchase = {
        let conn = get_connection(&deps.ctx.pool)?;
        premium::purchase(&conn, tg_id, days, deps.ctx.settings.economy.premium_daily_credits, Utc::now())?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!(
        "⭐ Premium active until {}\nPaid {:.2} credits, balance {:.2}",
        purchase.expires_at.format("%Y-%m-%d %H:%M UTC"),
        purchase.cost,
        purchase.balance
    ))
}

pub(super) async fn spin_wheel(deps: &HandlerDeps, tg_id: i64) -> AppResult<String> {
    let outcome = {
        let conn = get_connection(&deps.ctx.pool)?;
        wheel::spin(
            &conn,
            tg_id,
            deps.ctx.settings.economy.wheel_cost_credits,
            &wheel::default_prizes(),
            &mut StdRng::from_os_rng(),
        )?
    };
    deps.ctx.invalidate_credit_caches().await;

    let mut text = format!("🎡 The wheel stops at... {}!", outcome.prize.name);
    if let Some(code) = &outcome.invitation_code {
        text.push_str(&format!("\n🎟 Your invitation code: {}", code));
    }
    if let Some(expires) = outcome.premium_expires_at {
        text.push_str(&format!("\n⭐ Premium until {}", expires.format("%Y-%m-%d %H:%M UTC")));
    }
    text.push_str(&format!("\n💰 Balance: {:.2}", outcome.balance));
    Ok(text)
}

pub(super) async fn leaderboard(deps: &HandlerDeps, args: &str) -> AppResult<String> {
    let kind = match args.trim() {
        "" => RankingKind::Credits,
        raw => RankingKind::from_str(&raw.to_lowercase())
            .map_err(|_| usage("/rank [credits|donation|watched]"))?,
    };
    let entries = rankings::fetch(
        &deps.ctx.pool,
        &deps.ctx.cache,
        kind,
        LEADERBOARD_SIZE,
        deps.ctx.settings.cache_ttl,
    )
    .await?;

    if entries.is_empty() {
        return Ok(format!("🏅 The {} leaderboard is empty.", kind));
    }
    let unit = match kind {
        RankingKind::Watched => "h",
        RankingKind::Credits | RankingKind::Donation => "",
    };
    let lines: Vec<String> = entries
        .iter()
        .map(|e| format!("{}. {}: {:.2}{}", e.rank, e.name, e.value, unit))
        .collect();
    Ok(format!("🏅 Top {} by {}:\n{}", entries.len(), kind, lines.join("\n")))
}

pub(super) fn auctions_text(deps: &HandlerDeps) -> AppResult<String> {
    let conn = get_connection(&deps.ctx.pool)?;
    let active = auctions::list_active(&conn)?;
    if active.is_empty() {
        return Ok("🔨 No active auctions right now.".to_string());
    }

    let mut lines = Vec::with_capacity(active.len());
    for item in &active {
        let top = auctions::top_bid(&conn, item.id)?;
        lines.push(format!(
            "#{} {}\n   current {:.2}, next bid ≥ {:.2}, ends {}",
            item.id,
            item.title,
            item.current_price,
            auction::minimum_bid(item, top.as_ref()),
            item.ends_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    Ok(format!("🔨 Active auctions:\n{}\n\nBid with /bid <id> <amount>", lines.join("\n")))
}

pub(super) async fn bid(deps: &HandlerDeps, tg_id: i64, args: &str) -> AppResult<String> {
    let [id, amount] = split_args::<2>(args).ok_or_else(|| usage("/bid <id> <amount>"))?;
    let (auction_id, amount) = (parse_id(id)?, parse_amount(amount)?);

    let outcome = {
        let conn = get_connection(&deps.ctx.pool)?;
        auction::place_bid(&conn, auction_id, tg_id, amount, Utc::now())?
    };
    if let Some((outbid_id, refunded)) = outcome.outbid {
        deps.notify(Notification::Outbid {
            tg_id: outbid_id,
            auction_id,
            title: outcome.auction.title.clone(),
            refunded,
        });
    }
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!(
        "✅ You are the top bidder on #{} with {:.2}. Balance: {:.2}",
        auction_id, outcome.amount, outcome.balance
    ))
}

pub(super) async fn transfer(deps: &HandlerDeps, tg_id: i64, args: &str) -> AppResult<String> {
    let [to, amount] = split_args::<2>(args).ok_or_else(|| usage("/transfer <telegram id> <amount>"))?;
    let (to, amount) = (parse_id(to)?, parse_amount(amount)?);

    let outcome = {
        let conn = get_connection(&deps.ctx.pool)?;
        credits::transfer(&conn, tg_id, to, amount)?
    };
    deps.ctx.invalidate_credit_caches().await;

    Ok(format!(
        "✅ Sent {:.2} credits to {}. Your balance: {:.2}",
        outcome.amount, to, outcome.sender_balance
    ))
}
