//! Dispatcher schema and handler chain builders

use teloxide::dispatching::{UpdateFilterExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::Message;

use super::types::{register_user, sender_id, HandlerDeps, HandlerError};
use super::{admin, commands};
use crate::core::error::AppResult;
use crate::telegram::bot::Command;

/// Creates the main dispatcher schema for the Telegram bot.
///
/// The same schema is used in production and can be used in integration tests.
///
/// # Arguments
/// * `deps` - Handler dependencies (application context, notification sender)
///
/// # Returns
/// The complete handler tree for the bot
pub fn schema(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    let deps_commands = deps.clone();
    let deps_messages = deps;

    dptree::entry()
        // Command handler
        .branch(command_handler(deps_commands))
        // Anything else: refresh the profile and point at /help
        .branch(message_handler(deps_messages))
}

fn command_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().branch(dptree::entry().filter_command::<Command>().endpoint(
        move |bot: Bot, msg: Message, cmd: Command| {
            let deps = deps.clone();
            async move {
                let Some(tg_id) = sender_id(&msg) else {
                    return Ok(());
                };
                log::info!("Received command {:?} from {}", cmd, tg_id);

                if let Err(e) = register_user(&deps, &msg) {
                    log::error!("Failed to register user {}: {}", tg_id, e);
                }

                if cmd.is_admin_only() && !deps.ctx.is_admin(tg_id) {
                    bot.send_message(msg.chat.id, "⛔ This command is only available to admins.")
                        .await?;
                    return Ok(());
                }

                if let Err(e) = run_command(&bot, &msg, &deps, tg_id, cmd).await {
                    log::warn!("Command from {} failed: {}", tg_id, e);
                    bot.send_message(msg.chat.id, format!("❌ {}", e.user_message()))
                        .await?;
                }
                Ok(())
            }
        },
    ))
}

/// Runs a command; errors are reported to the user by the caller
async fn run_command(bot: &Bot, msg: &Message, deps: &HandlerDeps, tg_id: i64, cmd: Command) -> AppResult<()> {
    let reply = match cmd {
        Command::Start => return commands::handle_start_command(bot, msg, deps).await,
        Command::Help => commands::help_text(),
        Command::Info => commands::info_text(deps, tg_id)?,
        Command::Redeem(args) => commands::redeem(deps, tg_id, &args).await?,
        Command::Invite => commands::invite(deps, tg_id).await?,
        Command::Codes => commands::codes_text(deps, tg_id)?,
        Command::Premium(args) => commands::buy_premium(deps, tg_id, &args).await?,
        Command::Wheel => commands::spin_wheel(deps, tg_id).await?,
        Command::Rank(args) => commands::leaderboard(deps, &args).await?,
        Command::Auctions => commands::auctions_text(deps)?,
        Command::Bid(args) => commands::bid(deps, tg_id, &args).await?,
        Command::Transfer(args) => commands::transfer(deps, tg_id, &args).await?,
        Command::Addcredits(args) => admin::add_credits(deps, tg_id, &args).await?,
        Command::Donate(args) => admin::donate(deps, &args).await?,
        Command::Gencodes(args) => admin::generate_codes(deps, tg_id, &args).await?,
        Command::Ban(args) => admin::set_enabled(deps, &args, false).await?,
        Command::Unban(args) => admin::set_enabled(deps, &args, true).await?,
        Command::Stats => admin::stats_text(deps).await?,
        Command::Backup => admin::backup(deps)?,
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

fn message_handler(deps: HandlerDeps) -> UpdateHandler<HandlerError> {
    Update::filter_message().endpoint(move |bot: Bot, msg: Message| {
        let deps = deps.clone();
        async move {
            if sender_id(&msg).is_none() {
                return Ok(());
            }
            if let Err(e) = register_user(&deps, &msg) {
                log::error!("Failed to register user from chat {}: {}", msg.chat.id, e);
            }
            if msg.chat.is_private() && msg.text().is_some() {
                bot.send_message(msg.chat.id, "I only understand commands. Send /help to see them.")
                    .await?;
            }
            Ok(())
        }
    })
}
