//! Bot initialization
//!
//! This module contains:
//! - Command enum definition
//! - Bot instance creation
//! - Registration of the command list in the Telegram UI

use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use std::time::Duration;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use crate::core::config::Settings;

/// Request timeout for Bot API calls, above the long-polling timeout
const BOT_API_TIMEOUT: Duration = Duration::from_secs(60);

/// Bot commands enum with descriptions
///
/// Commands with arguments take the raw remainder of the message; the handlers
/// split and validate it so that a malformed call gets a usage hint.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "register and open the WebApp")]
    Start,
    #[command(description = "show this help")]
    Help,
    #[command(description = "your credits, premium and accounts")]
    Info,
    #[command(description = "redeem an invitation code: /redeem <code> <username>")]
    Redeem(String),
    #[command(description = "buy an invitation code")]
    Invite,
    #[command(description = "list your invitation codes")]
    Codes,
    #[command(description = "buy premium days: /premium <days>")]
    Premium(String),
    #[command(description = "spin the lucky wheel")]
    Wheel,
    #[command(description = "leaderboard: /rank [credits|donation|watched]")]
    Rank(String),
    #[command(description = "list active auctions")]
    Auctions,
    #[command(description = "bid on an auction: /bid <id> <amount>")]
    Bid(String),
    #[command(description = "send credits: /transfer <telegram id> <amount>")]
    Transfer(String),
    #[command(description = "admin: /addcredits <telegram id> <amount>")]
    Addcredits(String),
    #[command(description = "admin: /donate <telegram id> <amount>")]
    Donate(String),
    #[command(description = "admin: /gencodes <count>")]
    Gencodes(String),
    #[command(description = "admin: disable a media account: /ban <username>")]
    Ban(String),
    #[command(description = "admin: enable a media account: /unban <username>")]
    Unban(String),
    #[command(description = "admin: system statistics")]
    Stats,
    #[command(description = "admin: back up the database")]
    Backup,
}

impl Command {
    pub fn is_admin_only(&self) -> bool {
        matches!(
            self,
            Command::Addcredits(_)
                | Command::Donate(_)
                | Command::Gencodes(_)
                | Command::Ban(_)
                | Command::Unban(_)
                | Command::Stats
                | Command::Backup
        )
    }
}

/// Creates a Bot instance with custom or default API URL
///
/// # Returns
/// * `Ok(Bot)` - Successfully created bot instance
/// * `Err(anyhow::Error)` - Missing token, invalid URL or HTTP client failure
pub fn create_bot(settings: &Settings) -> anyhow::Result<Bot> {
    let token = settings.bot_token.expose_secret();
    if token.is_empty() {
        anyhow::bail!("TG_API_TOKEN is not set");
    }

    let client = ClientBuilder::new().timeout(BOT_API_TIMEOUT).build()?;
    let bot = Bot::with_client(token, client);

    // Check if local Bot API server is configured
    let bot = match &settings.bot_api_url {
        Some(bot_api_url) => {
            log::info!("Using custom Bot API URL: {}", bot_api_url);
            let url = url::Url::parse(bot_api_url).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };

    Ok(bot)
}

/// Sets up bot commands in Telegram UI
///
/// Admin commands are left out of the menu; they still work for admins.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "register and open the WebApp"),
        BotCommand::new("info", "your credits, premium and accounts"),
        BotCommand::new("redeem", "redeem an invitation code"),
        BotCommand::new("invite", "buy an invitation code"),
        BotCommand::new("codes", "list your invitation codes"),
        BotCommand::new("premium", "buy premium days"),
        BotCommand::new("wheel", "spin the lucky wheel"),
        BotCommand::new("rank", "leaderboards"),
        BotCommand::new("auctions", "active auctions"),
        BotCommand::new("bid", "bid on an auction"),
        BotCommand::new("transfer", "send credits to another user"),
        BotCommand::new("help", "show help"),
    ])
    .await?;

    Ok(())
}
