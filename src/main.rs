use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::signal;
use tokio::time::sleep;

use pmsbot::cli::{Cli, Commands};
use pmsbot::core::{init_logger, AppContext, Settings};
use pmsbot::scheduler::{backup_database, start_scheduler};
use pmsbot::storage::create_pool;
use pmsbot::telegram::notifications::{notification_channel, notify_admins, run_notifier, NotificationSender};
use pmsbot::telegram::{create_bot, schema, setup_bot_commands, HandlerDeps};
use pmsbot::webapp::{run_webapp_server, WebAppState};

/// Up to 5 minutes (60 * 5s) waiting for a local Bot API server to come up
const STARTUP_MAX_RETRIES: u32 = 60;

/// Main entry point
///
/// Parses CLI arguments and dispatches to the selected mode.
///
/// # Errors
/// Returns an error if initialization fails (configuration, logging, database, bot creation).
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse_args();

    let mut settings = Settings::load()?;
    init_logger(&settings.log_level, &settings.log_file_path())?;

    if let Some(Commands::RunWeb { port: Some(port) }) = &cli.command {
        settings.webapp_port = *port;
    }
    settings.log_summary();
    let settings = Arc::new(settings);

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            log::info!("Running bot, scheduler and WebApp");
            run(settings, true).await
        }
        Commands::RunBot => {
            log::info!("Running bot and scheduler");
            run(settings, false).await
        }
        Commands::RunWeb { .. } => {
            log::info!("Running WebApp only");
            run_web_only(settings).await
        }
        Commands::InitDb => {
            create_pool(&settings.db_path())?;
            log::info!("Database ready at {}", settings.db_path().display());
            Ok(())
        }
        Commands::Backup => {
            let ctx = AppContext::from_settings(settings).await?;
            let path = backup_database(&ctx)?;
            println!("{}", path.display());
            Ok(())
        }
    }
}

/// Waits for `getMe` to succeed, retrying while the Bot API is still starting
async fn wait_for_bot_api(bot: &Bot) -> Result<teloxide::types::Me> {
    let mut startup_retry = 0;
    loop {
        match bot.get_me().await {
            Ok(info) => return Ok(info),
            Err(e) => {
                let err_str = e.to_string();
                let is_retryable = err_str.contains("restart")
                    || err_str.contains("network")
                    || err_str.contains("connection")
                    || err_str.contains("timed out")
                    || err_str.contains("Connection refused");

                startup_retry += 1;
                if startup_retry >= STARTUP_MAX_RETRIES || !is_retryable {
                    return Err(anyhow::anyhow!(
                        "Failed to connect to Bot API after {} retries: {}",
                        startup_retry,
                        e
                    ));
                }

                log::warn!(
                    "Bot API not ready (attempt {}/{}): {}. Retrying in 5 seconds...",
                    startup_retry,
                    STARTUP_MAX_RETRIES,
                    err_str
                );
                sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

fn spawn_webapp(ctx: AppContext, notifier: Option<NotificationSender>) {
    let state = Arc::new(WebAppState::new(ctx, notifier));
    tokio::spawn(async move {
        if let Err(e) = run_webapp_server(state).await {
            log::error!("WebApp server stopped: {}", e);
        }
    });
}

/// Runs the bot with the scheduler, and the WebApp when `with_webapp` is set
async fn run(settings: Arc<Settings>, with_webapp: bool) -> Result<()> {
    let started = std::time::Instant::now();
    let bot = create_bot(&settings)?;
    let ctx = AppContext::from_settings(settings.clone()).await?;

    let bot_info = wait_for_bot_api(&bot).await?;
    log::info!("Bot username: {:?}, Bot ID: {}", bot_info.username, bot_info.id);

    if let Err(e) = setup_bot_commands(&bot).await {
        log::warn!("Failed to register bot commands: {}", e);
    }

    let (notifier, receiver) = notification_channel();
    tokio::spawn(run_notifier(bot.clone(), settings.admin_chat_ids.clone(), receiver));

    let _jobs = start_scheduler(ctx.clone(), notifier.clone());
    if with_webapp {
        spawn_webapp(ctx.clone(), Some(notifier.clone()));
    }

    notify_admins(&bot, &settings.admin_chat_ids, "🚀 Bot started").await;

    log::info!("================================================");
    log::info!("🎉 Initialization complete in {:.2}s", started.elapsed().as_secs_f64());
    log::info!("📡 Ready to receive updates!");
    log::info!("================================================");

    let deps = HandlerDeps::new(ctx, notifier);
    Dispatcher::builder(bot, schema(deps))
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    log::info!("Dispatcher shutdown gracefully");
    Ok(())
}

/// WebApp without the bot: no notifications are delivered
async fn run_web_only(settings: Arc<Settings>) -> Result<()> {
    let ctx = AppContext::from_settings(settings).await?;
    let state = Arc::new(WebAppState::new(ctx, None));

    tokio::select! {
        result = run_webapp_server(state) => result,
        _ = signal::ctrl_c() => {
            log::info!("Shutting down gracefully...");
            Ok(())
        }
    }
}
