use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "pmsbot")]
#[command(author, version, about = "Telegram bot and WebApp for media server access, credits and invitations", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Commands {
    /// Run the bot, the scheduler and the WebApp server (default)
    Run,

    /// Run only the bot and the scheduler
    RunBot,

    /// Run only the WebApp server
    RunWeb {
        /// Override WEBAPP_PORT
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Create the database and apply migrations, then exit
    InitDb,

    /// Write a database backup, then exit
    Backup,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
