//! Runtime configuration
//!
//! Values come from `<DATA_PATH>/.env` (loaded with dotenvy, optional) and the
//! process environment. Everything is parsed once at startup into [`Settings`]
//! and passed around in an `Arc`.

use rand::RngCore;
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::core::error::{AppError, AppResult};

/// Default data directory (database, log file, backups, `.env`)
pub const DEFAULT_DATA_PATH: &str = "data";

/// Default HTTP port of the WebApp backend
pub const DEFAULT_WEBAPP_PORT: u16 = 5000;

/// Default Redis connection
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379/0";

/// Session cookie lifetime (one day)
pub const SESSION_MAX_AGE_SECS: i64 = 86_400;

/// Telegram init data older than this is rejected
pub const INIT_DATA_MAX_AGE_SECS: i64 = 86_400;

/// Economy parameters (credit prices and rates)
#[derive(Debug, Clone, PartialEq)]
pub struct EconomySettings {
    /// Price of one invitation code for non-admins
    pub invitation_credits: f64,
    /// Price of one premium day
    pub premium_daily_credits: f64,
    /// Price of one lucky wheel spin
    pub wheel_cost_credits: f64,
    /// Credits earned per hour watched on the media server
    pub credits_per_watched_hour: f64,
    /// Credits granted per donated currency unit
    pub donation_credits_multiplier: f64,
}

impl Default for EconomySettings {
    fn default() -> Self {
        Self {
            invitation_credits: 288.0,
            premium_daily_credits: 15.0,
            wheel_cost_credits: 30.0,
            credits_per_watched_hour: 1.0,
            donation_credits_multiplier: 2.0,
        }
    }
}

/// Periodic job intervals
#[derive(Debug, Clone, PartialEq)]
pub struct JobSettings {
    pub auction_check_interval: Duration,
    pub premium_check_interval: Duration,
    pub watch_sync_interval: Duration,
    pub backup_interval: Duration,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            auction_check_interval: Duration::from_secs(60),
            premium_check_interval: Duration::from_secs(60 * 60),
            watch_sync_interval: Duration::from_secs(6 * 60 * 60),
            backup_interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Emby connection parameters
#[derive(Debug)]
pub struct EmbySettings {
    pub url: String,
    pub api_token: SecretString,
}

/// Fully parsed application settings
#[derive(Debug)]
pub struct Settings {
    pub data_path: PathBuf,
    pub bot_token: SecretString,
    pub bot_api_url: Option<String>,
    pub admin_chat_ids: Vec<i64>,
    pub webapp_host: String,
    pub webapp_port: u16,
    pub webapp_url: Option<String>,
    pub webapp_static_dir: PathBuf,
    pub webapp_title: Option<String>,
    pub session_secret: SecretString,
    pub redis_url: String,
    pub cache_ttl: Duration,
    pub emby: Option<EmbySettings>,
    pub economy: EconomySettings,
    pub jobs: JobSettings,
    pub log_level: String,
}

impl Settings {
    /// Load `<DATA_PATH>/.env` and build settings from the process environment.
    pub fn load() -> AppResult<Self> {
        let data_path = std::env::var("DATA_PATH").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());
        let env_file = Path::new(&data_path).join(".env");
        match dotenvy::from_path(&env_file) {
            Ok(()) => log::debug!("Loaded environment from {}", env_file.display()),
            Err(e) if e.not_found() => log::debug!("No env file at {}", env_file.display()),
            Err(e) => return Err(AppError::Config(format!("failed to read {}: {}", env_file.display(), e))),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup.
    ///
    /// Empty values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> AppResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let first = |keys: &[&str]| keys.iter().find_map(|k| get(*k));

        let data_path = PathBuf::from(get("DATA_PATH").unwrap_or_else(|| DEFAULT_DATA_PATH.to_string()));

        let bot_token = first(&["TG_API_TOKEN", "BOT_TOKEN", "TELOXIDE_TOKEN"]).unwrap_or_default();

        let admin_chat_ids = match get("ADMIN_CHAT_ID") {
            Some(raw) => parse_id_list(&raw)?,
            None => Vec::new(),
        };

        let session_secret = first(&["WEBAPP_SESSION_SECRET_KEY", "SESSION_SECRET_KEY"]).unwrap_or_else(|| {
            let mut bytes = [0u8; 32];
            rand::rng().fill_bytes(&mut bytes);
            hex::encode(bytes)
        });

        let emby = match (get("EMBY_URL"), get("EMBY_API_TOKEN")) {
            (Some(url), Some(token)) => Some(EmbySettings {
                url: url.trim_end_matches('/').to_string(),
                api_token: SecretString::from(token),
            }),
            _ => None,
        };

        let defaults = EconomySettings::default();
        let economy = EconomySettings {
            invitation_credits: parse_or(&get, "INVITATION_CREDITS", defaults.invitation_credits)?,
            premium_daily_credits: parse_or(&get, "PREMIUM_DAILY_CREDITS", defaults.premium_daily_credits)?,
            wheel_cost_credits: parse_or(&get, "WHEEL_COST_CREDITS", defaults.wheel_cost_credits)?,
            credits_per_watched_hour: parse_or(&get, "CREDITS_PER_WATCHED_HOUR", defaults.credits_per_watched_hour)?,
            donation_credits_multiplier: parse_or(
                &get,
                "DONATION_CREDITS_MULTIPLIER",
                defaults.donation_credits_multiplier,
            )?,
        };

        let job_defaults = JobSettings::default();
        let secs = |key: &str, default: Duration| -> AppResult<Duration> {
            parse_or(&get, key, default.as_secs()).map(Duration::from_secs)
        };
        let jobs = JobSettings {
            auction_check_interval: secs("AUCTION_CHECK_INTERVAL_SECS", job_defaults.auction_check_interval)?,
            premium_check_interval: secs("PREMIUM_CHECK_INTERVAL_SECS", job_defaults.premium_check_interval)?,
            watch_sync_interval: secs("WATCH_SYNC_INTERVAL_SECS", job_defaults.watch_sync_interval)?,
            backup_interval: secs("BACKUP_INTERVAL_SECS", job_defaults.backup_interval)?,
        };

        Ok(Self {
            bot_token: SecretString::from(bot_token),
            bot_api_url: get("BOT_API_URL"),
            admin_chat_ids,
            webapp_host: get("WEBAPP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            webapp_port: parse_or(&get, "WEBAPP_PORT", DEFAULT_WEBAPP_PORT)?,
            webapp_url: get("WEBAPP_URL"),
            webapp_static_dir: PathBuf::from(
                get("WEBAPP_STATIC_DIR").unwrap_or_else(|| "webapp-frontend/dist".to_string()),
            ),
            webapp_title: first(&["WEBAPP_TITLE", "SITE_NAME"])
                .map(|t| clean_title(&t))
                .filter(|t| !t.is_empty()),
            session_secret: SecretString::from(session_secret),
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            cache_ttl: Duration::from_secs(parse_or(&get, "CACHE_TTL_SECS", 300u64)?),
            emby,
            economy,
            jobs,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            data_path,
        })
    }

    /// SQLite database file
    pub fn db_path(&self) -> PathBuf {
        self.data_path.join("data.db")
    }

    /// Log file written next to the database
    pub fn log_file_path(&self) -> PathBuf {
        self.data_path.join("pmsbot.log")
    }

    /// Directory for database backups
    pub fn backup_dir(&self) -> PathBuf {
        self.data_path.join("backups")
    }

    /// Whether the Telegram id belongs to a configured admin
    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.admin_chat_ids.contains(&tg_id)
    }

    /// Logs the effective configuration at startup (secrets excluded)
    pub fn log_summary(&self) {
        log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        log::info!("Configuration");
        log::info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        log::info!("  data path:      {}", self.data_path.display());
        log::info!("  database:       {}", self.db_path().display());
        log::info!("  admins:         {}", self.admin_chat_ids.len());
        log::info!("  webapp:         {}:{}", self.webapp_host, self.webapp_port);
        log::info!("  webapp url:     {}", self.webapp_url.as_deref().unwrap_or("<unset>"));
        log::info!("  static dir:     {}", self.webapp_static_dir.display());
        log::info!("  redis:          {}", self.redis_url);
        match &self.emby {
            Some(emby) => log::info!("  emby:           {}", emby.url),
            None => log::warn!("  emby:           <not configured>"),
        }
    }
}

/// Strips surrounding whitespace and quotes from a title value
fn clean_title(raw: &str) -> String {
    raw.trim().trim_matches('"').trim_matches('\'').trim().to_string()
}

fn parse_id_list(raw: &str) -> AppResult<Vec<i64>> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| AppError::Config(format!("ADMIN_CHAT_ID contains an invalid id: '{}'", s)))
        })
        .collect()
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> AppResult<T>
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{} has an invalid value: '{}'", key, raw))),
        None => Ok(default),
    }
}
