use chrono::{DateTime, Duration, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};
use serde::Serialize;
use std::path::Path;

use crate::core::error::{AppError, AppResult};
use crate::storage::migrations::run_migrations;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Telegram user known to the bot.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct User {
    /// Telegram ID пользователя
    pub tg_id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
    /// Current credit balance, never negative
    pub credits: f64,
    /// Total donated amount
    pub donation: f64,
    pub is_premium: bool,
    /// None for users who never bought premium
    pub premium_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl User {
    /// Display name used in rankings and notifications
    pub fn display_name(&self) -> String {
        display_name(self.tg_id, self.username.as_deref(), self.first_name.as_deref())
    }
}

/// `@username`, else first name, else the numeric id
pub fn display_name(tg_id: i64, username: Option<&str>, first_name: Option<&str>) -> String {
    match (username, first_name) {
        (Some(username), _) => format!("@{}", username),
        (None, Some(first_name)) => first_name.to_string(),
        (None, None) => tg_id.to_string(),
    }
}

/// One row of the credit ledger
#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub delta: f64,
    pub balance_after: f64,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

/// Create a new database connection pool
///
/// Creates the parent directory when needed, initializes a pool with up to 10
/// connections (foreign keys on, WAL journal) and applies pending migrations.
///
/// # Example
///
/// ```no_run
/// use pmsbot::storage::create_pool;
///
/// let pool = create_pool(std::path::Path::new("data/data.db"))?;
/// # Ok::<(), pmsbot::core::error::AppError>(())
/// ```
pub fn create_pool(database_path: &Path) -> AppResult<DbPool> {
    if let Some(parent) = database_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            log::info!("Creating data directory: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let is_new = !database_path.exists();
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))?;
        Ok(())
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    if is_new {
        log::info!("Initializing database: {}", database_path.display());
    }
    let mut conn = pool.get()?;
    run_migrations(&mut conn)?;

    Ok(pool)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> AppResult<DbConnection> {
    Ok(pool.get()?)
}

/// Opens a write transaction with `BEGIN IMMEDIATE`.
///
/// The write lock is taken up front, so concurrent writers wait on the busy
/// timeout instead of failing with `SQLITE_BUSY` when a deferred read
/// transaction tries to upgrade.
pub fn write_transaction(conn: &Connection) -> AppResult<Transaction<'_>> {
    Ok(Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?)
}

/// Rounds a credit amount to two decimals
pub fn round_credits(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

const USER_COLUMNS: &str =
    "tg_id, username, first_name, credits, donation, is_premium, premium_expires_at, created_at";

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        tg_id: row.get(0)?,
        username: row.get(1)?,
        first_name: row.get(2)?,
        credits: row.get(3)?,
        donation: row.get(4)?,
        is_premium: row.get::<_, i64>(5)? != 0,
        premium_expires_at: row.get(6)?,
        created_at: row.get(7)?,
    })
}

/// Inserts the user or refreshes their Telegram profile fields.
///
/// # Returns
///
/// `true` if the user was created by this call.
pub fn ensure_user(
    conn: &Connection,
    tg_id: i64,
    username: Option<&str>,
    first_name: Option<&str>,
) -> AppResult<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO users (tg_id, username, first_name, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![tg_id, username, first_name, Utc::now()],
    )?;

    if inserted == 0 {
        conn.execute(
            "UPDATE users SET username = ?2, first_name = COALESCE(?3, first_name) WHERE tg_id = ?1",
            params![tg_id, username, first_name],
        )?;
    }

    Ok(inserted > 0)
}

/// Получает пользователя из базы данных по Telegram ID.
pub fn get_user(conn: &Connection, tg_id: i64) -> AppResult<Option<User>> {
    let user = conn
        .query_row(
            &format!("SELECT {} FROM users WHERE tg_id = ?1", USER_COLUMNS),
            params![tg_id],
            user_from_row,
        )
        .optional()?;
    Ok(user)
}

/// Like [`get_user`] but a missing user is an error
pub fn require_user(conn: &Connection, tg_id: i64) -> AppResult<User> {
    get_user(conn, tg_id)?.ok_or_else(|| AppError::NotFound(format!("User {} is not registered", tg_id)))
}

/// Lists users, newest first
pub fn list_users(conn: &Connection, limit: usize, offset: usize) -> AppResult<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM users ORDER BY created_at DESC, tg_id DESC LIMIT ?1 OFFSET ?2",
        USER_COLUMNS
    ))?;
    let users = stmt
        .query_map(params![limit as i64, offset as i64], user_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(users)
}

pub fn count_users(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
}

/// Applies a credit change and appends it to the ledger.
///
/// Does not open a transaction; callers combining several changes wrap them
/// in one. Fails with [`AppError::InsufficientCredits`] when the balance would
/// become negative, leaving the row untouched.
///
/// # Returns
///
/// The new balance.
pub fn apply_credit_delta(conn: &Connection, tg_id: i64, delta: f64, reason: &str) -> AppResult<f64> {
    let current: f64 = conn
        .query_row("SELECT credits FROM users WHERE tg_id = ?1", params![tg_id], |row| row.get(0))
        .optional()?
        .ok_or_else(|| AppError::NotFound(format!("User {} is not registered", tg_id)))?;

    let delta = round_credits(delta);
    let balance = round_credits(current + delta);
    if balance < 0.0 {
        return Err(AppError::InsufficientCredits {
            needed: -delta,
            available: current,
        });
    }

    conn.execute(
        "UPDATE users SET credits = ?2 WHERE tg_id = ?1",
        params![tg_id, balance],
    )?;
    conn.execute(
        "INSERT INTO credit_ledger (tg_id, delta, balance_after, reason, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![tg_id, delta, balance, reason, Utc::now()],
    )?;

    Ok(balance)
}

/// Transactional wrapper around [`apply_credit_delta`]
pub fn adjust_credits(conn: &Connection, tg_id: i64, delta: f64, reason: &str) -> AppResult<f64> {
    let tx = write_transaction(conn)?;
    let balance = apply_credit_delta(&tx, tg_id, delta, reason)?;
    tx.commit()?;
    Ok(balance)
}

/// Adds to the user's donation total (no transaction)
pub fn add_donation(conn: &Connection, tg_id: i64, amount: f64) -> AppResult<f64> {
    let updated = conn.execute(
        "UPDATE users SET donation = ROUND(donation + ?2, 2) WHERE tg_id = ?1",
        params![tg_id, amount],
    )?;
    if updated == 0 {
        return Err(AppError::NotFound(format!("User {} is not registered", tg_id)));
    }
    Ok(conn.query_row("SELECT donation FROM users WHERE tg_id = ?1", params![tg_id], |row| row.get(0))?)
}

/// Most recent ledger entries of a user
pub fn recent_ledger(conn: &Connection, tg_id: i64, limit: usize) -> AppResult<Vec<LedgerEntry>> {
    let mut stmt = conn.prepare(
        "SELECT id, delta, balance_after, reason, created_at FROM credit_ledger
         WHERE tg_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let entries = stmt
        .query_map(params![tg_id, limit as i64], |row| {
            Ok(LedgerEntry {
                id: row.get(0)?,
                delta: row.get(1)?,
                balance_after: row.get(2)?,
                reason: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(entries)
}

/// Extends premium by `days` starting from the later of `now` and the current expiry.
///
/// # Returns
///
/// The new expiry.
pub fn extend_premium(conn: &Connection, tg_id: i64, days: i64, now: DateTime<Utc>) -> AppResult<DateTime<Utc>> {
    let user = require_user(conn, tg_id)?;
    let base = match user.premium_expires_at {
        Some(expiry) if user.is_premium && expiry > now => expiry,
        _ => now,
    };
    let expires_at = base + Duration::days(days);

    conn.execute(
        "UPDATE users SET is_premium = 1, premium_expires_at = ?2 WHERE tg_id = ?1",
        params![tg_id, expires_at],
    )?;
    Ok(expires_at)
}

/// Clears premium for users whose expiry passed.
///
/// # Returns
///
/// Telegram ids of the users whose premium lapsed.
pub fn expire_premium(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<i64>> {
    let tx = write_transaction(conn)?;
    let ids: Vec<i64> = tx
        .prepare(
            "SELECT tg_id FROM users WHERE is_premium = 1 AND premium_expires_at IS NOT NULL AND premium_expires_at <= ?1",
        )?
        .query_map(params![now], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    for tg_id in &ids {
        tx.execute("UPDATE users SET is_premium = 0 WHERE tg_id = ?1", params![tg_id])?;
    }
    tx.commit()?;
    Ok(ids)
}

pub fn count_premium_users(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM users WHERE is_premium = 1", [], |row| row.get(0))?)
}

pub fn total_credits(conn: &Connection) -> AppResult<f64> {
    Ok(conn.query_row("SELECT COALESCE(SUM(credits), 0) FROM users", [], |row| row.get(0))?)
}

/// Opens a migrated database in a temporary directory for tests
#[cfg(test)]
pub(crate) fn test_pool() -> (tempfile::TempDir, DbPool) {
    let dir = tempfile::tempdir().unwrap();
    let pool = create_pool(&dir.path().join("data.db")).unwrap();
    (dir, pool)
}
