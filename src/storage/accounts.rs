//! Media server accounts bound to Telegram users

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::core::error::AppResult;

/// A media server account ("media record") owned by a Telegram user
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct MediaAccount {
    pub id: i64,
    pub tg_id: i64,
    /// Media server kind, e.g. `emby`
    pub server: String,
    /// User id on the media server
    pub server_user_id: String,
    pub username: String,
    pub is_active: bool,
    /// Total minutes watched as last reported by the server
    pub watched_minutes: i64,
    /// Minutes already converted to credits
    pub credited_minutes: i64,
    pub created_at: DateTime<Utc>,
}

const ACCOUNT_COLUMNS: &str =
    "id, tg_id, server, server_user_id, username, is_active, watched_minutes, credited_minutes, created_at";

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<MediaAccount> {
    Ok(MediaAccount {
        id: row.get(0)?,
        tg_id: row.get(1)?,
        server: row.get(2)?,
        server_user_id: row.get(3)?,
        username: row.get(4)?,
        is_active: row.get::<_, i64>(5)? != 0,
        watched_minutes: row.get(6)?,
        credited_minutes: row.get(7)?,
        created_at: row.get(8)?,
    })
}

pub fn insert_account(
    conn: &Connection,
    tg_id: i64,
    server: &str,
    server_user_id: &str,
    username: &str,
) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO media_accounts (tg_id, server, server_user_id, username, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
        params![tg_id, server, server_user_id, username, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn accounts_for_user(conn: &Connection, tg_id: i64) -> AppResult<Vec<MediaAccount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM media_accounts WHERE tg_id = ?1 ORDER BY id",
        ACCOUNT_COLUMNS
    ))?;
    let accounts = stmt
        .query_map(params![tg_id], account_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

pub fn account_for_user_on(conn: &Connection, tg_id: i64, server: &str) -> AppResult<Option<MediaAccount>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM media_accounts WHERE tg_id = ?1 AND server = ?2",
                ACCOUNT_COLUMNS
            ),
            params![tg_id, server],
            account_from_row,
        )
        .optional()?)
}

/// Case-insensitive lookup by media server username
pub fn find_by_username(conn: &Connection, server: &str, username: &str) -> AppResult<Option<MediaAccount>> {
    Ok(conn
        .query_row(
            &format!(
                "SELECT {} FROM media_accounts WHERE server = ?1 AND username = ?2",
                ACCOUNT_COLUMNS
            ),
            params![server, username],
            account_from_row,
        )
        .optional()?)
}

pub fn list_active_accounts(conn: &Connection, server: &str) -> AppResult<Vec<MediaAccount>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM media_accounts WHERE server = ?1 AND is_active = 1 ORDER BY id",
        ACCOUNT_COLUMNS
    ))?;
    let accounts = stmt
        .query_map(params![server], account_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(accounts)
}

pub fn set_active(conn: &Connection, account_id: i64, active: bool) -> AppResult<()> {
    conn.execute(
        "UPDATE media_accounts SET is_active = ?2 WHERE id = ?1",
        params![account_id, active as i64],
    )?;
    Ok(())
}

/// Stores the watched total reported by the server. Totals never decrease.
pub fn set_watched_minutes(conn: &Connection, account_id: i64, minutes: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE media_accounts SET watched_minutes = MAX(watched_minutes, ?2) WHERE id = ?1",
        params![account_id, minutes],
    )?;
    Ok(())
}

pub fn mark_credited(conn: &Connection, account_id: i64, minutes: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE media_accounts SET credited_minutes = MIN(watched_minutes, ?2) WHERE id = ?1",
        params![account_id, minutes],
    )?;
    Ok(())
}

pub fn count_accounts(conn: &Connection) -> AppResult<(i64, i64)> {
    Ok(conn.query_row(
        "SELECT COUNT(*), COALESCE(SUM(is_active), 0) FROM media_accounts",
        [],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )?)
}
