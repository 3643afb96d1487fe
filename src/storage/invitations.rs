//! Invitation code storage

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::core::error::AppResult;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct InvitationCode {
    pub code: String,
    pub owner_tg_id: i64,
    pub created_at: DateTime<Utc>,
    pub used_by: Option<i64>,
    pub used_at: Option<DateTime<Utc>>,
}

impl InvitationCode {
    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }
}

fn code_from_row(row: &Row<'_>) -> rusqlite::Result<InvitationCode> {
    Ok(InvitationCode {
        code: row.get(0)?,
        owner_tg_id: row.get(1)?,
        created_at: row.get(2)?,
        used_by: row.get(3)?,
        used_at: row.get(4)?,
    })
}

pub fn insert_code(conn: &Connection, code: &str, owner_tg_id: i64) -> AppResult<()> {
    conn.execute(
        "INSERT INTO invitation_codes (code, owner_tg_id, created_at) VALUES (?1, ?2, ?3)",
        params![code, owner_tg_id, Utc::now()],
    )?;
    Ok(())
}

pub fn get_code(conn: &Connection, code: &str) -> AppResult<Option<InvitationCode>> {
    Ok(conn
        .query_row(
            "SELECT code, owner_tg_id, created_at, used_by, used_at FROM invitation_codes WHERE code = ?1",
            params![code],
            code_from_row,
        )
        .optional()?)
}

/// Marks the code as used by `tg_id` if it is still unused.
///
/// # Returns
///
/// `true` if this call claimed the code.
pub fn claim_code(conn: &Connection, code: &str, tg_id: i64) -> AppResult<bool> {
    let updated = conn.execute(
        "UPDATE invitation_codes SET used_by = ?2, used_at = ?3 WHERE code = ?1 AND used_by IS NULL",
        params![code, tg_id, Utc::now()],
    )?;
    Ok(updated == 1)
}

/// Undoes a claim made by `tg_id`
pub fn release_code(conn: &Connection, code: &str, tg_id: i64) -> AppResult<()> {
    conn.execute(
        "UPDATE invitation_codes SET used_by = NULL, used_at = NULL WHERE code = ?1 AND used_by = ?2",
        params![code, tg_id],
    )?;
    Ok(())
}

pub fn codes_by_owner(conn: &Connection, owner_tg_id: i64) -> AppResult<Vec<InvitationCode>> {
    let mut stmt = conn.prepare(
        "SELECT code, owner_tg_id, created_at, used_by, used_at FROM invitation_codes
         WHERE owner_tg_id = ?1 ORDER BY created_at DESC",
    )?;
    let codes = stmt
        .query_map(params![owner_tg_id], code_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(codes)
}

pub fn count_unused(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row(
        "SELECT COUNT(*) FROM invitation_codes WHERE used_by IS NULL",
        [],
        |row| row.get(0),
    )?)
}
