//! Lucky wheel draw history

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::core::error::AppResult;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WheelDraw {
    pub id: i64,
    pub tg_id: i64,
    pub prize: String,
    /// Net credit change of the draw including its cost
    pub credits_delta: f64,
    pub created_at: DateTime<Utc>,
}

pub fn insert_draw(conn: &Connection, tg_id: i64, prize: &str, credits_delta: f64) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO wheel_draws (tg_id, prize, credits_delta, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![tg_id, prize, credits_delta, Utc::now()],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn draws_for_user(conn: &Connection, tg_id: i64, limit: usize) -> AppResult<Vec<WheelDraw>> {
    let mut stmt = conn.prepare(
        "SELECT id, tg_id, prize, credits_delta, created_at FROM wheel_draws
         WHERE tg_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let draws = stmt
        .query_map(params![tg_id, limit as i64], |row| {
            Ok(WheelDraw {
                id: row.get(0)?,
                tg_id: row.get(1)?,
                prize: row.get(2)?,
                credits_delta: row.get(3)?,
                created_at: row.get(4)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(draws)
}
