//! Auction and bid storage

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use strum::{AsRefStr, EnumString};

use crate::core::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AuctionStatus {
    Active,
    Settled,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Auction {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub starting_price: f64,
    /// Highest bid so far, equals the starting price while there are no bids
    pub current_price: f64,
    pub min_increment: f64,
    pub ends_at: DateTime<Utc>,
    pub created_by: i64,
    pub status: AuctionStatus,
    pub winner_tg_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Bid {
    pub id: i64,
    pub auction_id: i64,
    pub tg_id: i64,
    pub amount: f64,
    pub created_at: DateTime<Utc>,
}

/// Fields of a new auction
#[derive(Debug, Clone)]
pub struct NewAuction<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub starting_price: f64,
    pub min_increment: f64,
    pub ends_at: DateTime<Utc>,
    pub created_by: i64,
}

const AUCTION_COLUMNS: &str = "id, title, description, starting_price, current_price, min_increment, ends_at, \
                               created_by, status, winner_tg_id, created_at";

fn auction_from_row(row: &Row<'_>) -> rusqlite::Result<Auction> {
    let status: String = row.get(8)?;
    let status = status.parse::<AuctionStatus>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(8, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Auction {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        starting_price: row.get(3)?,
        current_price: row.get(4)?,
        min_increment: row.get(5)?,
        ends_at: row.get(6)?,
        created_by: row.get(7)?,
        status,
        winner_tg_id: row.get(9)?,
        created_at: row.get(10)?,
    })
}

fn bid_from_row(row: &Row<'_>) -> rusqlite::Result<Bid> {
    Ok(Bid {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        tg_id: row.get(2)?,
        amount: row.get(3)?,
        created_at: row.get(4)?,
    })
}

pub fn insert_auction(conn: &Connection, auction: &NewAuction<'_>) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO auctions (title, description, starting_price, current_price, min_increment, ends_at, created_by, status, created_at)
         VALUES (?1, ?2, ?3, ?3, ?4, ?5, ?6, 'active', ?7)",
        params![
            auction.title,
            auction.description,
            auction.starting_price,
            auction.min_increment,
            auction.ends_at,
            auction.created_by,
            Utc::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn get_auction(conn: &Connection, id: i64) -> AppResult<Option<Auction>> {
    Ok(conn
        .query_row(
            &format!("SELECT {} FROM auctions WHERE id = ?1", AUCTION_COLUMNS),
            params![id],
            auction_from_row,
        )
        .optional()?)
}

pub fn require_auction(conn: &Connection, id: i64) -> AppResult<Auction> {
    get_auction(conn, id)?.ok_or_else(|| AppError::NotFound(format!("Auction {} does not exist", id)))
}

/// Active auctions ordered by closing time
pub fn list_active(conn: &Connection) -> AppResult<Vec<Auction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM auctions WHERE status = 'active' ORDER BY ends_at, id",
        AUCTION_COLUMNS
    ))?;
    let auctions = stmt
        .query_map([], auction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(auctions)
}

/// Active auctions whose end time has passed
pub fn list_due(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<Auction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM auctions WHERE status = 'active' AND ends_at <= ?1 ORDER BY ends_at, id",
        AUCTION_COLUMNS
    ))?;
    let auctions = stmt
        .query_map(params![now], auction_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(auctions)
}

/// Highest bid of an auction (latest wins ties)
pub fn top_bid(conn: &Connection, auction_id: i64) -> AppResult<Option<Bid>> {
    Ok(conn
        .query_row(
            "SELECT id, auction_id, tg_id, amount, created_at FROM bids
             WHERE auction_id = ?1 ORDER BY amount DESC, id DESC LIMIT 1",
            params![auction_id],
            bid_from_row,
        )
        .optional()?)
}

pub fn bids_for(conn: &Connection, auction_id: i64, limit: usize) -> AppResult<Vec<Bid>> {
    let mut stmt = conn.prepare(
        "SELECT id, auction_id, tg_id, amount, created_at FROM bids
         WHERE auction_id = ?1 ORDER BY amount DESC, id DESC LIMIT ?2",
    )?;
    let bids = stmt
        .query_map(params![auction_id, limit as i64], bid_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(bids)
}

/// Records a bid and raises the auction's current price
pub fn insert_bid(conn: &Connection, auction_id: i64, tg_id: i64, amount: f64) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO bids (auction_id, tg_id, amount, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![auction_id, tg_id, amount, Utc::now()],
    )?;
    let bid_id = conn.last_insert_rowid();
    conn.execute(
        "UPDATE auctions SET current_price = ?2 WHERE id = ?1",
        params![auction_id, amount],
    )?;
    Ok(bid_id)
}

/// Moves an active auction to a final status.
///
/// # Returns
///
/// `false` if the auction was no longer active.
pub fn finish_auction(
    conn: &Connection,
    auction_id: i64,
    status: AuctionStatus,
    winner_tg_id: Option<i64>,
) -> AppResult<bool> {
    let updated = conn.execute(
        "UPDATE auctions SET status = ?2, winner_tg_id = ?3 WHERE id = ?1 AND status = 'active'",
        params![auction_id, status.as_ref(), winner_tg_id],
    )?;
    Ok(updated == 1)
}

pub fn count_active(conn: &Connection) -> AppResult<i64> {
    Ok(conn.query_row("SELECT COUNT(*) FROM auctions WHERE status = 'active'", [], |row| {
        row.get(0)
    })?)
}
