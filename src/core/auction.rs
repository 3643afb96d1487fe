//! Credit auctions with escrowed bids.
//!
//! Only the current highest bid is held: placing a bid debits the bidder and
//! refunds the previous top bidder in the same transaction. Settling keeps the
//! winning bid spent, cancelling refunds it.

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::{AppError, AppResult};
use crate::storage::auctions::{self, Auction, AuctionStatus, Bid, NewAuction};
use crate::storage::db::{apply_credit_delta, round_credits, write_transaction};

/// Result of a successful bid
#[derive(Debug, Clone, Serialize)]
pub struct BidOutcome {
    pub auction: Auction,
    pub amount: f64,
    pub balance: f64,
    /// Bidder who was outbid and refunded, with the refunded amount
    pub outbid: Option<(i64, f64)>,
}

/// An auction closed by [`settle_due`]
#[derive(Debug, Clone, Serialize)]
pub struct SettledAuction {
    pub auction: Auction,
    pub winning_bid: Option<Bid>,
}

/// Smallest amount the next bid must reach
pub fn minimum_bid(auction: &Auction, top: Option<&Bid>) -> f64 {
    match top {
        Some(bid) => round_credits(bid.amount + auction.min_increment),
        None => auction.starting_price,
    }
}

pub fn create(conn: &Connection, new: &NewAuction<'_>, now: DateTime<Utc>) -> AppResult<Auction> {
    if new.title.trim().is_empty() {
        return Err(AppError::Validation("Auction title must not be empty".to_string()));
    }
    if !new.starting_price.is_finite() || new.starting_price < 0.0 {
        return Err(AppError::Validation("Starting price must not be negative".to_string()));
    }
    if !new.min_increment.is_finite() || new.min_increment <= 0.0 {
        return Err(AppError::Validation("Minimum increment must be positive".to_string()));
    }
    if new.ends_at <= now {
        return Err(AppError::Validation("Auction must end in the future".to_string()));
    }

    let new = NewAuction {
        starting_price: round_credits(new.starting_price),
        min_increment: round_credits(new.min_increment),
        ..new.clone()
    };
    let id = auctions::insert_auction(conn, &new)?;
    log::info!("Auction #{} '{}' created by {}", id, new.title, new.created_by);
    auctions::require_auction(conn, id)
}

pub fn place_bid(
    conn: &Connection,
    auction_id: i64,
    tg_id: i64,
    amount: f64,
    now: DateTime<Utc>,
) -> AppResult<BidOutcome> {
    let amount = round_credits(amount);
    let tx = write_transaction(conn)?;

    let auction = auctions::require_auction(&tx, auction_id)?;
    if auction.status != AuctionStatus::Active || auction.ends_at <= now {
        return Err(AppError::Conflict(format!("Auction #{} is closed", auction_id)));
    }

    let top = auctions::top_bid(&tx, auction_id)?;
    let minimum = minimum_bid(&auction, top.as_ref());
    if !amount.is_finite() || amount < minimum || amount <= 0.0 {
        return Err(AppError::Validation(format!("Bid must be at least {:.2}", minimum.max(0.01))));
    }

    // Refund first so a bidder can raise their own bid with escrowed credits
    let outbid = match top {
        Some(previous) => {
            apply_credit_delta(
                &tx,
                previous.tg_id,
                previous.amount,
                &format!("auction #{} outbid refund", auction_id),
            )?;
            Some((previous.tg_id, previous.amount))
        }
        None => None,
    };
    let balance = apply_credit_delta(&tx, tg_id, -amount, &format!("auction #{} bid", auction_id))?;
    auctions::insert_bid(&tx, auction_id, tg_id, amount)?;
    let auction = auctions::require_auction(&tx, auction_id)?;
    tx.commit()?;

    log::info!("User {} bid {:.2} on auction #{}", tg_id, amount, auction_id);
    Ok(BidOutcome {
        auction,
        amount,
        balance,
        outbid: outbid.filter(|(previous, _)| *previous != tg_id),
    })
}

/// Cancels an active auction and refunds the top bidder
pub fn cancel(conn: &Connection, auction_id: i64) -> AppResult<Auction> {
    let tx = write_transaction(conn)?;
    let auction = auctions::require_auction(&tx, auction_id)?;
    if auction.status != AuctionStatus::Active {
        return Err(AppError::Conflict(format!("Auction #{} is already closed", auction_id)));
    }

    if let Some(top) = auctions::top_bid(&tx, auction_id)? {
        apply_credit_delta(
            &tx,
            top.tg_id,
            top.amount,
            &format!("auction #{} cancelled refund", auction_id),
        )?;
    }
    auctions::finish_auction(&tx, auction_id, AuctionStatus::Cancelled, None)?;
    let auction = auctions::require_auction(&tx, auction_id)?;
    tx.commit()?;

    log::info!("Auction #{} cancelled", auction_id);
    Ok(auction)
}

/// Settles every active auction whose end time passed
pub fn settle_due(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<SettledAuction>> {
    let mut settled = Vec::new();

    for due in auctions::list_due(conn, now)? {
        let tx = write_transaction(conn)?;
        let winning_bid = auctions::top_bid(&tx, due.id)?;
        let winner = winning_bid.as_ref().map(|bid| bid.tg_id);
        if !auctions::finish_auction(&tx, due.id, AuctionStatus::Settled, winner)? {
            continue;
        }
        let auction = auctions::require_auction(&tx, due.id)?;
        tx.commit()?;

        match &winning_bid {
            Some(bid) => log::info!("Auction #{} won by {} for {:.2}", due.id, bid.tg_id, bid.amount),
            None => log::info!("Auction #{} ended without bids", due.id),
        }
        settled.push(SettledAuction { auction, winning_bid });
    }

    Ok(settled)
}
