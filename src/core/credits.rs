//! Credit transfers, admin grants and donations

use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::{AppError, AppResult};
use crate::storage::db::{add_donation, apply_credit_delta, require_user, round_credits, write_transaction};

/// Balances after a transfer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferOutcome {
    pub amount: f64,
    pub sender_balance: f64,
    pub receiver_balance: f64,
}

/// Moves credits between two registered users in one transaction
pub fn transfer(conn: &Connection, from_tg_id: i64, to_tg_id: i64, amount: f64) -> AppResult<TransferOutcome> {
    let amount = round_credits(amount);
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation("Transfer amount must be positive".to_string()));
    }
    if from_tg_id == to_tg_id {
        return Err(AppError::Validation("Cannot transfer credits to yourself".to_string()));
    }

    let tx = write_transaction(conn)?;
    require_user(&tx, to_tg_id)?;
    let sender_balance = apply_credit_delta(&tx, from_tg_id, -amount, &format!("transfer to {}", to_tg_id))?;
    let receiver_balance = apply_credit_delta(&tx, to_tg_id, amount, &format!("transfer from {}", from_tg_id))?;
    tx.commit()?;

    log::info!("Transferred {:.2} credits from {} to {}", amount, from_tg_id, to_tg_id);
    Ok(TransferOutcome {
        amount,
        sender_balance,
        receiver_balance,
    })
}

/// Admin credit adjustment, `amount` may be negative
pub fn grant(conn: &Connection, tg_id: i64, amount: f64, reason: &str) -> AppResult<f64> {
    if !amount.is_finite() || round_credits(amount) == 0.0 {
        return Err(AppError::Validation("Amount must be a non-zero number".to_string()));
    }

    let tx = write_transaction(conn)?;
    let balance = apply_credit_delta(&tx, tg_id, amount, reason)?;
    tx.commit()?;

    log::info!("Adjusted credits of {} by {:.2} ({})", tg_id, amount, reason);
    Ok(balance)
}

/// Donation totals after [`record_donation`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DonationOutcome {
    pub donation_total: f64,
    pub credits_awarded: f64,
    pub balance: f64,
}

/// Records a donation and awards `amount × multiplier` credits
pub fn record_donation(conn: &Connection, tg_id: i64, amount: f64, multiplier: f64) -> AppResult<DonationOutcome> {
    if !amount.is_finite() || amount <= 0.0 {
        return Err(AppError::Validation("Donation amount must be positive".to_string()));
    }
    let credits_awarded = round_credits(amount * multiplier);

    let tx = write_transaction(conn)?;
    let donation_total = add_donation(&tx, tg_id, amount)?;
    let balance = if credits_awarded > 0.0 {
        apply_credit_delta(&tx, tg_id, credits_awarded, &format!("donation {:.2}", amount))?
    } else {
        require_user(&tx, tg_id)?.credits
    };
    tx.commit()?;

    log::info!("Recorded donation {:.2} from {} (+{:.2} credits)", amount, tg_id, credits_awarded);
    Ok(DonationOutcome {
        donation_total,
        credits_awarded,
        balance,
    })
}
