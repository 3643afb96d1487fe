//! Lucky wheel: paid spins with weighted prizes

use chrono::{DateTime, Utc};
use rand::distr::weighted::WeightedIndex;
use rand::distr::Distribution;
use rand::Rng;
use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::{AppError, AppResult};
use crate::core::invitation;
use crate::storage::db::{apply_credit_delta, extend_premium, round_credits, write_transaction};
use crate::storage::wheel::insert_draw;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum PrizeKind {
    Nothing,
    Credits(f64),
    PremiumDays(i64),
    InvitationCode,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prize {
    pub name: String,
    pub kind: PrizeKind,
    /// Relative chance, zero disables the prize
    pub weight: u32,
}

impl Prize {
    fn new(name: &str, kind: PrizeKind, weight: u32) -> Self {
        Self {
            name: name.to_string(),
            kind,
            weight,
        }
    }
}

/// Built-in prize table
pub fn default_prizes() -> Vec<Prize> {
    vec![
        Prize::new("Better luck next time", PrizeKind::Nothing, 30),
        Prize::new("10 credits", PrizeKind::Credits(10.0), 25),
        Prize::new("30 credits", PrizeKind::Credits(30.0), 15),
        Prize::new("60 credits", PrizeKind::Credits(60.0), 8),
        Prize::new("100 credits", PrizeKind::Credits(100.0), 3),
        Prize::new("1 premium day", PrizeKind::PremiumDays(1), 12),
        Prize::new("3 premium days", PrizeKind::PremiumDays(3), 5),
        Prize::new("Invitation code", PrizeKind::InvitationCode, 2),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpinOutcome {
    pub prize: Prize,
    /// Credit change including the spin cost
    pub credits_delta: f64,
    pub balance: f64,
    pub invitation_code: Option<String>,
    pub premium_expires_at: Option<DateTime<Utc>>,
}

/// Charges `cost`, draws a prize by weight and applies it in one transaction
pub fn spin<R: Rng + ?Sized>(
    conn: &Connection,
    tg_id: i64,
    cost: f64,
    prizes: &[Prize],
    rng: &mut R,
) -> AppResult<SpinOutcome> {
    let index = WeightedIndex::new(prizes.iter().map(|p| p.weight))
        .map_err(|e| AppError::Config(format!("Invalid lucky wheel prize table: {}", e)))?;
    let prize = prizes[index.sample(rng)].clone();

    let tx = write_transaction(conn)?;
    let mut balance = apply_credit_delta(&tx, tg_id, -cost, "lucky wheel spin")?;
    let mut credits_delta = -cost;
    let mut invitation_code = None;
    let mut premium_expires_at = None;

    match prize.kind {
        PrizeKind::Nothing => {}
        PrizeKind::Credits(amount) => {
            balance = apply_credit_delta(&tx, tg_id, amount, &format!("lucky wheel: {}", prize.name))?;
            credits_delta += amount;
        }
        PrizeKind::PremiumDays(days) => {
            premium_expires_at = Some(extend_premium(&tx, tg_id, days, Utc::now())?);
        }
        PrizeKind::InvitationCode => {
            invitation_code = Some(invitation::insert_unique_code(&tx, tg_id, rng)?);
        }
    }

    let credits_delta = round_credits(credits_delta);
    insert_draw(&tx, tg_id, &prize.name, credits_delta)?;
    tx.commit()?;

    log::info!("User {} spun the wheel and won '{}'", tg_id, prize.name);
    Ok(SpinOutcome {
        prize,
        credits_delta,
        balance,
        invitation_code,
        premium_expires_at,
    })
}
