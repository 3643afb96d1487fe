//! Premium membership bought with credits

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::core::error::{AppError, AppResult};
use crate::storage::db::{apply_credit_delta, expire_premium, extend_premium, round_credits, write_transaction};

pub const MAX_DAYS: i64 = 365;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PremiumPurchase {
    pub days: i64,
    pub cost: f64,
    pub balance: f64,
    pub expires_at: DateTime<Utc>,
}

/// Charges `days × daily_price` and extends premium from the later of now and the current expiry
pub fn purchase(
    conn: &Connection,
    tg_id: i64,
    days: i64,
    daily_price: f64,
    now: DateTime<Utc>,
) -> AppResult<PremiumPurchase> {
    if !(1..=MAX_DAYS).contains(&days) {
        return Err(AppError::Validation(format!("Days must be between 1 and {}", MAX_DAYS)));
    }
    let cost = round_credits(days as f64 * daily_price);

    let tx = write_transaction(conn)?;
    let balance = apply_credit_delta(&tx, tg_id, -cost, &format!("premium {} days", days))?;
    let expires_at = extend_premium(&tx, tg_id, days, now)?;
    tx.commit()?;

    log::info!("User {} bought {} premium days until {}", tg_id, days, expires_at);
    Ok(PremiumPurchase {
        days,
        cost,
        balance,
        expires_at,
    })
}

/// Ends premium for everyone whose expiry passed, returning their ids
pub fn expire_due(conn: &Connection, now: DateTime<Utc>) -> AppResult<Vec<i64>> {
    let expired = expire_premium(conn, now)?;
    if !expired.is_empty() {
        log::info!("Premium expired for {} users", expired.len());
    }
    Ok(expired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{adjust_credits, ensure_user, get_connection, get_user, test_pool};
    use chrono::Duration;

    #[test]
    fn test_purchase_extends_from_current_expiry() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        adjust_credits(&conn, 1, 100.0, "seed").unwrap();
        let now = Utc::now();

        let first = purchase(&conn, 1, 2, 15.0, now).unwrap();
        assert_eq!(first.cost, 30.0);
        assert_eq!(first.expires_at, now + Duration::days(2));

        let second = purchase(&conn, 1, 3, 15.0, now + Duration::days(1)).unwrap();
        assert_eq!(second.expires_at, now + Duration::days(5));
        assert_eq!(second.balance, 25.0);

        let user = get_user(&conn, 1).unwrap().unwrap();
        assert!(user.is_premium);
    }

    #[test]
    fn test_purchase_rejects_bad_days_and_poor_users() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        adjust_credits(&conn, 1, 10.0, "seed").unwrap();
        let now = Utc::now();

        assert!(matches!(purchase(&conn, 1, 0, 15.0, now), Err(AppError::Validation(_))));
        assert!(matches!(purchase(&conn, 1, 366, 15.0, now), Err(AppError::Validation(_))));
        assert!(matches!(
            purchase(&conn, 1, 1, 15.0, now),
            Err(AppError::InsufficientCredits { .. })
        ));
        assert!(!get_user(&conn, 1).unwrap().unwrap().is_premium);
    }

    #[test]
    fn test_expire_due() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        adjust_credits(&conn, 1, 15.0, "seed").unwrap();
        let now = Utc::now();
        purchase(&conn, 1, 1, 15.0, now).unwrap();

        assert!(expire_due(&conn, now).unwrap().is_empty());
        assert_eq!(expire_due(&conn, now + Duration::days(2)).unwrap(), vec![1]);
        assert!(expire_due(&conn, now + Duration::days(3)).unwrap().is_empty());
    }
}
