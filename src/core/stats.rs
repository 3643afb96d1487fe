//! System-wide counters for the admin and WebApp dashboards

use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::error::AppResult;
use crate::storage::db::{count_premium_users, count_users, get_connection, total_credits, DbPool};
use crate::storage::{accounts, auctions, invitations, Cache, CacheKeys};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SystemStats {
    pub users: i64,
    pub premium_users: i64,
    pub accounts: i64,
    pub active_accounts: i64,
    pub unused_codes: i64,
    pub total_credits: f64,
    pub active_auctions: i64,
}

pub fn system_stats(conn: &Connection) -> AppResult<SystemStats> {
    let (accounts, active_accounts) = accounts::count_accounts(conn)?;
    Ok(SystemStats {
        users: count_users(conn)?,
        premium_users: count_premium_users(conn)?,
        accounts,
        active_accounts,
        unused_codes: invitations::count_unused(conn)?,
        total_credits: total_credits(conn)?,
        active_auctions: auctions::count_active(conn)?,
    })
}

pub async fn cached_system_stats(pool: &DbPool, cache: &Cache, ttl: Duration) -> AppResult<SystemStats> {
    let key = CacheKeys::system_stats();
    if let Some(stats) = cache.get_json(&key).await {
        return Ok(stats);
    }

    let stats = {
        let conn = get_connection(pool)?;
        system_stats(&conn)?
    };
    cache.set_json(&key, &stats, ttl).await;
    Ok(stats)
}

impl SystemStats {
    /// Plain-text summary for the bot
    pub fn to_message(&self) -> String {
        format!(
            "📊 System statistics\n\n\
             Users: {}\n\
             Premium users: {}\n\
             Media accounts: {} ({} active)\n\
             Unused invitation codes: {}\n\
             Credits in circulation: {:.2}\n\
             Active auctions: {}",
            self.users,
            self.premium_users,
            self.accounts,
            self.active_accounts,
            self.unused_codes,
            self.total_credits,
            self.active_auctions
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::db::{adjust_credits, ensure_user, test_pool};

    #[test]
    fn test_system_stats_counts() {
        let (_dir, pool) = test_pool();
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, 1, None, None).unwrap();
        ensure_user(&conn, 2, None, None).unwrap();
        adjust_credits(&conn, 1, 12.5, "seed").unwrap();
        invitations::insert_code(&conn, "AAAAAAAAAAAA", 1).unwrap();
        let id = accounts::insert_account(&conn, 2, "emby", "u2", "bob").unwrap();
        accounts::set_active(&conn, id, false).unwrap();

        let stats = system_stats(&conn).unwrap();
        assert_eq!(stats.users, 2);
        assert_eq!(stats.accounts, 1);
        assert_eq!(stats.active_accounts, 0);
        assert_eq!(stats.unused_codes, 1);
        assert_eq!(stats.total_credits, 12.5);
        assert!(stats.to_message().contains("Users: 2"));
    }
}
