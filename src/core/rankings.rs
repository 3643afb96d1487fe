//! Leaderboards, cached in Redis

use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use strum::{AsRefStr, Display, EnumString};

use crate::core::error::AppResult;
use crate::storage::db::{display_name, get_connection, DbPool};
use crate::storage::{Cache, CacheKeys};

/// Number of entries stored per leaderboard
const RANKING_DEPTH: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, AsRefStr, Display, EnumString, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RankingKind {
    Credits,
    Donation,
    Watched,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankingEntry {
    pub rank: usize,
    pub tg_id: i64,
    pub name: String,
    /// Credits, donated amount or watched hours depending on the kind
    pub value: f64,
}

/// Reads a leaderboard straight from the database
pub fn query_ranking(conn: &Connection, kind: RankingKind, limit: usize) -> AppResult<Vec<RankingEntry>> {
    let sql = match kind {
        RankingKind::Credits => {
            "SELECT tg_id, username, first_name, credits FROM users
             WHERE credits > 0 ORDER BY credits DESC, tg_id LIMIT ?1"
        }
        RankingKind::Donation => {
            "SELECT tg_id, username, first_name, donation FROM users
             WHERE donation > 0 ORDER BY donation DESC, tg_id LIMIT ?1"
        }
        RankingKind::Watched => {
            "SELECT u.tg_id, u.username, u.first_name, ROUND(SUM(a.watched_minutes) / 60.0, 1) AS hours
             FROM users u JOIN media_accounts a ON a.tg_id = u.tg_id
             GROUP BY u.tg_id HAVING SUM(a.watched_minutes) > 0
             ORDER BY hours DESC, u.tg_id LIMIT ?1"
        }
    };

    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params![limit as i64], |row| {
            let tg_id: i64 = row.get(0)?;
            let username: Option<String> = row.get(1)?;
            let first_name: Option<String> = row.get(2)?;
            Ok((
                tg_id,
                display_name(tg_id, username.as_deref(), first_name.as_deref()),
                row.get::<_, f64>(3)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(rows
        .into_iter()
        .enumerate()
        .map(|(i, (tg_id, name, value))| RankingEntry {
            rank: i + 1,
            tg_id,
            name,
            value,
        })
        .collect())
}

/// Leaderboard served from the cache when present
pub async fn fetch(
    pool: &DbPool,
    cache: &Cache,
    kind: RankingKind,
    limit: usize,
    ttl: Duration,
) -> AppResult<Vec<RankingEntry>> {
    let key = CacheKeys::ranking(kind.as_ref());
    let mut entries = match cache.get_json::<Vec<RankingEntry>>(&key).await {
        Some(entries) => entries,
        None => {
            let entries = {
                let conn = get_connection(pool)?;
                query_ranking(&conn, kind, RANKING_DEPTH)?
            };
            cache.set_json(&key, &entries, ttl).await;
            entries
        }
    };
    entries.truncate(limit);
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::accounts::{insert_account, set_watched_minutes};
    use crate::storage::db::{adjust_credits, ensure_user, test_pool};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_rankings_by_kind() {
        let (_dir, pool) = test_pool();
        {
            let conn = get_connection(&pool).unwrap();
            ensure_user(&conn, 1, Some("alice"), None).unwrap();
            ensure_user(&conn, 2, None, Some("Bob")).unwrap();
            ensure_user(&conn, 3, None, None).unwrap();
            adjust_credits(&conn, 1, 10.0, "seed").unwrap();
            adjust_credits(&conn, 2, 20.0, "seed").unwrap();
            let account = insert_account(&conn, 3, "emby", "u3", "carol").unwrap();
            set_watched_minutes(&conn, account, 90).unwrap();
        }
        let cache = Cache::disabled();

        let credits = fetch(&pool, &cache, RankingKind::Credits, 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            credits,
            vec![
                RankingEntry {
                    rank: 1,
                    tg_id: 2,
                    name: "Bob".to_string(),
                    value: 20.0
                },
                RankingEntry {
                    rank: 2,
                    tg_id: 1,
                    name: "@alice".to_string(),
                    value: 10.0
                },
            ]
        );

        let watched = fetch(&pool, &cache, RankingKind::Watched, 10, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(watched.len(), 1);
        assert_eq!(watched[0].name, "3");
        assert_eq!(watched[0].value, 1.5);

        let top1 = fetch(&pool, &cache, RankingKind::Credits, 1, Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(top1.len(), 1);
        assert!(fetch(&pool, &cache, RankingKind::Donation, 10, Duration::from_secs(60))
            .await
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_kind_parsing() {
        assert_eq!("watched".parse::<RankingKind>().unwrap(), RankingKind::Watched);
        assert!("nope".parse::<RankingKind>().is_err());
        assert_eq!(RankingKind::Donation.to_string(), "donation");
    }
}
