use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

/// Prefix for every key written by this application
const KEY_PREFIX: &str = "pmsbot:";

/// Redis JSON cache with TTL.
///
/// A cache that failed to connect at startup is *disabled*: reads miss and
/// writes are dropped. Errors on an enabled cache are logged and likewise
/// treated as misses, so the cache never fails a request.
#[derive(Clone)]
pub struct Cache {
    conn: Option<ConnectionManager>,
}

impl fmt::Debug for Cache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cache")
            .field("enabled", &self.conn.is_some())
            .finish()
    }
}

impl Cache {
    /// Connects to Redis, falling back to a disabled cache on failure
    pub async fn connect(redis_url: &str) -> Self {
        log::info!("Connecting to Redis cache at {}", redis_url);

        let client = match redis::Client::open(redis_url) {
            Ok(client) => client,
            Err(e) => {
                log::warn!("Invalid REDIS_URL '{}': {}. Running without cache", redis_url, e);
                return Self::disabled();
            }
        };

        match tokio::time::timeout(Duration::from_secs(5), ConnectionManager::new(client)).await {
            Ok(Ok(conn)) => {
                log::info!("Successfully connected to Redis cache");
                Self { conn: Some(conn) }
            }
            Ok(Err(e)) => {
                log::warn!("Failed to connect to Redis: {}. Running without cache", e);
                Self::disabled()
            }
            Err(_) => {
                log::warn!("Timed out connecting to Redis. Running without cache");
                Self::disabled()
            }
        }
    }

    /// A cache that stores nothing
    pub fn disabled() -> Self {
        Self { conn: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut conn = self.conn.clone()?;
        let full_key = format!("{}{}", KEY_PREFIX, key);

        let data: Option<String> = match conn.get(&full_key).await {
            Ok(data) => data,
            Err(e) => {
                log::warn!("Redis GET {} failed: {}", full_key, e);
                return None;
            }
        };

        match data {
            Some(json) => match serde_json::from_str(&json) {
                Ok(value) => {
                    log::debug!("Cache HIT: {}", full_key);
                    Some(value)
                }
                Err(e) => {
                    log::warn!("Dropping undecodable cache entry {}: {}", full_key, e);
                    None
                }
            },
            None => {
                log::debug!("Cache MISS: {}", full_key);
                None
            }
        }
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        let full_key = format!("{}{}", KEY_PREFIX, key);

        let json = match serde_json::to_string(value) {
            Ok(json) => json,
            Err(e) => {
                log::warn!("Failed to serialize cache entry {}: {}", full_key, e);
                return;
            }
        };

        if let Err(e) = conn.set_ex::<_, _, ()>(&full_key, json, ttl.as_secs().max(1)).await {
            log::warn!("Redis SETEX {} failed: {}", full_key, e);
        }
    }

    /// Deletes the given keys
    pub async fn invalidate(&self, keys: &[String]) {
        let Some(mut conn) = self.conn.clone() else {
            return;
        };
        if keys.is_empty() {
            return;
        }
        let full_keys: Vec<String> = keys.iter().map(|k| format!("{}{}", KEY_PREFIX, k)).collect();
        if let Err(e) = conn.del::<_, ()>(full_keys).await {
            log::warn!("Redis DEL failed: {}", e);
        }
    }
}

/// Cache key builders
#[derive(Debug, Clone, Copy)]
pub struct CacheKeys;

impl CacheKeys {
    pub fn ranking(kind: &str) -> String {
        format!("rankings:{}", kind)
    }

    pub fn system_stats() -> String {
        "system:stats".to_string()
    }

    /// Keys affected by any credit or donation change
    pub fn credit_dependent() -> Vec<String> {
        vec![
            Self::ranking("credits"),
            Self::ranking("donation"),
            Self::system_stats(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_cache_misses() {
        let cache = Cache::disabled();
        cache.set_json("k", &42u32, Duration::from_secs(10)).await;

        assert!(!cache.is_enabled());
        assert_eq!(cache.get_json::<u32>("k").await, None);
        cache.invalidate(&CacheKeys::credit_dependent()).await;
    }

    #[tokio::test]
    async fn test_invalid_url_falls_back_to_disabled() {
        let cache = Cache::connect("not a redis url").await;
        assert!(!cache.is_enabled());
    }

    #[test]
    fn test_keys() {
        assert_eq!(CacheKeys::ranking("credits"), "rankings:credits");
        assert!(CacheKeys::credit_dependent().contains(&CacheKeys::system_stats()));
    }
}
