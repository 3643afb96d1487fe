//! Shared application state handed to the bot, the WebApp and the scheduler

use std::sync::Arc;

use crate::core::config::Settings;
use crate::core::error::{AppError, AppResult};
use crate::media::{EmbyClient, MediaServer};
use crate::storage::{Cache, CacheKeys, DbPool};

#[derive(Clone)]
pub struct AppContext {
    pub pool: DbPool,
    pub cache: Cache,
    pub media: Option<Arc<dyn MediaServer>>,
    pub settings: Arc<Settings>,
}

impl AppContext {
    pub fn new(pool: DbPool, cache: Cache, media: Option<Arc<dyn MediaServer>>, settings: Arc<Settings>) -> Self {
        Self {
            pool,
            cache,
            media,
            settings,
        }
    }

    /// Builds the context from settings: database pool, Redis cache and Emby client
    pub async fn from_settings(settings: Arc<Settings>) -> AppResult<Self> {
        let pool = crate::storage::create_pool(&settings.db_path())?;
        let cache = Cache::connect(&settings.redis_url).await;

        let media: Option<Arc<dyn MediaServer>> = match &settings.emby {
            Some(emby) => {
                let client = EmbyClient::new(emby)?;
                if let Err(e) = client.ping().await {
                    log::warn!("Emby server at {} is not reachable yet: {}", emby.url, e);
                }
                Some(Arc::new(client))
            }
            None => None,
        };

        Ok(Self::new(pool, cache, media, settings))
    }

    /// The configured media server or [`AppError::MediaServerUnavailable`]
    pub fn media(&self) -> AppResult<&dyn MediaServer> {
        self.media.as_deref().ok_or(AppError::MediaServerUnavailable)
    }

    pub fn is_admin(&self, tg_id: i64) -> bool {
        self.settings.is_admin(tg_id)
    }

    /// Drops the cached dashboard counters after accounts, codes or premium changed
    pub async fn invalidate_system_stats(&self) {
        self.cache.invalidate(&[CacheKeys::system_stats()]).await;
    }

    /// Drops cached rankings and stats after balances changed
    pub async fn invalidate_credit_caches(&self) {
        self.cache.invalidate(&CacheKeys::credit_dependent()).await;
    }
}
