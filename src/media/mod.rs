//! Media server integration.
//!
//! The `MediaServer` trait is the only thing the domain layer knows about the
//! remote server. The Emby implementation lives in [`emby`]; tests plug in
//! in-memory fakes.

pub mod emby;

use async_trait::async_trait;

use crate::core::error::AppResult;

pub use emby::EmbyClient;

/// Account management operations on a media server.
///
/// All methods are `&self`; implementations are shared behind `Arc` between
/// the bot, the WebApp and the scheduler.
#[async_trait]
pub trait MediaServer: Send + Sync {
    /// Server identifier stored with every account (e.g. "emby")
    fn kind(&self) -> &str;

    /// Creates a user with the given password.
    ///
    /// Returns the server-side user id.
    async fn create_user(&self, username: &str, password: &str) -> AppResult<String>;

    /// Removes a user, used to roll back a half-finished account
    async fn delete_user(&self, user_id: &str) -> AppResult<()>;

    /// Enables or disables login for a user
    async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<()>;

    /// Total runtime of the items the user has finished, in whole minutes
    async fn watched_minutes(&self, user_id: &str) -> AppResult<i64>;

    /// Checks that the server is reachable and the API token is accepted
    async fn ping(&self) -> AppResult<()>;
}
