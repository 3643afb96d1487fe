//! Database, repositories, cache, and backup functionality

pub mod accounts;
pub mod auctions;
pub mod backup;
pub mod cache;
pub mod db;
pub mod invitations;
pub mod migrations;
pub mod wheel;

// Re-exports for convenience
pub use cache::{Cache, CacheKeys};
pub use db::{create_pool, get_connection, DbConnection, DbPool};
