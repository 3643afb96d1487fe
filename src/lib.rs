//! pmsbot - Telegram bot and WebApp backend for a media server community
//!
//! Users get media server accounts through invitation codes and spend credits
//! on premium membership, the lucky wheel and auctions.
//!
//! # Module Structure
//!
//! - `core`: configuration, errors, logging and the domain services
//! - `storage`: SQLite repositories, Redis cache and backups
//! - `media`: media server API clients
//! - `telegram`: bot commands, handlers and notifications
//! - `webapp`: HTTP API and static frontend for the Telegram WebApp
//! - `scheduler`: periodic background jobs

pub mod cli;
pub mod core;
pub mod media;
pub mod scheduler;
pub mod storage;
pub mod telegram;
pub mod webapp;

// Re-export commonly used types for convenience
pub use core::{config, AppContext, AppError, AppResult, Settings};
pub use storage::{create_pool, get_connection, DbConnection, DbPool};
