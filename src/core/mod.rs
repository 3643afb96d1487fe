//! Configuration, errors, logging and the domain services

pub mod accounts;
pub mod auction;
pub mod config;
pub mod context;
pub mod credits;
pub mod error;
pub mod invitation;
pub mod logging;
pub mod premium;
pub mod rankings;
pub mod stats;
pub mod watch;
pub mod wheel;

// Re-exports for convenience
pub use config::Settings;
pub use context::AppContext;
pub use error::{AppError, AppResult};
pub use logging::init_logger;
