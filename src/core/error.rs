use thiserror::Error;

/// Centralized error types for the application
///
/// All library errors are converted to this enum for consistent handling in
/// both the bot handlers and the WebApp API. Uses `thiserror` for automatic
/// error conversion and display formatting.
///
/// # Example
///
/// ```no_run
/// use pmsbot::core::error::AppError;
///
/// fn handle_error(err: AppError) {
///     eprintln!("Error: {}", err);
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Database connection pool errors
    #[error("Database pool error: {0}")]
    DatabasePool(#[from] r2d2::Error),

    /// Schema migration errors
    #[error("Migration error: {0}")]
    Migration(String),

    /// Redis errors (only surfaced at connect time, cache reads never fail)
    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    /// Telegram API errors
    #[error("Telegram error: {0}")]
    Telegram(#[from] teloxide::RequestError),

    /// HTTP client errors while talking to the media server
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The media server answered with an unexpected status or payload
    #[error("Media server error: {0}")]
    MediaServer(String),

    /// No media server is configured
    #[error("Media server is not configured")]
    MediaServerUnavailable,

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation errors (bad user input)
    #[error("Validation error: {0}")]
    Validation(String),

    /// The user does not have enough credits for the operation
    #[error("Insufficient credits: need {needed:.2}, have {available:.2}")]
    InsufficientCredits { needed: f64, available: f64 },

    /// A referenced entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The operation conflicts with current state (used code, duplicate account, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The caller is not allowed to perform the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),
}

/// Type alias for Result with AppError
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    /// Message that is safe to show to an end user (bot reply or API body).
    ///
    /// Infrastructure failures are collapsed into a generic text so that
    /// paths, SQL and tokens never leak to chats.
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Conflict(msg)
            | AppError::Forbidden(msg) => msg.clone(),
            AppError::InsufficientCredits { .. } | AppError::MediaServerUnavailable => self.to_string(),
            _ => "Internal error, please try again later".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message_hides_internal_details() {
        let err = AppError::Migration("V1 failed at /srv/data/data.db".to_string());
        assert_eq!(err.user_message(), "Internal error, please try again later");
    }

    #[test]
    fn test_user_message_keeps_domain_text() {
        let err = AppError::Conflict("Invitation code already used".to_string());
        assert_eq!(err.user_message(), "Invitation code already used");

        let err = AppError::InsufficientCredits {
            needed: 30.0,
            available: 12.5,
        };
        assert_eq!(err.user_message(), "Insufficient credits: need 30.00, have 12.50");
    }
}
