//! Authentication middleware for `/api/*`.
//!
//! A request is authenticated by Telegram WebApp init data (header
//! `X-Telegram-Init-Data`), which also issues a session cookie, or by a valid
//! session cookie. `/api/admin/*` additionally requires an admin id.

use axum::extract::{Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use chrono::Utc;
use std::sync::Arc;

use super::error::ApiError;
use super::session::{session_cookie, session_from_headers, sign_session, verify_session};
use super::state::WebAppState;
use crate::core::config::{INIT_DATA_MAX_AGE_SECS, SESSION_MAX_AGE_SECS};
use crate::storage::db::ensure_user;
use crate::storage::get_connection;
use crate::telegram::webapp_auth::validate_init_data;

pub const INIT_DATA_HEADER: &str = "X-Telegram-Init-Data";

/// Authenticated caller, inserted into request extensions
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthUser {
    pub tg_id: i64,
    pub is_admin: bool,
}

pub async fn require_auth(
    State(state): State<Arc<WebAppState>>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let now = Utc::now();
    let init_data = req
        .headers()
        .get(INIT_DATA_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned);

    let (tg_id, new_session) = match init_data {
        Some(init_data) => {
            let user = validate_init_data(&init_data, state.bot_token(), INIT_DATA_MAX_AGE_SECS, now)
                .map_err(|e| {
                    log::warn!("Rejected WebApp init data: {}", e);
                    ApiError::Unauthorized(format!("Invalid init data: {}", e))
                })?;

            let conn = get_connection(&state.ctx.pool)?;
            if ensure_user(&conn, user.id, user.username.as_deref(), user.first_name.as_deref())? {
                log::info!("New user registered via WebApp: {}", user.id);
            }
            let session = sign_session(user.id, state.session_secret(), now, SESSION_MAX_AGE_SECS);
            (user.id, Some(session))
        }
        None => {
            let tg_id = session_from_headers(req.headers())
                .and_then(|value| verify_session(value, state.session_secret(), now))
                .ok_or_else(|| ApiError::Unauthorized("Authentication required".to_string()))?;
            (tg_id, None)
        }
    };

    let is_admin = state.ctx.is_admin(tg_id);
    if req.uri().path().starts_with("/api/admin") && !is_admin {
        log::warn!("User {} tried to access {}", tg_id, req.uri().path());
        return Err(ApiError::Forbidden("Admin access required".to_string()));
    }

    req.extensions_mut().insert(AuthUser { tg_id, is_admin });
    let mut response = next.run(req).await;

    if let Some(session) = new_session {
        match HeaderValue::from_str(&session_cookie(&session, SESSION_MAX_AGE_SECS)) {
            Ok(cookie) => {
                response.headers_mut().append(SET_COOKIE, cookie);
            }
            Err(e) => log::error!("Failed to build session cookie: {}", e),
        }
    }
    Ok(response)
}
