use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::credits;
use crate::storage::accounts::{accounts_for_user, MediaAccount};
use crate::storage::db::{recent_ledger, require_user, LedgerEntry, User};
use crate::storage::get_connection;
use crate::webapp::auth::AuthUser;
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

const LEDGER_ENTRIES: usize = 20;

#[derive(Debug, Serialize)]
pub struct UserInfoResponse {
    pub user: User,
    pub is_admin: bool,
    pub accounts: Vec<MediaAccount>,
    pub recent_ledger: Vec<LedgerEntry>,
}

#[derive(Debug, Deserialize)]
pub struct TransferRequest {
    pub to_tg_id: i64,
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct TransferResponse {
    pub amount: f64,
    pub balance: f64,
}

/// GET /api/user/info
pub async fn info(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<UserInfoResponse>> {
    let conn = get_connection(&state.ctx.pool)?;
    let user = require_user(&conn, auth.tg_id)?;

    Ok(Json(UserInfoResponse {
        accounts: accounts_for_user(&conn, auth.tg_id)?,
        recent_ledger: recent_ledger(&conn, auth.tg_id, LEDGER_ENTRIES)?,
        is_admin: auth.is_admin,
        user,
    }))
}

/// POST /api/user/transfer
pub async fn transfer(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<TransferRequest>, JsonRejection>,
) -> ApiResult<Json<TransferResponse>> {
    let Json(req) = payload?;
    let outcome = {
        let conn = get_connection(&state.ctx.pool)?;
        credits::transfer(&conn, auth.tg_id, req.to_tg_id, req.amount)?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(TransferResponse {
        amount: outcome.amount,
        balance: outcome.sender_balance,
    }))
}
