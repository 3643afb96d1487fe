use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::premium::{self, PremiumPurchase, MAX_DAYS};
use crate::storage::db::require_user;
use crate::storage::get_connection;
use crate::webapp::auth::AuthUser;
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

#[derive(Debug, Serialize)]
pub struct PremiumInfo {
    pub is_premium: bool,
    pub expires_at: Option<DateTime<Utc>>,
    pub daily_price: f64,
    pub max_days: i64,
    pub credits: f64,
}

#[derive(Debug, Deserialize)]
pub struct BuyRequest {
    pub days: i64,
}

/// GET /api/premium/info
pub async fn info(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<PremiumInfo>> {
    let conn = get_connection(&state.ctx.pool)?;
    let user = require_user(&conn, auth.tg_id)?;

    Ok(Json(PremiumInfo {
        is_premium: user.is_premium,
        expires_at: user.premium_expires_at.filter(|_| user.is_premium),
        daily_price: state.ctx.settings.economy.premium_daily_credits,
        max_days: MAX_DAYS,
        credits: user.credits,
    }))
}

/// POST /api/premium/buy
pub async fn buy(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<BuyRequest>, JsonRejection>,
) -> ApiResult<Json<PremiumPurchase>> {
    let Json(req) = payload?;
    let purchase = {
        let conn = get_connection(&state.ctx.pool)?;
        premium::purchase(
            &conn,
            auth.tg_id,
            req.days,
            state.ctx.settings.economy.premium_daily_credits,
            Utc::now(),
        )?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(purchase))
}
