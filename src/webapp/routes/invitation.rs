use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::{Extension, Json};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::invitation::{self, RedeemedAccount};
use crate::storage::db::require_user;
use crate::storage::get_connection;
use crate::storage::invitations::{codes_by_owner, InvitationCode};
use crate::telegram::notifications::Notification;
use crate::webapp::auth::AuthUser;
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub code: String,
    pub cost: f64,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
    pub username: String,
}

/// GET /api/invitation/codes
pub async fn codes(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<InvitationCode>>> {
    let conn = get_connection(&state.ctx.pool)?;
    Ok(Json(codes_by_owner(&conn, auth.tg_id)?))
}

/// POST /api/invitation/generate
pub async fn generate(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<GenerateResponse>> {
    let cost = if auth.is_admin {
        0.0
    } else {
        state.ctx.settings.economy.invitation_credits
    };

    let response = {
        let conn = get_connection(&state.ctx.pool)?;
        let code = invitation::generate(&conn, auth.tg_id, cost, &mut StdRng::from_os_rng())?;
        GenerateResponse {
            code,
            cost,
            balance: require_user(&conn, auth.tg_id)?.credits,
        }
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(response))
}

/// POST /api/invitation/redeem
pub async fn redeem(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<RedeemRequest>, JsonRejection>,
) -> ApiResult<Json<RedeemedAccount>> {
    let Json(req) = payload?;
    let media = state.ctx.media()?;
    let mut rng = StdRng::from_os_rng();

    let account = invitation::redeem(&state.ctx.pool, media, &req.code, auth.tg_id, &req.username, &mut rng).await?;
    state.ctx.invalidate_system_stats().await;
    state.notify(Notification::Admin(format!(
        "🆕 New {} account '{}' for user {} (via WebApp)",
        account.server, account.username, auth.tg_id
    )));

    Ok(Json(account))
}
