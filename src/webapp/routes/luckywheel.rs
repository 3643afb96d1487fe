use axum::extract::State;
use axum::{Extension, Json};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::sync::Arc;

use crate::core::wheel::{self, Prize, SpinOutcome};
use crate::storage::get_connection;
use crate::storage::wheel::{draws_for_user, WheelDraw};
use crate::webapp::auth::AuthUser;
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

const HISTORY_SIZE: usize = 20;

#[derive(Debug, Serialize)]
pub struct WheelConfig {
    pub cost: f64,
    pub prizes: Vec<Prize>,
}

/// GET /api/luckywheel/config
pub async fn config(State(state): State<Arc<WebAppState>>) -> Json<WheelConfig> {
    Json(WheelConfig {
        cost: state.ctx.settings.economy.wheel_cost_credits,
        prizes: wheel::default_prizes(),
    })
}

/// POST /api/luckywheel/spin
pub async fn spin(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<SpinOutcome>> {
    let outcome = {
        let conn = get_connection(&state.ctx.pool)?;
        wheel::spin(
            &conn,
            auth.tg_id,
            state.ctx.settings.economy.wheel_cost_credits,
            &wheel::default_prizes(),
            &mut StdRng::from_os_rng(),
        )?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(outcome))
}

/// GET /api/luckywheel/history
pub async fn history(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Json<Vec<WheelDraw>>> {
    let conn = get_connection(&state.ctx.pool)?;
    Ok(Json(draws_for_user(&conn, auth.tg_id, HISTORY_SIZE)?))
}
