use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use crate::core::stats::{cached_system_stats, SystemStats};
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

/// GET /api/system/stats
pub async fn stats(State(state): State<Arc<WebAppState>>) -> ApiResult<Json<SystemStats>> {
    let stats = cached_system_stats(&state.ctx.pool, &state.ctx.cache, state.ctx.settings.cache_ttl).await?;
    Ok(Json(stats))
}
