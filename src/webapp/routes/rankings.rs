use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::str::FromStr;
use std::sync::Arc;

use crate::core::rankings::{self, RankingEntry, RankingKind};
use crate::webapp::error::{ApiError, ApiResult};
use crate::webapp::state::WebAppState;

const DEFAULT_LIMIT: usize = 20;
const MAX_LIMIT: usize = 50;

#[derive(Debug, Deserialize)]
pub struct RankingQuery {
    pub limit: Option<usize>,
}

/// GET /api/rankings/{kind}
pub async fn ranking(
    State(state): State<Arc<WebAppState>>,
    kind: Result<Path<String>, PathRejection>,
    query: Result<Query<RankingQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<RankingEntry>>> {
    let Path(kind) = kind?;
    let Query(query) = query?;
    let kind = RankingKind::from_str(&kind)
        .map_err(|_| ApiError::BadRequest(format!("Unknown ranking '{}'", kind)))?;
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    let entries = rankings::fetch(&state.ctx.pool, &state.ctx.cache, kind, limit, state.ctx.settings.cache_ttl).await?;
    Ok(Json(entries))
}
