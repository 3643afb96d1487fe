//! Admin-only endpoints. The auth middleware rejects non-admins before these run.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{Extension, Json};
use chrono::{Duration, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::accounts::set_account_enabled;
use crate::core::auction;
use crate::core::credits::{self, DonationOutcome};
use crate::core::invitation;
use crate::storage::accounts::MediaAccount;
use crate::storage::auctions::{Auction, NewAuction};
use crate::storage::backup::create_backup;
use crate::storage::db::{count_users, list_users, User};
use crate::storage::get_connection;
use crate::webapp::auth::AuthUser;
use crate::webapp::error::{ApiError, ApiResult};
use crate::webapp::state::WebAppState;

const DEFAULT_PAGE_SIZE: usize = 50;
const MAX_PAGE_SIZE: usize = 200;

#[derive(Debug, Deserialize)]
pub struct Pagination {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct UserPage {
    pub total: i64,
    pub users: Vec<User>,
}

#[derive(Debug, Deserialize)]
pub struct CreditsRequest {
    pub tg_id: i64,
    pub amount: f64,
    pub reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreditsResponse {
    pub tg_id: i64,
    pub balance: f64,
}

#[derive(Debug, Deserialize)]
pub struct DonationRequest {
    pub tg_id: i64,
    pub amount: f64,
}

#[derive(Debug, Deserialize)]
pub struct CodesRequest {
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct CodesResponse {
    pub codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct EnabledRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateAuctionRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub starting_price: f64,
    pub min_increment: f64,
    pub duration_hours: i64,
}

#[derive(Debug, Serialize)]
pub struct BackupResponse {
    pub path: String,
}

/// GET /api/admin/users
pub async fn users(
    State(state): State<Arc<WebAppState>>,
    query: Result<Query<Pagination>, QueryRejection>,
) -> ApiResult<Json<UserPage>> {
    let Query(page) = query?;
    let limit = page.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

    let conn = get_connection(&state.ctx.pool)?;
    Ok(Json(UserPage {
        total: count_users(&conn)?,
        users: list_users(&conn, limit, page.offset.unwrap_or(0))?,
    }))
}

/// POST /api/admin/credits
pub async fn adjust_credits(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreditsRequest>, JsonRejection>,
) -> ApiResult<Json<CreditsResponse>> {
    let Json(req) = payload?;
    let reason = req.reason.unwrap_or_else(|| format!("admin {}", auth.tg_id));

    let balance = {
        let conn = get_connection(&state.ctx.pool)?;
        credits::grant(&conn, req.tg_id, req.amount, &reason)?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(CreditsResponse {
        tg_id: req.tg_id,
        balance,
    }))
}

/// POST /api/admin/donation
pub async fn donation(
    State(state): State<Arc<WebAppState>>,
    payload: Result<Json<DonationRequest>, JsonRejection>,
) -> ApiResult<Json<DonationOutcome>> {
    let Json(req) = payload?;
    let outcome = {
        let conn = get_connection(&state.ctx.pool)?;
        credits::record_donation(
            &conn,
            req.tg_id,
            req.amount,
            state.ctx.settings.economy.donation_credits_multiplier,
        )?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(outcome))
}

/// POST /api/admin/invitation
pub async fn generate_codes(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CodesRequest>, JsonRejection>,
) -> ApiResult<Json<CodesResponse>> {
    let Json(req) = payload?;
    let codes = {
        let conn = get_connection(&state.ctx.pool)?;
        invitation::generate_batch(&conn, auth.tg_id, req.count, &mut StdRng::from_os_rng())?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(CodesResponse { codes }))
}

/// POST /api/admin/accounts/{username}/enabled
pub async fn set_enabled(
    State(state): State<Arc<WebAppState>>,
    username: Result<Path<String>, PathRejection>,
    payload: Result<Json<EnabledRequest>, JsonRejection>,
) -> ApiResult<Json<MediaAccount>> {
    let Path(username) = username?;
    let Json(req) = payload?;
    let media = state.ctx.media()?;

    let account = set_account_enabled(&state.ctx.pool, media, &username, req.enabled).await?;
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(account))
}

/// POST /api/admin/auction
pub async fn create_auction(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    payload: Result<Json<CreateAuctionRequest>, JsonRejection>,
) -> ApiResult<Json<Auction>> {
    let Json(req) = payload?;
    if req.duration_hours <= 0 {
        return Err(ApiError::BadRequest("Duration must be at least one hour".to_string()));
    }

    let now = Utc::now();
    let new = NewAuction {
        title: req.title.trim(),
        description: req.description.trim(),
        starting_price: req.starting_price,
        min_increment: req.min_increment,
        ends_at: now + Duration::hours(req.duration_hours),
        created_by: auth.tg_id,
    };
    let auction = {
        let conn = get_connection(&state.ctx.pool)?;
        auction::create(&conn, &new, now)?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(auction))
}

/// POST /api/admin/auction/{id}/cancel
pub async fn cancel_auction(
    State(state): State<Arc<WebAppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<Auction>> {
    let Path(id) = id?;
    let auction = {
        let conn = get_connection(&state.ctx.pool)?;
        auction::cancel(&conn, id)?
    };
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(auction))
}

/// POST /api/admin/backup
pub async fn backup(State(state): State<Arc<WebAppState>>) -> ApiResult<Json<BackupResponse>> {
    let conn = get_connection(&state.ctx.pool)?;
    let settings = &state.ctx.settings;
    let path = create_backup(&conn, &settings.db_path(), &settings.backup_dir())?;

    Ok(Json(BackupResponse {
        path: path.display().to_string(),
    }))
}
