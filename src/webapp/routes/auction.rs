use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::{Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::core::auction::{self, minimum_bid};
use crate::storage::auctions::{bids_for, list_active, require_auction, top_bid, Auction, Bid};
use crate::storage::get_connection;
use crate::telegram::notifications::Notification;
use crate::webapp::auth::AuthUser;
use crate::webapp::error::ApiResult;
use crate::webapp::state::WebAppState;

const BID_HISTORY: usize = 20;

#[derive(Debug, Serialize)]
pub struct AuctionSummary {
    #[serde(flatten)]
    pub auction: Auction,
    pub min_bid: f64,
}

#[derive(Debug, Serialize)]
pub struct AuctionDetail {
    #[serde(flatten)]
    pub auction: Auction,
    pub min_bid: f64,
    pub bids: Vec<Bid>,
}

#[derive(Debug, Deserialize)]
pub struct BidRequest {
    pub amount: f64,
}

#[derive(Debug, Serialize)]
pub struct BidResponse {
    pub auction: AuctionSummary,
    pub amount: f64,
    pub balance: f64,
}

/// GET /api/auction/list
pub async fn list(State(state): State<Arc<WebAppState>>) -> ApiResult<Json<Vec<AuctionSummary>>> {
    let conn = get_connection(&state.ctx.pool)?;
    let mut summaries = Vec::new();
    for auction in list_active(&conn)? {
        let top = top_bid(&conn, auction.id)?;
        summaries.push(AuctionSummary {
            min_bid: minimum_bid(&auction, top.as_ref()),
            auction,
        });
    }
    Ok(Json(summaries))
}

/// GET /api/auction/{id}
pub async fn detail(
    State(state): State<Arc<WebAppState>>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<Json<AuctionDetail>> {
    let Path(id) = id?;
    let conn = get_connection(&state.ctx.pool)?;
    let auction = require_auction(&conn, id)?;
    let bids = bids_for(&conn, id, BID_HISTORY)?;

    Ok(Json(AuctionDetail {
        min_bid: minimum_bid(&auction, bids.first()),
        auction,
        bids,
    }))
}

/// POST /api/auction/{id}/bid
pub async fn bid(
    State(state): State<Arc<WebAppState>>,
    Extension(auth): Extension<AuthUser>,
    id: Result<Path<i64>, PathRejection>,
    payload: Result<Json<BidRequest>, JsonRejection>,
) -> ApiResult<Json<BidResponse>> {
    let Path(id) = id?;
    let Json(req) = payload?;

    let (outcome, min_bid) = {
        let conn = get_connection(&state.ctx.pool)?;
        let outcome = auction::place_bid(&conn, id, auth.tg_id, req.amount, Utc::now())?;
        let min_bid = minimum_bid(&outcome.auction, top_bid(&conn, id)?.as_ref());
        (outcome, min_bid)
    };
    if let Some((outbid_id, refunded)) = outcome.outbid {
        state.notify(Notification::Outbid {
            tg_id: outbid_id,
            auction_id: id,
            title: outcome.auction.title.clone(),
            refunded,
        });
    }
    state.ctx.invalidate_credit_caches().await;

    Ok(Json(BidResponse {
        auction: AuctionSummary {
            auction: outcome.auction,
            min_bid,
        },
        amount: outcome.amount,
        balance: outcome.balance,
    }))
}
