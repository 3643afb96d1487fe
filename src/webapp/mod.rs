//! Telegram WebApp HTTP service: JSON API under `/api` and the static frontend.

pub mod auth;
pub mod error;
pub mod routes;
pub mod session;
pub mod state;
pub mod static_files;

use axum::body::Body;
use axum::http::Request;
use axum::middleware;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower::Layer;
use tower_http::trace::TraceLayer;

pub use error::{ApiError, ApiResult};
pub use state::WebAppState;

use routes::{admin, auction, invitation, luckywheel, premium, rankings, system, user};

// ============================================================================
// ROUTER
// ============================================================================

fn api_routes(state: Arc<WebAppState>) -> Router<Arc<WebAppState>> {
    Router::new()
        .route("/api/user/info", get(user::info))
        .route("/api/user/transfer", post(user::transfer))
        .route("/api/rankings/{kind}", get(rankings::ranking))
        .route("/api/system/stats", get(system::stats))
        .route("/api/invitation/codes", get(invitation::codes))
        .route("/api/invitation/generate", post(invitation::generate))
        .route("/api/invitation/redeem", post(invitation::redeem))
        .route("/api/premium/info", get(premium::info))
        .route("/api/premium/buy", post(premium::buy))
        .route("/api/luckywheel/config", get(luckywheel::config))
        .route("/api/luckywheel/spin", post(luckywheel::spin))
        .route("/api/luckywheel/history", get(luckywheel::history))
        .route("/api/auction/list", get(auction::list))
        .route("/api/auction/{id}", get(auction::detail))
        .route("/api/auction/{id}/bid", post(auction::bid))
        .route("/api/admin/users", get(admin::users))
        .route("/api/admin/credits", post(admin::adjust_credits))
        .route("/api/admin/donation", post(admin::donation))
        .route("/api/admin/invitation", post(admin::generate_codes))
        .route("/api/admin/accounts/{username}/enabled", post(admin::set_enabled))
        .route("/api/admin/auction", post(admin::create_auction))
        .route("/api/admin/auction/{id}/cancel", post(admin::cancel_auction))
        .route("/api/admin/backup", post(admin::backup))
        // Applies to the routes above only
        .route_layer(middleware::from_fn_with_state(state, auth::require_auth))
        .route("/api/health", get(health_check))
}

/// Builds the full application router
pub fn create_router(state: Arc<WebAppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let mut router = api_routes(state.clone()).route(
        "/",
        get(static_files::index).head(static_files::index_head),
    );

    let static_dir = &state.ctx.settings.webapp_static_dir;
    if static_dir.is_dir() {
        let files = middleware::from_fn_with_state(state.clone(), static_files::app_index)
            .layer(ServeDir::new(static_dir));
        router = router.nest_service("/app", files);
    } else {
        log::warn!(
            "WebApp static directory {} not found, frontend is not served",
            static_dir.display()
        );
    }

    let trace = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        tracing::info_span!("http", method = %request.method(), path = %request.uri().path())
    });

    router
        .layer(trace)
        .layer(cors)
        .with_state(state)
}

/// Serves the WebApp until the process is stopped
pub async fn run_webapp_server(state: Arc<WebAppState>) -> anyhow::Result<()> {
    let settings = state.ctx.settings.clone();

    if let Some(title) = &settings.webapp_title {
        match static_files::apply_title_to_index(&settings.webapp_static_dir, title) {
            Ok(true) => log::info!("WebApp title set to '{}'", title),
            Ok(false) => log::debug!("No index.html to apply the WebApp title to"),
            Err(e) => log::warn!("Failed to apply WebApp title: {}", e),
        }
    }

    let app = create_router(state);
    let addr = format!("{}:{}", settings.webapp_host, settings.webapp_port);
    log::info!("🌐 Starting WebApp server on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /api/health
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "pmsbot",
    }))
}
