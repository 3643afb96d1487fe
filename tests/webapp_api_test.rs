//! HTTP-level tests of the WebApp router
//!
//! Run with: cargo test --test webapp_api_test

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use hmac::{Hmac, Mac};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use sha2::Sha256;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

use pmsbot::core::config::EmbySettings;
use pmsbot::core::{invitation, AppContext, Settings};
use pmsbot::media::{EmbyClient, MediaServer};
use pmsbot::storage::db::{adjust_credits, ensure_user};
use pmsbot::storage::{create_pool, get_connection, Cache, DbPool};
use pmsbot::webapp::auth::INIT_DATA_HEADER;
use pmsbot::webapp::session::{sign_session, SESSION_COOKIE};
use pmsbot::webapp::{create_router, WebAppState};
use rand::rngs::StdRng;
use rand::SeedableRng;
use secrecy::SecretString;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BOT_TOKEN: &str = "123456:test_token";
const SESSION_SECRET: &str = "integration-test-secret";
const ADMIN_ID: i64 = 1000;
const USER_ID: i64 = 2000;

struct TestApp {
    _dir: TempDir,
    pool: DbPool,
    router: Router,
}

fn setup() -> TestApp {
    setup_with_media(None)
}

fn setup_with_media(media: Option<Arc<dyn MediaServer>>) -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let static_dir = dir.path().join("static");
    std::fs::create_dir_all(&static_dir).unwrap();
    std::fs::write(
        static_dir.join("index.html"),
        "<html><head><title>Vite App</title></head><body><div id=\"app\"></div></body></html>",
    )
    .unwrap();
    std::fs::write(static_dir.join("app.js"), "console.log('app');").unwrap();

    let data_path = dir.path().display().to_string();
    let static_path = static_dir.display().to_string();
    let settings = Settings::from_lookup(|key| match key {
        "DATA_PATH" => Some(data_path.clone()),
        "BOT_TOKEN" => Some(BOT_TOKEN.to_string()),
        "ADMIN_CHAT_ID" => Some(ADMIN_ID.to_string()),
        "WEBAPP_SESSION_SECRET_KEY" => Some(SESSION_SECRET.to_string()),
        "WEBAPP_STATIC_DIR" => Some(static_path.clone()),
        "WEBAPP_TITLE" => Some("My Media".to_string()),
        "WHEEL_COST_CREDITS" => Some("10".to_string()),
        _ => None,
    })
    .unwrap();

    let pool = create_pool(&settings.db_path()).unwrap();
    {
        let conn = get_connection(&pool).unwrap();
        ensure_user(&conn, ADMIN_ID, Some("admin"), None).unwrap();
        ensure_user(&conn, USER_ID, Some("user"), None).unwrap();
    }

    let ctx = AppContext::new(pool.clone(), Cache::disabled(), media, Arc::new(settings));
    let router = create_router(Arc::new(WebAppState::new(ctx, None)));

    TestApp { _dir: dir, pool, router }
}

/// Telegram-style signed init data for `tg_id`
fn init_data(tg_id: i64) -> String {
    let user = json!({"id": tg_id, "first_name": "Web", "username": "webuser"}).to_string();
    let auth_date = Utc::now().timestamp().to_string();
    let mut pairs = vec![("auth_date", auth_date), ("query_id", "AAH".to_string()), ("user", user)];
    pairs.sort();

    let check_string = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("\n");

    let mut key_mac = Hmac::<Sha256>::new_from_slice(b"WebAppData").unwrap();
    key_mac.update(BOT_TOKEN.as_bytes());
    let secret = key_mac.finalize().into_bytes();

    let mut mac = Hmac::<Sha256>::new_from_slice(&secret).unwrap();
    mac.update(check_string.as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    query.push(format!("hash={}", hash));
    query.join("&")
}

fn session_for(tg_id: i64) -> String {
    let value = sign_session(tg_id, SESSION_SECRET.as_bytes(), Utc::now(), 3600);
    format!("{}={}", SESSION_COOKIE, value)
}

fn get(uri: &str, tg_id: Option<i64>) -> Request<Body> {
    let mut builder = Request::builder().method(Method::GET).uri(uri);
    if let Some(tg_id) = tg_id {
        builder = builder.header(header::COOKIE, session_for(tg_id));
    }
    builder.body(Body::empty()).unwrap()
}

fn post(uri: &str, tg_id: i64, body: Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::COOKIE, session_for(tg_id))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn send(app: &TestApp, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

#[tokio::test]
async fn test_health_needs_no_auth() {
    let app = setup();
    let (status, body) = send(&app, get("/api/health", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_api_requires_auth() {
    let app = setup();
    let (status, body) = send(&app, get("/api/user/info", None)).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_init_data_registers_user_and_sets_cookie() {
    let app = setup();
    let request = Request::builder()
        .uri("/api/user/info")
        .header(INIT_DATA_HEADER, init_data(4242))
        .body(Body::empty())
        .unwrap();

    let response = app.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with(&format!("{}=", SESSION_COOKIE)));
    assert!(cookie.contains("HttpOnly"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["user"]["tg_id"], 4242);
    assert_eq!(body["user"]["username"], "webuser");
    assert_eq!(body["is_admin"], false);
}

#[tokio::test]
async fn test_tampered_init_data_is_rejected() {
    let app = setup();
    let request = Request::builder()
        .uri("/api/user/info")
        .header(INIT_DATA_HEADER, init_data(4242).replace("4242", "4243"))
        .body(Body::empty())
        .unwrap();

    let (status, _) = send(&app, request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_admin_routes_require_admin() {
    let app = setup();

    let (status, _) = send(&app, get("/api/admin/users", Some(USER_ID))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(&app, get("/api/admin/users", Some(ADMIN_ID))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
}

#[tokio::test]
async fn test_spin_without_credits_is_payment_required() {
    let app = setup();
    let (status, body) = send(&app, post("/api/luckywheel/spin", USER_ID, json!({}))).await;

    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_unknown_ranking_is_bad_request() {
    let app = setup();
    let (status, _) = send(&app, get("/api/rankings/bogus", Some(USER_ID))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, get("/api/rankings/credits", Some(USER_ID))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_array());
}

#[tokio::test]
async fn test_transfer_moves_credits() {
    let app = setup();
    {
        let conn = get_connection(&app.pool).unwrap();
        adjust_credits(&conn, USER_ID, 50.0, "test").unwrap();
    }

    let (status, body) = send(
        &app,
        post("/api/user/transfer", USER_ID, json!({"to_tg_id": ADMIN_ID, "amount": 20.0})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 30.0);

    let (_, info) = send(&app, get("/api/user/info", Some(ADMIN_ID))).await;
    assert_eq!(info["user"]["credits"], 20.0);
    assert_eq!(info["is_admin"], true);
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let app = setup();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/api/user/transfer")
        .header(header::COOKIE, session_for(USER_ID))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send(&app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_auction_flow() {
    let app = setup();
    {
        let conn = get_connection(&app.pool).unwrap();
        adjust_credits(&conn, USER_ID, 100.0, "test").unwrap();
    }

    let (status, auction) = send(
        &app,
        post(
            "/api/admin/auction",
            ADMIN_ID,
            json!({"title": "Lifetime premium", "starting_price": 10.0, "min_increment": 5.0, "duration_hours": 24}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let id = auction["id"].as_i64().unwrap();

    let (status, _) = send(&app, post(&format!("/api/auction/{}/bid", id), USER_ID, json!({"amount": 5.0}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, post(&format!("/api/auction/{}/bid", id), USER_ID, json!({"amount": 15.0}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["balance"], 85.0);
    assert_eq!(body["auction"]["min_bid"], 20.0);

    let (status, detail) = send(&app, get(&format!("/api/auction/{}", id), Some(USER_ID))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["bids"].as_array().unwrap().len(), 1);

    let (status, _) = send(&app, post(&format!("/api/admin/auction/{}/cancel", id), ADMIN_ID, json!({}))).await;
    assert_eq!(status, StatusCode::OK);

    let (_, info) = send(&app, get("/api/user/info", Some(USER_ID))).await;
    assert_eq!(info["user"]["credits"], 100.0);

    let (status, _) = send(&app, get("/api/auction/999", Some(USER_ID))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_redeem_without_media_server_is_unavailable() {
    let app = setup();
    let (status, _) = send(
        &app,
        post("/api/invitation/redeem", USER_ID, json!({"code": "ABCDEFGHJKLM", "username": "alice"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_index_is_served_with_title() {
    let app = setup();

    let response = app.router.clone().oneshot(get("/", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store, no-cache, must-revalidate, max-age=0"
    );
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("<title>My Media</title>"));
    assert!(html.contains("document.title"));

    let head = Request::builder().method(Method::HEAD).uri("/").body(Body::empty()).unwrap();
    let response = app.router.clone().oneshot(head).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_app_index_gets_title_script() {
    let app = setup();

    for uri in ["/app/", "/app/index.html"] {
        let response = app.router.clone().oneshot(get(uri, None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
        assert!(response.headers().get(header::CACHE_CONTROL).is_none());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(html.contains("<title>My Media</title>"), "{}", uri);
        assert!(html.contains("document.title"), "{}", uri);
    }

    let response = app.router.clone().oneshot(get("/app/app.js", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"console.log('app');");
}

#[tokio::test]
async fn test_redeem_shows_up_in_system_stats() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Users/New"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"Id": "e1", "Name": "webuser"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/Users/e1/Password"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let emby = EmbyClient::new(&EmbySettings {
        url: server.uri(),
        api_token: SecretString::from("token".to_string()),
    })
    .unwrap();
    let app = setup_with_media(Some(Arc::new(emby)));
    let code = {
        let conn = get_connection(&app.pool).unwrap();
        invitation::generate(&conn, ADMIN_ID, 0.0, &mut StdRng::seed_from_u64(5)).unwrap()
    };

    let (_, before) = send(&app, get("/api/system/stats", Some(USER_ID))).await;
    assert_eq!(before["accounts"], 0);
    assert_eq!(before["unused_codes"], 1);

    let (status, account) = send(
        &app,
        post("/api/invitation/redeem", USER_ID, json!({"code": code, "username": "webuser"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(account["username"], "webuser");

    let (_, after) = send(&app, get("/api/system/stats", Some(USER_ID))).await;
    assert_eq!(after["accounts"], 1);
    assert_eq!(after["active_accounts"], 1);
    assert_eq!(after["unused_codes"], 0);
}
