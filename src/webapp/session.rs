//! Signed session cookies.
//!
//! Value format: `base64url(JSON {tg_id, exp})` + `.` + hex HMAC-SHA256 of the
//! encoded payload keyed with the session secret.

use axum::http::header::COOKIE;
use axum::http::HeaderMap;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "pmsbot_session";

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct SessionClaims {
    tg_id: i64,
    /// Unix timestamp after which the session is invalid
    exp: i64,
}

fn mac_for(secret: &[u8], payload: &str) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret).ok()?;
    mac.update(payload.as_bytes());
    Some(mac)
}

/// Creates a cookie value for `tg_id` valid for `max_age_secs`
pub fn sign_session(tg_id: i64, secret: &[u8], now: DateTime<Utc>, max_age_secs: i64) -> String {
    let claims = SessionClaims {
        tg_id,
        exp: now.timestamp() + max_age_secs,
    };
    // Serializing two integers cannot fail
    let json = serde_json::to_vec(&claims).unwrap_or_default();
    let payload = URL_SAFE_NO_PAD.encode(json);
    let signature = mac_for(secret, &payload)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{}.{}", payload, signature)
}

/// Returns the Telegram id of a valid, unexpired session
pub fn verify_session(value: &str, secret: &[u8], now: DateTime<Utc>) -> Option<i64> {
    let (payload, signature) = value.split_once('.')?;
    let signature = hex::decode(signature).ok()?;
    mac_for(secret, payload)?.verify_slice(&signature).ok()?;

    let json = URL_SAFE_NO_PAD.decode(payload).ok()?;
    let claims: SessionClaims = serde_json::from_slice(&json).ok()?;
    (claims.exp > now.timestamp()).then_some(claims.tg_id)
}

/// `Set-Cookie` header value for a session
pub fn session_cookie(value: &str, max_age_secs: i64) -> String {
    format!(
        "{}={}; Max-Age={}; Path=/; HttpOnly; SameSite=Lax",
        SESSION_COOKIE, value, max_age_secs
    )
}

/// Session cookie value from the request's `Cookie` headers
pub fn session_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}
