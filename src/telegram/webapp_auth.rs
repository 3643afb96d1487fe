use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Telegram user embedded in WebApp init data
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct WebAppUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
}

#[derive(Debug, Error, PartialEq)]
pub enum InitDataError {
    #[error("Missing {0} parameter")]
    Missing(&'static str),
    #[error("Invalid hash - data may be tampered")]
    BadSignature,
    #[error("Init data is too old ({0} seconds)")]
    Expired(i64),
    #[error("Malformed init data: {0}")]
    Malformed(String),
}

/// Разбирает query string init data, значения URL-декодируются
fn parse_params(init_data: &str) -> HashMap<String, String> {
    init_data
        .split('&')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            let decoded_value = urlencoding::decode(value).ok()?;
            Some((key.to_string(), decoded_value.into_owned()))
        })
        .collect()
}

/// Ключ подписи: HMAC_SHA256("WebAppData", bot_token)
fn secret_key(bot_token: &str) -> Vec<u8> {
    // HMAC accepts keys of any length, the error branch is unreachable
    let Ok(mut mac) = HmacSha256::new_from_slice(b"WebAppData") else {
        return Vec::new();
    };
    mac.update(bot_token.as_bytes());
    mac.finalize().into_bytes().to_vec()
}

/// Строка для проверки: все параметры кроме hash, отсортированные по ключу
fn data_check_string(params: &HashMap<String, String>) -> String {
    let mut check_pairs: Vec<String> = params
        .iter()
        .filter(|(key, _)| key.as_str() != "hash")
        .map(|(key, value)| format!("{}={}", key, value))
        .collect();
    check_pairs.sort();
    check_pairs.join("\n")
}

/// Валидация Telegram Web App init data
///
/// Telegram подписывает данные с помощью HMAC-SHA256.
/// Ключ для HMAC создаётся из bot token: HMAC_SHA256("WebAppData", bot_token)
///
/// # Аргументы
/// * `init_data` - Строка с параметрами от Telegram (query string format)
/// * `bot_token` - Токен бота
/// * `max_age_secs` - Максимальный возраст `auth_date`
/// * `now` - Текущее время
///
/// # Возвращает
/// Пользователя WebApp, если подпись верна и данные не устарели
pub fn validate_init_data(
    init_data: &str,
    bot_token: &str,
    max_age_secs: i64,
    now: DateTime<Utc>,
) -> Result<WebAppUser, InitDataError> {
    let params = parse_params(init_data);

    let received_hash = params.get("hash").ok_or(InitDataError::Missing("hash"))?;
    let received = hex::decode(received_hash).map_err(|_| InitDataError::BadSignature)?;

    let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token))
        .map_err(|e| InitDataError::Malformed(e.to_string()))?;
    mac.update(data_check_string(&params).as_bytes());
    // Constant-time comparison
    mac.verify_slice(&received).map_err(|_| InitDataError::BadSignature)?;

    let auth_date: i64 = params
        .get("auth_date")
        .ok_or(InitDataError::Missing("auth_date"))?
        .parse()
        .map_err(|_| InitDataError::Malformed("auth_date is not a number".to_string()))?;
    let age_seconds = now.timestamp() - auth_date;
    if age_seconds > max_age_secs {
        return Err(InitDataError::Expired(age_seconds));
    }

    let user_json = params.get("user").ok_or(InitDataError::Missing("user"))?;
    serde_json::from_str(user_json).map_err(|e| InitDataError::Malformed(format!("user JSON: {}", e)))
}

/// Builds signed init data the way Telegram does
#[cfg(test)]
pub(crate) fn sign_init_data(pairs: &[(&str, &str)], bot_token: &str) -> String {
    let params: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let mut mac = HmacSha256::new_from_slice(&secret_key(bot_token)).unwrap();
    mac.update(data_check_string(&params).as_bytes());
    let hash = hex::encode(mac.finalize().into_bytes());

    let mut query: Vec<String> = pairs
        .iter()
        .map(|(k, v)| format!("{}={}", k, urlencoding::encode(v)))
        .collect();
    query.push(format!("hash={}", hash));
    query.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "123456:test_token";

    fn signed(auth_date: i64) -> String {
        sign_init_data(
            &[
                ("query_id", "AAH"),
                ("user", r#"{"id":123456789,"first_name":"Test","username":"tester"}"#),
                ("auth_date", &auth_date.to_string()),
            ],
            TOKEN,
        )
    }

    #[test]
    fn test_valid_init_data() {
        let now = Utc::now();
        let user = validate_init_data(&signed(now.timestamp() - 10), TOKEN, 86400, now).unwrap();
        assert_eq!(user.id, 123456789);
        assert_eq!(user.username.as_deref(), Some("tester"));
    }

    #[test]
    fn test_wrong_token_or_tampering() {
        let now = Utc::now();
        let data = signed(now.timestamp());
        assert_eq!(
            validate_init_data(&data, "other:token", 86400, now),
            Err(InitDataError::BadSignature)
        );

        let tampered = data.replace("123456789", "987654321");
        assert_eq!(
            validate_init_data(&tampered, TOKEN, 86400, now),
            Err(InitDataError::BadSignature)
        );
    }

    #[test]
    fn test_expired_init_data() {
        let now = Utc::now();
        let result = validate_init_data(&signed(now.timestamp() - 90_000), TOKEN, 86400, now);
        assert!(matches!(result, Err(InitDataError::Expired(_))));
    }

    #[test]
    fn test_missing_hash() {
        let init_data = "user={\"id\":123}&auth_date=1234567890";
        let result = validate_init_data(init_data, TOKEN, 86400, Utc::now());
        assert_eq!(result, Err(InitDataError::Missing("hash")));
    }
}
