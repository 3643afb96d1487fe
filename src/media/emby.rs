//! Emby REST API client

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;

use crate::core::config::EmbySettings;
use crate::core::error::{AppError, AppResult};
use crate::media::MediaServer;

/// Emby runtime ticks are 100 ns
const TICKS_PER_MINUTE: i64 = 600_000_000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub struct EmbyClient {
    client: Client,
    base_url: String,
    api_token: SecretString,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreatedUser {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ItemsResponse {
    #[serde(default)]
    items: Vec<PlayedItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PlayedItem {
    #[serde(default)]
    run_time_ticks: Option<i64>,
}

impl EmbyClient {
    pub fn new(settings: &EmbySettings) -> AppResult<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
            api_token: SecretString::from(settings.api_token.expose_secret().to_owned()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.base_url, path))
            .header("X-Emby-Token", self.api_token.expose_secret())
    }

    /// Sends the request and turns non-2xx answers into `MediaServer` errors
    async fn send(&self, request: RequestBuilder, what: &str) -> AppResult<reqwest::Response> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        log::warn!("Emby {} failed with {}: {}", what, status, body);
        Err(match status {
            StatusCode::NOT_FOUND => AppError::NotFound(format!("Media server user not found ({})", what)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                AppError::MediaServer("Media server rejected the API token".to_string())
            }
            _ => AppError::MediaServer(format!("{} failed with status {}", what, status)),
        })
    }
}

#[async_trait]
impl MediaServer for EmbyClient {
    fn kind(&self) -> &str {
        "emby"
    }

    async fn create_user(&self, username: &str, password: &str) -> AppResult<String> {
        let response = self
            .send(
                self.request(Method::POST, "/Users/New").json(&json!({ "Name": username })),
                "create user",
            )
            .await?;
        let created: CreatedUser = response.json().await?;

        let password_set = self
            .send(
                self.request(Method::POST, &format!("/Users/{}/Password", created.id))
                    .json(&json!({ "Id": created.id, "CurrentPw": "", "NewPw": password, "ResetPassword": false })),
                "set password",
            )
            .await;
        if let Err(e) = password_set {
            // A user without a password must not stay behind
            if let Err(cleanup) = self.delete_user(&created.id).await {
                log::error!("Failed to remove passwordless Emby user {}: {}", created.id, cleanup);
            }
            return Err(e);
        }

        log::info!("Created Emby user {} ({})", username, created.id);
        Ok(created.id)
    }

    async fn delete_user(&self, user_id: &str) -> AppResult<()> {
        self.send(self.request(Method::DELETE, &format!("/Users/{}", user_id)), "delete user")
            .await?;
        log::info!("Deleted Emby user {}", user_id);
        Ok(())
    }

    async fn set_enabled(&self, user_id: &str, enabled: bool) -> AppResult<()> {
        let response = self
            .send(self.request(Method::GET, &format!("/Users/{}", user_id)), "get user")
            .await?;
        let user: Value = response.json().await?;

        // Policy is posted back whole, Emby resets omitted fields
        let mut policy = user.get("Policy").cloned().unwrap_or_else(|| json!({}));
        if let Some(fields) = policy.as_object_mut() {
            fields.insert("IsDisabled".to_string(), Value::Bool(!enabled));
        }

        self.send(
            self.request(Method::POST, &format!("/Users/{}/Policy", user_id)).json(&policy),
            "update policy",
        )
        .await?;

        log::info!("Emby user {} {}", user_id, if enabled { "enabled" } else { "disabled" });
        Ok(())
    }

    async fn watched_minutes(&self, user_id: &str) -> AppResult<i64> {
        let response = self
            .send(
                self.request(Method::GET, &format!("/Users/{}/Items", user_id)).query(&[
                    ("Filters", "IsPlayed"),
                    ("Recursive", "true"),
                    ("IncludeItemTypes", "Movie,Episode"),
                    ("Fields", "RunTimeTicks"),
                ]),
                "list played items",
            )
            .await?;
        let items: ItemsResponse = response.json().await?;

        let ticks: i64 = items.items.iter().filter_map(|item| item.run_time_ticks).sum();
        Ok(ticks / TICKS_PER_MINUTE)
    }

    async fn ping(&self) -> AppResult<()> {
        self.send(self.request(Method::GET, "/System/Info"), "system info").await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> EmbyClient {
        EmbyClient::new(&EmbySettings {
            url: format!("{}/", server.uri()),
            api_token: SecretString::from("token".to_string()),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_create_user_sets_password() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Users/New"))
            .and(header("X-Emby-Token", "token"))
            .and(body_partial_json(json!({ "Name": "alice" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "Id": "u1", "Name": "alice" })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Users/u1/Password"))
            .and(body_partial_json(json!({ "NewPw": "secret123456" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let id = client_for(&server).create_user("alice", "secret123456").await.unwrap();
        assert_eq!(id, "u1");
    }

    #[tokio::test]
    async fn test_set_enabled_keeps_other_policy_fields() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users/u1"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "Id": "u1", "Policy": { "IsAdministrator": false, "IsDisabled": false } })),
            )
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/Users/u1/Policy"))
            .and(body_partial_json(json!({ "IsAdministrator": false, "IsDisabled": true })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        client_for(&server).set_enabled("u1", false).await.unwrap();
    }

    #[tokio::test]
    async fn test_watched_minutes_sums_runtime() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/Users/u1/Items"))
            .and(query_param("Filters", "IsPlayed"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Items": [
                    { "RunTimeTicks": 54_000_000_000_i64 },
                    { "RunTimeTicks": 18_000_000_000_i64 },
                    { "Name": "no runtime" }
                ],
                "TotalRecordCount": 3
            })))
            .mount(&server)
            .await;

        // 90 min + 30 min
        assert_eq!(client_for(&server).watched_minutes("u1").await.unwrap(), 120);
    }

    #[tokio::test]
    async fn test_error_statuses_are_mapped() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/System/Info"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/Users/missing"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(matches!(client.ping().await, Err(AppError::MediaServer(_))));
        assert!(matches!(client.set_enabled("missing", true).await, Err(AppError::NotFound(_))));
    }
}
