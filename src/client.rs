//! Twitch Helix API client with gated, retried, token-refreshing requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::auth::{Credential, TokenManager};
use crate::config::Settings;
use crate::error::{Result, ScoutError};
use crate::rate_limit::RequestGate;
use crate::retry::RetryPolicy;
use crate::types::{GameInfo, Page, RawStreamer, UserProfile};

/// Upstream caps listing endpoints at 100 items per page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// The Helix API surface the collection pipeline depends on.
#[async_trait]
pub trait TwitchApi: Send + Sync {
    /// Force a credential check before discovery begins.
    async fn ensure_authenticated(&self) -> Result<()>;

    /// Live streams matching the given filters.
    async fn get_streams(
        &self,
        game_id: Option<&str>,
        language: Option<&str>,
        first: u32,
        after: Option<&str>,
    ) -> Result<Page<RawStreamer>>;

    /// Channels (live and offline) matching a free-text query.
    async fn search_channels(
        &self,
        query: &str,
        first: u32,
        after: Option<&str>,
        live_only: bool,
    ) -> Result<Page<RawStreamer>>;

    /// Profile detail for up to [`MAX_PAGE_SIZE`] user ids.
    async fn get_users(&self, ids: &[String]) -> Result<Vec<UserProfile>>;

    /// Exact-name game lookup.
    async fn get_game_id(&self, name: &str) -> Result<Option<String>>;

    /// Fuzzy category search.
    async fn search_games(&self, query: &str) -> Result<Vec<GameInfo>>;
}

pub struct HelixClient {
    settings: Settings,
    http: Client,
    auth: TokenManager,
    gate: Arc<RequestGate>,
    retry: RetryPolicy,
}

impl HelixClient {
    pub fn new(settings: Settings) -> Result<Self> {
        let http = Client::builder().timeout(settings.request_timeout).build()?;
        let gate = Arc::new(RequestGate::new(
            settings.rate_limit_requests,
            settings.rate_limit_period,
        ));
        let auth = TokenManager::new(settings.clone(), http.clone());
        Ok(HelixClient {
            settings,
            http,
            auth,
            gate,
            retry: RetryPolicy::default(),
        })
    }

    /// Exchange credentials now and return the resulting credential.
    pub async fn authenticate(&self) -> Result<Credential> {
        self.auth.get_credential().await
    }

    /// Issue one gated GET request, retrying transient failures and
    /// recovering from a single stale-token rejection.
    #[instrument(skip(self, params))]
    async fn get_json(&self, endpoint: &str, params: &[(String, String)]) -> Result<Value> {
        let url = format!("{}{}", self.settings.api_base_url, endpoint);
        let mut attempt: u32 = 0;
        let mut refreshed = false;

        loop {
            self.gate.acquire().await;
            let token = self.auth.get_token().await?;

            let sent = self
                .http
                .get(&url)
                .query(&params)
                .bearer_auth(&token)
                .header("Client-Id", &self.settings.client_id)
                .send()
                .await;

            let response = match sent {
                Ok(response) => response,
                Err(e) => {
                    if !self.retry.attempts_left(attempt) {
                        return Err(ScoutError::Http(e));
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(error = %e, delay = ?delay, "request failed, retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    continue;
                }
            };

            match response.status() {
                StatusCode::OK => {
                    return response
                        .json::<Value>()
                        .await
                        .map_err(|e| ScoutError::MalformedResponse(format!("{endpoint}: {e}")));
                }
                StatusCode::UNAUTHORIZED => {
                    if refreshed {
                        return Err(ScoutError::Authentication(
                            "request rejected after a forced token refresh".to_string(),
                        ));
                    }
                    debug!("token rejected, forcing refresh");
                    self.auth.invalidate().await;
                    refreshed = true;
                }
                StatusCode::TOO_MANY_REQUESTS => {
                    // Throttling is never counted against the retry budget.
                    let reset = parse_reset_hint(response.headers());
                    self.gate.on_throttled(reset).await;
                }
                status if status.is_server_error() => {
                    if !self.retry.attempts_left(attempt) {
                        return Err(ScoutError::Transient(format!(
                            "{endpoint}: upstream returned {status} after {attempt} retries"
                        )));
                    }
                    let delay = self.retry.delay_for(attempt);
                    warn!(status = %status, delay = ?delay, "server error, retrying");
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(ScoutError::MalformedResponse(format!(
                        "{endpoint}: unexpected status {status}: {body}"
                    )));
                }
            }
        }
    }
}

#[async_trait]
impl TwitchApi for HelixClient {
    async fn ensure_authenticated(&self) -> Result<()> {
        self.auth.get_token().await.map(|_| ())
    }

    async fn get_streams(
        &self,
        game_id: Option<&str>,
        language: Option<&str>,
        first: u32,
        after: Option<&str>,
    ) -> Result<Page<RawStreamer>> {
        let mut params = vec![("first".to_string(), first.min(MAX_PAGE_SIZE).to_string())];
        if let Some(game_id) = game_id {
            params.push(("game_id".to_string(), game_id.to_string()));
        }
        if let Some(language) = language {
            params.push(("language".to_string(), language.to_string()));
        }
        if let Some(after) = after {
            params.push(("after".to_string(), after.to_string()));
        }

        let body = self.get_json("/streams", &params).await?;
        let items = data_array(&body)?
            .iter()
            .map(parse_stream)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            cursor: parse_cursor(&body),
        })
    }

    async fn search_channels(
        &self,
        query: &str,
        first: u32,
        after: Option<&str>,
        live_only: bool,
    ) -> Result<Page<RawStreamer>> {
        let mut params = vec![
            ("query".to_string(), query.to_string()),
            ("first".to_string(), first.min(MAX_PAGE_SIZE).to_string()),
        ];
        if let Some(after) = after {
            params.push(("after".to_string(), after.to_string()));
        }
        if live_only {
            params.push(("live_only".to_string(), "true".to_string()));
        }

        let body = self.get_json("/search/channels", &params).await?;
        let items = data_array(&body)?
            .iter()
            .map(parse_channel)
            .collect::<Result<Vec<_>>>()?;
        Ok(Page {
            items,
            cursor: parse_cursor(&body),
        })
    }

    async fn get_users(&self, ids: &[String]) -> Result<Vec<UserProfile>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<(String, String)> = ids
            .iter()
            .map(|id| ("id".to_string(), id.clone()))
            .collect();

        let body = self.get_json("/users", &params).await?;
        data_array(&body)?.iter().map(parse_user).collect()
    }

    async fn get_game_id(&self, name: &str) -> Result<Option<String>> {
        let params = vec![("name".to_string(), name.to_string())];
        let body = self.get_json("/games", &params).await?;
        let games = data_array(&body)?;
        Ok(games
            .first()
            .and_then(|game| game.get("id"))
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn search_games(&self, query: &str) -> Result<Vec<GameInfo>> {
        let params = vec![("query".to_string(), query.to_string())];
        let body = self.get_json("/search/categories", &params).await?;
        data_array(&body)?
            .iter()
            .map(|game| {
                Ok(GameInfo {
                    id: require_str(game, "id")?,
                    name: require_str(game, "name")?,
                })
            })
            .collect()
    }
}

/// Reset hint from a throttling response. Helix reports a unix timestamp;
/// a plain seconds delta is tolerated too.
fn parse_reset_hint(headers: &HeaderMap) -> Duration {
    let parsed = headers
        .get("Ratelimit-Reset")
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse::<u64>().ok());
    match parsed {
        Some(value) => {
            let now = chrono::Utc::now().timestamp().max(0) as u64;
            if value > now {
                Duration::from_secs(value - now)
            } else {
                Duration::from_secs(value.min(60))
            }
        }
        None => Duration::from_secs(60),
    }
}

fn parse_cursor(body: &Value) -> Option<String> {
    body.get("pagination")
        .and_then(|p| p.get("cursor"))
        .and_then(Value::as_str)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
}

fn data_array(body: &Value) -> Result<&Vec<Value>> {
    body.get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ScoutError::MalformedResponse("response missing data array".to_string()))
}

fn require_str(value: &Value, field: &str) -> Result<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ScoutError::MalformedResponse(format!("missing field: {field}")))
}

fn optional_str(value: &Value, field: &str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_stream(value: &Value) -> Result<RawStreamer> {
    Ok(RawStreamer {
        twitch_id: require_str(value, "user_id")?,
        username: require_str(value, "user_login")?,
        display_name: require_str(value, "user_name")?,
        is_live: true,
        viewer_count: value.get("viewer_count").and_then(Value::as_u64),
        game_name: optional_str(value, "game_name"),
        language: optional_str(value, "language"),
    })
}

fn parse_channel(value: &Value) -> Result<RawStreamer> {
    Ok(RawStreamer {
        twitch_id: require_str(value, "id")?,
        username: require_str(value, "broadcaster_login")?,
        display_name: require_str(value, "display_name")?,
        is_live: value
            .get("is_live")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        viewer_count: None,
        game_name: optional_str(value, "game_name"),
        language: optional_str(value, "broadcaster_language"),
    })
}

fn parse_user(value: &Value) -> Result<UserProfile> {
    Ok(UserProfile {
        twitch_id: require_str(value, "id")?,
        login: require_str(value, "login")?,
        display_name: require_str(value, "display_name")?,
        broadcaster_type: optional_str(value, "broadcaster_type"),
        description: optional_str(value, "description"),
        follower_count: value.get("follower_count").and_then(Value::as_u64),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_live_stream_record() {
        let value = json!({
            "id": "stream1",
            "user_id": "123456",
            "user_login": "teststreamer1",
            "user_name": "TestStreamer1",
            "game_id": "516575",
            "game_name": "Valorant",
            "type": "live",
            "viewer_count": 250,
            "language": "de",
        });

        let raw = parse_stream(&value).unwrap();
        assert_eq!(raw.twitch_id, "123456");
        assert_eq!(raw.username, "teststreamer1");
        assert_eq!(raw.display_name, "TestStreamer1");
        assert!(raw.is_live);
        assert_eq!(raw.viewer_count, Some(250));
        assert_eq!(raw.game_name.as_deref(), Some("Valorant"));
        assert_eq!(raw.language.as_deref(), Some("de"));
    }

    #[test]
    fn stream_missing_identity_is_malformed() {
        let value = json!({"user_login": "nobody", "user_name": "Nobody"});
        let err = parse_stream(&value).unwrap_err();
        assert!(matches!(err, ScoutError::MalformedResponse(_)));
    }

    #[test]
    fn parses_offline_channel_record() {
        let value = json!({
            "id": "111111",
            "broadcaster_login": "offlinestreamer1",
            "display_name": "OfflineStreamer1",
            "game_name": "Valorant",
            "is_live": false,
            "broadcaster_language": "de",
            "title": "Last stream title",
        });

        let raw = parse_channel(&value).unwrap();
        assert_eq!(raw.twitch_id, "111111");
        assert!(!raw.is_live);
        assert_eq!(raw.viewer_count, None);
        assert_eq!(raw.language.as_deref(), Some("de"));
    }

    #[test]
    fn parses_user_profile() {
        let value = json!({
            "id": "123456",
            "login": "teststreamer1",
            "display_name": "TestStreamer1",
            "broadcaster_type": "affiliate",
            "description": "Contact: business@teststreamer1.com",
        });

        let profile = parse_user(&value).unwrap();
        assert_eq!(profile.twitch_id, "123456");
        assert_eq!(profile.broadcaster_type.as_deref(), Some("affiliate"));
        assert_eq!(profile.follower_count, None);
    }

    #[test]
    fn empty_optional_fields_become_none() {
        let value = json!({
            "id": "123456",
            "login": "teststreamer1",
            "display_name": "TestStreamer1",
            "broadcaster_type": "",
            "description": "",
        });

        let profile = parse_user(&value).unwrap();
        assert_eq!(profile.broadcaster_type, None);
        assert_eq!(profile.description, None);
    }

    #[test]
    fn cursor_is_read_from_pagination_object() {
        let body = json!({"data": [], "pagination": {"cursor": "next_page_cursor"}});
        assert_eq!(parse_cursor(&body).as_deref(), Some("next_page_cursor"));

        let exhausted = json!({"data": [], "pagination": {}});
        assert_eq!(parse_cursor(&exhausted), None);
    }

    #[test]
    fn missing_data_array_is_malformed() {
        let body = json!({"error": "oops"});
        assert!(matches!(
            data_array(&body),
            Err(ScoutError::MalformedResponse(_))
        ));
    }

    #[test]
    fn reset_hint_accepts_seconds_delta() {
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Reset", "2".parse().unwrap());
        assert_eq!(parse_reset_hint(&headers), Duration::from_secs(2));
    }

    #[test]
    fn reset_hint_accepts_unix_timestamp() {
        let future = chrono::Utc::now().timestamp() as u64 + 5;
        let mut headers = HeaderMap::new();
        headers.insert("Ratelimit-Reset", future.to_string().parse().unwrap());
        let hint = parse_reset_hint(&headers);
        assert!(hint >= Duration::from_secs(4) && hint <= Duration::from_secs(6));
    }

    #[test]
    fn reset_hint_defaults_when_header_missing() {
        assert_eq!(parse_reset_hint(&HeaderMap::new()), Duration::from_secs(60));
    }
}
