//! OAuth2 client-credentials session management.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::config::Settings;
use crate::error::{Result, ScoutError};

/// Refresh the token while this much lifetime remains.
const REFRESH_MARGIN: Duration = Duration::from_secs(5 * 60);

/// An opaque bearer token with its expiry instant.
///
/// Replaced wholesale on refresh, never mutated in place.
#[derive(Debug, Clone)]
pub struct Credential {
    access_token: String,
    expires_at: Instant,
}

impl Credential {
    pub fn new(access_token: String, ttl: Duration) -> Self {
        Credential {
            access_token,
            expires_at: Instant::now() + ttl,
        }
    }

    pub fn token(&self) -> &str {
        &self.access_token
    }

    pub fn remaining_lifetime(&self) -> Duration {
        self.expires_at.saturating_duration_since(Instant::now())
    }

    pub fn needs_refresh(&self, margin: Duration) -> bool {
        self.remaining_lifetime() <= margin
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Owns the bearer credential used by every API request.
///
/// The cache lock is held across the exchange so concurrent callers seeing an
/// expired token trigger exactly one refresh.
pub struct TokenManager {
    settings: Settings,
    http: Client,
    cached: Mutex<Option<Credential>>,
}

impl TokenManager {
    pub fn new(settings: Settings, http: Client) -> Self {
        TokenManager {
            settings,
            http,
            cached: Mutex::new(None),
        }
    }

    /// Return a valid bearer token, exchanging credentials when none is
    /// cached or the cached one is near expiry.
    pub async fn get_token(&self) -> Result<String> {
        Ok(self.get_credential().await?.token().to_string())
    }

    /// Like [`get_token`](Self::get_token) but returns the full credential.
    pub async fn get_credential(&self) -> Result<Credential> {
        let mut cached = self.cached.lock().await;
        if let Some(credential) = cached.as_ref() {
            if !credential.needs_refresh(REFRESH_MARGIN) {
                return Ok(credential.clone());
            }
            debug!("cached token near expiry, refreshing");
        }
        let credential = self.exchange().await?;
        info!(
            expires_in_secs = credential.remaining_lifetime().as_secs(),
            "obtained fresh access token"
        );
        *cached = Some(credential.clone());
        Ok(credential)
    }

    /// Drop the cached credential so the next request performs a fresh
    /// exchange. Called when a request is rejected despite a "valid" token.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    async fn exchange(&self) -> Result<Credential> {
        let response = self
            .http
            .post(&self.settings.auth_url)
            .form(&[
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("grant_type", "client_credentials"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(ScoutError::Transient(format!(
                    "token endpoint returned {status}: {body}"
                )));
            }
            return Err(ScoutError::Authentication(format!(
                "token exchange rejected: {status}: {body}"
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| ScoutError::MalformedResponse(format!("token response: {e}")))?;

        Ok(Credential::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}
