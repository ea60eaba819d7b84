use std::env;
use std::time::Duration;

use crate::error::{Result, ScoutError};

const DEFAULT_API_BASE_URL: &str = "https://api.twitch.tv/helix";
const DEFAULT_AUTH_URL: &str = "https://id.twitch.tv/oauth2/token";
const DEFAULT_RATE_LIMIT_REQUESTS: usize = 800;
const DEFAULT_RATE_LIMIT_PERIOD_SECS: u64 = 60;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Application settings, loaded from the environment.
#[derive(Debug, Clone)]
pub struct Settings {
    pub client_id: String,
    pub client_secret: String,
    pub api_base_url: String,
    pub auth_url: String,
    pub rate_limit_requests: usize,
    pub rate_limit_period: Duration,
    pub request_timeout: Duration,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// `TWITCH_CLIENT_ID` and `TWITCH_CLIENT_SECRET` are required; everything
    /// else has a default and can be overridden.
    pub fn from_env() -> Result<Self> {
        let client_id = required_var("TWITCH_CLIENT_ID")?;
        let client_secret = required_var("TWITCH_CLIENT_SECRET")?;

        let api_base_url =
            env::var("TWITCH_API_BASE_URL").unwrap_or_else(|_| DEFAULT_API_BASE_URL.to_string());
        let auth_url =
            env::var("TWITCH_AUTH_URL").unwrap_or_else(|_| DEFAULT_AUTH_URL.to_string());

        let rate_limit_requests =
            parsed_var("STREAMSCOUT_RATE_LIMIT", DEFAULT_RATE_LIMIT_REQUESTS)?;
        let rate_limit_period_secs =
            parsed_var("STREAMSCOUT_RATE_PERIOD_SECS", DEFAULT_RATE_LIMIT_PERIOD_SECS)?;
        let request_timeout_secs =
            parsed_var("STREAMSCOUT_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;

        if rate_limit_requests == 0 {
            return Err(ScoutError::Config(
                "STREAMSCOUT_RATE_LIMIT must be at least 1".to_string(),
            ));
        }

        Ok(Settings {
            client_id,
            client_secret,
            api_base_url,
            auth_url,
            rate_limit_requests,
            rate_limit_period: Duration::from_secs(rate_limit_period_secs),
            request_timeout: Duration::from_secs(request_timeout_secs),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    env::var(name)
        .map_err(|_| ScoutError::Config(format!("environment variable {name} is not set")))
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| ScoutError::Config(format!("could not parse {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
