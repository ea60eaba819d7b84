use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoutError};

/// Social media links extracted from a channel description.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    pub twitter: Option<String>,
    pub instagram: Option<String>,
    pub youtube: Option<String>,
    pub discord: Option<String>,
    pub tiktok: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub other: Vec<String>,
}

impl SocialLinks {
    /// True when at least one platform link was found.
    pub fn any(&self) -> bool {
        self.twitter.is_some()
            || self.instagram.is_some()
            || self.youtube.is_some()
            || self.discord.is_some()
            || self.tiktok.is_some()
            || !self.other.is_empty()
    }
}

/// A streamer as seen by a single discovery phase, before enrichment.
///
/// Required fields are validated where the record is parsed off the wire;
/// everything optional really is absent on some upstream payloads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawStreamer {
    pub twitch_id: String,
    pub username: String,
    pub display_name: String,
    pub is_live: bool,
    pub viewer_count: Option<u64>,
    pub game_name: Option<String>,
    pub language: Option<String>,
}

/// A fully collected streamer record with profile data and contact signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Streamer {
    pub twitch_id: String,
    pub username: String,
    pub display_name: String,
    pub description: Option<String>,
    pub broadcaster_type: Option<String>,
    pub follower_count: Option<u64>,
    pub is_live: bool,
    pub viewer_count: Option<u64>,
    pub game_name: Option<String>,
    pub language: Option<String>,
    pub emails: Vec<String>,
    pub social_links: SocialLinks,
    pub last_updated: DateTime<Utc>,
}

impl Streamer {
    pub fn from_raw(raw: RawStreamer) -> Self {
        Streamer {
            twitch_id: raw.twitch_id,
            username: raw.username,
            display_name: raw.display_name,
            description: None,
            broadcaster_type: None,
            follower_count: None,
            is_live: raw.is_live,
            viewer_count: raw.viewer_count,
            game_name: raw.game_name,
            language: raw.language,
            emails: Vec::new(),
            social_links: SocialLinks::default(),
            last_updated: Utc::now(),
        }
    }
}

/// Profile detail returned by the users endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub twitch_id: String,
    pub login: String,
    pub display_name: String,
    pub broadcaster_type: Option<String>,
    pub description: Option<String>,
    pub follower_count: Option<u64>,
}

/// A game/category as returned by the games endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameInfo {
    pub id: String,
    pub name: String,
}

/// One page of a cursor-paginated listing.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Page {
            items: Vec::new(),
            cursor: None,
        }
    }
}

/// Input parameters for a streamer search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub min_viewers: u64,
    pub max_viewers: Option<u64>,
    pub game_name: Option<String>,
    pub game_id: Option<String>,
    pub language: Option<String>,
    pub include_offline: bool,
    pub limit: usize,
}

impl Default for SearchCriteria {
    fn default() -> Self {
        SearchCriteria {
            min_viewers: 0,
            max_viewers: None,
            game_name: None,
            game_id: None,
            language: None,
            include_offline: true,
            limit: 100,
        }
    }
}

impl SearchCriteria {
    /// Validate bounds before any network call is made.
    pub fn validate(&self) -> Result<()> {
        if let Some(max) = self.max_viewers {
            if max <= self.min_viewers {
                return Err(ScoutError::InvalidCriteria(
                    "max_viewers must be greater than min_viewers".to_string(),
                ));
            }
        }
        if self.limit < 1 || self.limit > 10_000 {
            return Err(ScoutError::InvalidCriteria(
                "limit must be between 1 and 10000".to_string(),
            ));
        }
        Ok(())
    }
}

/// Output file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Csv,
    Json,
}

impl FromStr for ExportFormat {
    type Err = ScoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "json" => Ok(ExportFormat::Json),
            other => Err(ScoutError::InvalidCriteria(format!(
                "format must be 'csv' or 'json', got '{other}'"
            ))),
        }
    }
}

/// Configuration for data export.
#[derive(Debug, Clone)]
pub struct ExportConfig {
    pub format: ExportFormat,
    pub output_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn criteria_defaults_are_valid() {
        assert!(SearchCriteria::default().validate().is_ok());
    }

    #[test]
    fn criteria_rejects_inverted_viewer_bounds() {
        let criteria = SearchCriteria {
            min_viewers: 500,
            max_viewers: Some(50),
            ..Default::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn criteria_rejects_equal_viewer_bounds() {
        let criteria = SearchCriteria {
            min_viewers: 100,
            max_viewers: Some(100),
            ..Default::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn criteria_rejects_zero_limit() {
        let criteria = SearchCriteria {
            limit: 0,
            ..Default::default()
        };
        assert!(criteria.validate().is_err());
    }

    #[test]
    fn export_format_parses_case_insensitively() {
        assert_eq!("CSV".parse::<ExportFormat>().unwrap(), ExportFormat::Csv);
        assert_eq!("json".parse::<ExportFormat>().unwrap(), ExportFormat::Json);
        assert!("xml".parse::<ExportFormat>().is_err());
    }
}
