//! Export of collected records to CSV and JSON files.

use std::fs;
use std::path::PathBuf;

use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tracing::info;

use crate::error::Result;
use crate::types::{ExportConfig, ExportFormat, SearchCriteria, Streamer};

const CSV_COLUMNS: [&str; 14] = [
    "username",
    "display_name",
    "twitch_id",
    "is_live",
    "viewer_count",
    "game_name",
    "language",
    "broadcaster_type",
    "email",
    "twitter",
    "instagram",
    "youtube",
    "discord",
    "tiktok",
];

/// Write the record set in the configured format.
pub fn write(
    streamers: &[Streamer],
    config: &ExportConfig,
    criteria: &SearchCriteria,
) -> Result<PathBuf> {
    let path = match config.format {
        ExportFormat::Csv => export_to_csv(streamers, config)?,
        ExportFormat::Json => export_to_json(streamers, config, criteria)?,
    };
    info!(path = %path.display(), records = streamers.len(), "export complete");
    Ok(path)
}

/// CSV with a fixed column order. Written with a UTF-8 BOM so spreadsheet
/// tools pick up the encoding.
pub fn export_to_csv(streamers: &[Streamer], config: &ExportConfig) -> Result<PathBuf> {
    let mut out = String::new();
    out.push('\u{feff}');
    out.push_str(&CSV_COLUMNS.join(","));
    out.push_str("\r\n");

    for streamer in streamers {
        let row = csv_row(streamer)
            .iter()
            .map(|field| csv_escape(field))
            .collect::<Vec<_>>()
            .join(",");
        out.push_str(&row);
        out.push_str("\r\n");
    }

    fs::write(&config.output_path, out)?;
    Ok(config.output_path.clone())
}

fn csv_row(streamer: &Streamer) -> Vec<String> {
    let links = &streamer.social_links;
    vec![
        streamer.username.clone(),
        streamer.display_name.clone(),
        streamer.twitch_id.clone(),
        streamer.is_live.to_string(),
        streamer
            .viewer_count
            .map(|v| v.to_string())
            .unwrap_or_default(),
        streamer.game_name.clone().unwrap_or_default(),
        streamer.language.clone().unwrap_or_default(),
        streamer.broadcaster_type.clone().unwrap_or_default(),
        streamer.emails.first().cloned().unwrap_or_default(),
        links.twitter.clone().unwrap_or_default(),
        links.instagram.clone().unwrap_or_default(),
        links.youtube.clone().unwrap_or_default(),
        links.discord.clone().unwrap_or_default(),
        links.tiktok.clone().unwrap_or_default(),
    ]
}

fn csv_escape(field: &str) -> String {
    if field.contains(['"', ',', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// JSON document with run metadata ahead of the record list.
pub fn export_to_json(
    streamers: &[Streamer],
    config: &ExportConfig,
    criteria: &SearchCriteria,
) -> Result<PathBuf> {
    let document = json!({
        "metadata": {
            "generated_at": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
            "total_results": streamers.len(),
            "search_criteria": {
                "game": criteria.game_name,
                "game_id": criteria.game_id,
                "min_viewers": criteria.min_viewers,
                "max_viewers": criteria.max_viewers,
                "language": criteria.language,
                "include_offline": criteria.include_offline,
                "limit": criteria.limit,
            },
        },
        "streamers": streamers.iter().map(streamer_json).collect::<Vec<_>>(),
    });

    fs::write(&config.output_path, serde_json::to_string_pretty(&document)?)?;
    Ok(config.output_path.clone())
}

fn streamer_json(streamer: &Streamer) -> Value {
    json!({
        "twitch_id": streamer.twitch_id,
        "username": streamer.username,
        "display_name": streamer.display_name,
        "is_live": streamer.is_live,
        "viewer_count": streamer.viewer_count,
        "game_name": streamer.game_name,
        "language": streamer.language,
        "broadcaster_type": streamer.broadcaster_type,
        "follower_count": streamer.follower_count,
        "emails": streamer.emails,
        "social_links": {
            "twitter": streamer.social_links.twitter,
            "instagram": streamer.social_links.instagram,
            "youtube": streamer.social_links.youtube,
            "discord": streamer.social_links.discord,
            "tiktok": streamer.social_links.tiktok,
        },
        "last_updated": streamer.last_updated.to_rfc3339(),
    })
}
