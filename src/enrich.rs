//! Profile enrichment in bounded-size lookup batches.

use std::collections::HashMap;

use tracing::debug;

use crate::client::TwitchApi;
use crate::error::Result;
use crate::extractors;
use crate::types::{RawStreamer, Streamer, UserProfile};

/// Upstream accepts at most this many ids per users lookup.
pub const MAX_BATCH_SIZE: usize = 100;

/// Fetch profile detail for every id, one upstream call per chunk.
///
/// The returned map may be smaller than the input: ids the upstream could
/// not resolve (deleted or banned mid-run) are simply absent, and the caller
/// decides what to do about the gap.
pub async fn fetch_profiles(
    api: &dyn TwitchApi,
    ids: &[String],
) -> Result<HashMap<String, UserProfile>> {
    let mut profiles = HashMap::with_capacity(ids.len());
    for chunk in ids.chunks(MAX_BATCH_SIZE) {
        let users = api.get_users(chunk).await?;
        debug!(requested = chunk.len(), resolved = users.len(), "enrichment batch");
        for user in users {
            profiles.insert(user.twitch_id.clone(), user);
        }
    }
    Ok(profiles)
}

/// Merge a resolved profile into a discovery record and extract contact
/// signals from its description.
pub fn build_streamer(raw: RawStreamer, profile: &UserProfile) -> Streamer {
    let mut streamer = Streamer::from_raw(raw);
    streamer.broadcaster_type = profile.broadcaster_type.clone();
    streamer.follower_count = profile.follower_count;
    if let Some(description) = &profile.description {
        streamer.emails = extractors::extract_emails(description);
        streamer.social_links = extractors::extract_social_links(description);
        streamer.description = Some(description.clone());
    }
    streamer
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::types::{GameInfo, Page};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Resolves every requested id and counts upstream calls.
    struct CountingApi {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TwitchApi for CountingApi {
        async fn ensure_authenticated(&self) -> Result<()> {
            Ok(())
        }

        async fn get_streams(
            &self,
            _game_id: Option<&str>,
            _language: Option<&str>,
            _first: u32,
            _after: Option<&str>,
        ) -> Result<Page<RawStreamer>> {
            Ok(Page::default())
        }

        async fn search_channels(
            &self,
            _query: &str,
            _first: u32,
            _after: Option<&str>,
            _live_only: bool,
        ) -> Result<Page<RawStreamer>> {
            Ok(Page::default())
        }

        async fn get_users(&self, ids: &[String]) -> Result<Vec<UserProfile>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert!(ids.len() <= MAX_BATCH_SIZE);
            Ok(ids
                .iter()
                .map(|id| UserProfile {
                    twitch_id: id.clone(),
                    login: format!("login_{id}"),
                    display_name: format!("User{id}"),
                    broadcaster_type: None,
                    description: None,
                    follower_count: None,
                })
                .collect())
        }

        async fn get_game_id(&self, _name: &str) -> Result<Option<String>> {
            Ok(None)
        }

        async fn search_games(&self, _query: &str) -> Result<Vec<GameInfo>> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn batches_are_capped_at_one_hundred() {
        let api = CountingApi {
            calls: AtomicUsize::new(0),
        };
        let ids: Vec<String> = (0..150).map(|i| i.to_string()).collect();

        let profiles = fetch_profiles(&api, &ids).await.unwrap();

        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
        assert_eq!(profiles.len(), 150);
    }

    #[tokio::test]
    async fn empty_input_issues_no_calls() {
        let api = CountingApi {
            calls: AtomicUsize::new(0),
        };
        let profiles = fetch_profiles(&api, &[]).await.unwrap();
        assert!(profiles.is_empty());
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn build_streamer_extracts_contact_signals() {
        let raw = RawStreamer {
            twitch_id: "123456".to_string(),
            username: "teststreamer".to_string(),
            display_name: "TestStreamer".to_string(),
            is_live: true,
            viewer_count: Some(250),
            game_name: Some("Valorant".to_string()),
            language: Some("de".to_string()),
        };
        let profile = UserProfile {
            twitch_id: "123456".to_string(),
            login: "teststreamer".to_string(),
            display_name: "TestStreamer".to_string(),
            broadcaster_type: Some("affiliate".to_string()),
            description: Some(
                "Contact: business@teststreamer.com | https://twitter.com/teststreamer"
                    .to_string(),
            ),
            follower_count: None,
        };

        let streamer = build_streamer(raw, &profile);
        assert_eq!(streamer.emails, ["business@teststreamer.com"]);
        assert_eq!(
            streamer.social_links.twitter.as_deref(),
            Some("https://twitter.com/teststreamer")
        );
        assert_eq!(streamer.broadcaster_type.as_deref(), Some("affiliate"));
        assert!(streamer.is_live);
    }
}
