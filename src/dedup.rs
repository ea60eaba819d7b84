//! Identity-keyed record folding across discovery phases.

use std::collections::HashMap;

use crate::types::RawStreamer;

/// Insertion-ordered record set keyed by Twitch user id.
///
/// Live listings reorder between polls, so the same streamer can arrive from
/// two consecutive pages or from both discovery phases. Merging is
/// idempotent: a later arrival never overwrites a field an earlier arrival
/// populated, with one exception — liveness is time-sensitive, so a live
/// sighting supersedes a stale offline flag.
#[derive(Debug, Default, Clone)]
pub struct Deduplicator {
    order: Vec<String>,
    by_id: HashMap<String, RawStreamer>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a record into the set. Returns true when the identity was new.
    pub fn merge(&mut self, raw: RawStreamer) -> bool {
        match self.by_id.get_mut(&raw.twitch_id) {
            Some(existing) => {
                merge_into(existing, raw);
                false
            }
            None => {
                self.order.push(raw.twitch_id.clone());
                self.by_id.insert(raw.twitch_id.clone(), raw);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.by_id.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&RawStreamer> {
        self.by_id.get(id)
    }

    /// Identities in insertion order.
    pub fn ids(&self) -> impl Iterator<Item = &String> {
        self.order.iter()
    }

    /// Records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &RawStreamer> {
        self.order.iter().filter_map(|id| self.by_id.get(id))
    }
}

fn merge_into(existing: &mut RawStreamer, incoming: RawStreamer) {
    if incoming.is_live && !existing.is_live {
        existing.is_live = true;
        existing.viewer_count = incoming.viewer_count.or(existing.viewer_count);
    }
    if existing.viewer_count.is_none() {
        existing.viewer_count = incoming.viewer_count;
    }
    if existing.game_name.is_none() {
        existing.game_name = incoming.game_name;
    }
    if existing.language.is_none() {
        existing.language = incoming.language;
    }
    if existing.display_name.is_empty() {
        existing.display_name = incoming.display_name;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(id: &str, viewers: u64) -> RawStreamer {
        RawStreamer {
            twitch_id: id.to_string(),
            username: format!("user_{id}"),
            display_name: format!("User{id}"),
            is_live: true,
            viewer_count: Some(viewers),
            game_name: Some("Valorant".to_string()),
            language: Some("de".to_string()),
        }
    }

    fn offline(id: &str) -> RawStreamer {
        RawStreamer {
            twitch_id: id.to_string(),
            username: format!("user_{id}"),
            display_name: format!("User{id}"),
            is_live: false,
            viewer_count: None,
            game_name: None,
            language: None,
        }
    }

    #[test]
    fn merge_is_idempotent() {
        let mut once = Deduplicator::new();
        once.merge(live("1", 250));

        let mut twice = Deduplicator::new();
        twice.merge(live("1", 250));
        twice.merge(live("1", 250));

        assert_eq!(once.len(), twice.len());
        assert_eq!(once.get("1"), twice.get("1"));
    }

    #[test]
    fn overlapping_pages_collapse_to_one_identity() {
        let mut dedup = Deduplicator::new();
        for raw in [live("A", 10), live("B", 20), live("B", 20), live("C", 30)] {
            dedup.merge(raw);
        }
        let ids: Vec<&str> = dedup.ids().map(String::as_str).collect();
        assert_eq!(ids, ["A", "B", "C"]);
    }

    #[test]
    fn live_sighting_supersedes_stale_offline_flag() {
        let mut dedup = Deduplicator::new();
        dedup.merge(offline("1"));
        dedup.merge(live("1", 42));

        let merged = dedup.get("1").unwrap();
        assert!(merged.is_live);
        assert_eq!(merged.viewer_count, Some(42));
    }

    #[test]
    fn stale_offline_arrival_does_not_clear_live_data() {
        let mut dedup = Deduplicator::new();
        dedup.merge(live("1", 42));
        dedup.merge(offline("1"));

        let merged = dedup.get("1").unwrap();
        assert!(merged.is_live);
        assert_eq!(merged.viewer_count, Some(42));
        assert_eq!(merged.game_name.as_deref(), Some("Valorant"));
    }

    #[test]
    fn later_arrival_fills_missing_fields_only() {
        let mut dedup = Deduplicator::new();
        let mut first = live("1", 42);
        first.game_name = None;
        dedup.merge(first);

        let mut second = live("1", 9000);
        second.game_name = Some("Chess".to_string());
        dedup.merge(second);

        let merged = dedup.get("1").unwrap();
        // Populated fields keep their first value; gaps are filled.
        assert_eq!(merged.viewer_count, Some(42));
        assert_eq!(merged.game_name.as_deref(), Some("Chess"));
    }

    #[test]
    fn insertion_order_is_preserved() {
        let mut dedup = Deduplicator::new();
        for id in ["C", "A", "B"] {
            dedup.merge(offline(id));
        }
        dedup.merge(live("A", 1));
        let ids: Vec<&str> = dedup.ids().map(String::as_str).collect();
        assert_eq!(ids, ["C", "A", "B"]);
    }
}
