//! Extraction of social links and email addresses from channel descriptions.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::SocialLinks;

static TWITTER_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?(?:twitter\.com|x\.com)/([a-zA-Z0-9_]+)").unwrap()
});

static INSTAGRAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?instagram\.com/([a-zA-Z0-9_.]+)").unwrap()
});

static YOUTUBE_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:https?://)?(?:www\.)?youtube\.com/(?:c/|channel/|user/|@)?([a-zA-Z0-9_-]+)")
            .unwrap(),
        Regex::new(r"(?i)(?:https?://)?(?:www\.)?youtu\.be/([a-zA-Z0-9_-]+)").unwrap(),
    ]
});

static DISCORD_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)(?:https?://)?(?:www\.)?discord\.gg/([a-zA-Z0-9]+)").unwrap(),
        Regex::new(r"(?i)(?:https?://)?(?:www\.)?discord\.com/invite/([a-zA-Z0-9]+)").unwrap(),
    ]
});

static TIKTOK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:https?://)?(?:www\.)?tiktok\.com/@([a-zA-Z0-9_.]+)").unwrap()
});

static EMAIL_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

/// Placeholder addresses that show up in descriptions verbatim.
static FALSE_POSITIVE_EMAILS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        "example@example.com",
        "email@example.com",
        "your@email.com",
        "youremail@email.com",
        "noreply@twitch.tv",
        "support@twitch.tv",
        "test@test.com",
        "user@domain.com",
    ])
});

static FALSE_POSITIVE_EMAIL_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    vec![
        Regex::new(r"(?i)^noreply@").unwrap(),
        Regex::new(r"(?i)^no-reply@").unwrap(),
        Regex::new(r"(?i)^donotreply@").unwrap(),
        Regex::new(r"(?i)^support@").unwrap(),
        Regex::new(r"(?i)^info@twitch").unwrap(),
        Regex::new(r"(?i)@example\.").unwrap(),
    ]
});

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

pub fn extract_twitter(text: &str) -> Option<String> {
    first_capture(&TWITTER_PATTERN, text).map(|user| format!("https://twitter.com/{user}"))
}

pub fn extract_instagram(text: &str) -> Option<String> {
    first_capture(&INSTAGRAM_PATTERN, text).map(|user| format!("https://instagram.com/{user}"))
}

pub fn extract_youtube(text: &str) -> Option<String> {
    YOUTUBE_PATTERNS
        .iter()
        .find_map(|pattern| first_capture(pattern, text))
        .map(|id| format!("https://youtube.com/{id}"))
}

pub fn extract_discord(text: &str) -> Option<String> {
    DISCORD_PATTERNS
        .iter()
        .find_map(|pattern| first_capture(pattern, text))
        .map(|code| format!("https://discord.gg/{code}"))
}

pub fn extract_tiktok(text: &str) -> Option<String> {
    first_capture(&TIKTOK_PATTERN, text).map(|user| format!("https://tiktok.com/@{user}"))
}

/// Extract all social media links from a channel description.
pub fn extract_social_links(text: &str) -> SocialLinks {
    if text.is_empty() {
        return SocialLinks::default();
    }
    SocialLinks {
        twitter: extract_twitter(text),
        instagram: extract_instagram(text),
        youtube: extract_youtube(text),
        discord: extract_discord(text),
        tiktok: extract_tiktok(text),
        other: Vec::new(),
    }
}

fn is_false_positive(email: &str) -> bool {
    let lowered = email.to_lowercase();
    FALSE_POSITIVE_EMAILS.contains(lowered.as_str())
        || FALSE_POSITIVE_EMAIL_PATTERNS
            .iter()
            .any(|pattern| pattern.is_match(&lowered))
}

/// Extract email addresses, dropping known placeholders and duplicates.
/// The first spelling of an address wins; comparison is case-insensitive.
pub fn extract_emails(text: &str) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut seen = HashSet::new();
    let mut emails = Vec::new();
    for m in EMAIL_PATTERN.find_iter(text) {
        let email = m.as_str();
        let lowered = email.to_lowercase();
        if seen.contains(&lowered) || is_false_positive(email) {
            continue;
        }
        seen.insert(lowered);
        emails.push(email.to_string());
    }
    emails
}
