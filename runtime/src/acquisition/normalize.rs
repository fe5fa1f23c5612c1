//! Map recognized raw records onto the canonical [`ContentItem`].
//!
//! Upstream fields are free text meant for display ("1,234 views", "12:03",
//! "3 hours ago"), so numeric parsing here is best-effort: anything
//! unparseable defaults to zero.

use crate::acquisition::collector::RawRecord;
use crate::acquisition::lazy_regex;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Title used when a primary video node carries none.
pub const DEFAULT_TITLE: &str = "Video";
/// Title used when a short-form node carries none.
pub const DEFAULT_SHORT_TITLE: &str = "Short";
/// Items at or under this duration are short-form.
pub const SHORT_MAX_SECONDS: u32 = 60;

/// Which channel page produced an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    /// Channel home page.
    Main,
    /// Short-form tab.
    Shorts,
    /// Full video listing tab.
    Videos,
}

impl SourceTag {
    /// Merge priority: earlier tags win deduplication.
    pub const PRIORITY: [SourceTag; 3] = [SourceTag::Main, SourceTag::Shorts, SourceTag::Videos];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTag::Main => "main",
            SourceTag::Shorts => "shorts",
            SourceTag::Videos => "videos",
        }
    }

    /// Path appended to the channel URL for this page.
    pub fn path_suffix(&self) -> &'static str {
        match self {
            SourceTag::Main => "",
            SourceTag::Shorts => "/shorts",
            SourceTag::Videos => "/videos",
        }
    }
}

impl std::fmt::Display for SourceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical content item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    pub id: String,
    pub title: String,
    pub thumbnail: Option<String>,
    /// Free-text publication time exactly as the page shows it.
    pub published_at: Option<String>,
    pub view_count: u64,
    pub url: String,
    pub duration_seconds: u32,
    pub is_short: bool,
    pub source: SourceTag,
}

/// Turns [`RawRecord`]s into [`ContentItem`]s.
#[derive(Debug, Clone)]
pub struct RecordNormalizer {
    /// Base of item URLs, e.g. `https://www.youtube.com`.
    base_url: String,
}

impl RecordNormalizer {
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Normalize one record. Returns `None` when it has no identifier.
    pub fn normalize(&self, record: &RawRecord<'_>, source: SourceTag) -> Option<ContentItem> {
        let fields = record.fields();
        let id = fields
            .get("videoId")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())?
            .to_string();

        let (title, published_at, duration_seconds, mut is_short) = match record {
            RawRecord::Video(f) => {
                let title = f
                    .get("title")
                    .and_then(rich_text)
                    .unwrap_or(DEFAULT_TITLE)
                    .to_string();
                let published = f.get("publishedTimeText").and_then(plain_text).map(String::from);
                let duration = f
                    .get("lengthText")
                    .and_then(plain_text)
                    .and_then(parse_duration);
                let explicit = explicit_short_signal(f);
                (title, published, duration, explicit)
            }
            RawRecord::Reel(f) => {
                let title = f
                    .get("headline")
                    .and_then(plain_text)
                    .unwrap_or(DEFAULT_SHORT_TITLE)
                    .to_string();
                let published = f.get("publishedTimeText").and_then(plain_text).map(String::from);
                let duration = f
                    .get("lengthText")
                    .and_then(plain_text)
                    .and_then(parse_duration);
                (title, published, duration, true)
            }
        };

        if matches!(duration_seconds, Some(d) if d <= SHORT_MAX_SECONDS) {
            is_short = true;
        }
        if has_short_keyword(&title) {
            is_short = true;
        }

        let view_count = fields
            .get("viewCountText")
            .and_then(plain_text)
            .map(parse_view_count)
            .unwrap_or(0);

        let url = if is_short {
            format!("{}/shorts/{id}", self.base_url)
        } else {
            format!("{}/watch?v={id}", self.base_url)
        };

        Some(ContentItem {
            thumbnail: best_thumbnail(fields),
            id,
            title,
            published_at,
            view_count,
            url,
            duration_seconds: duration_seconds.unwrap_or(0),
            is_short,
            source,
        })
    }
}

/// Text of a display field, preferring `runs[0].text` over `simpleText`.
fn rich_text(v: &Value) -> Option<&str> {
    first_run(v).or_else(|| v.get("simpleText").and_then(Value::as_str))
}

/// Text of a display field, preferring `simpleText` over `runs[0].text`.
fn plain_text(v: &Value) -> Option<&str> {
    v.get("simpleText").and_then(Value::as_str).or_else(|| first_run(v))
}

fn first_run(v: &Value) -> Option<&str> {
    v.get("runs")?.as_array()?.first()?.get("text")?.as_str()
}

/// Last (highest resolution) thumbnail URL.
fn best_thumbnail(fields: &Map<String, Value>) -> Option<String> {
    fields
        .get("thumbnail")?
        .get("thumbnails")?
        .as_array()?
        .last()?
        .get("url")?
        .as_str()
        .map(String::from)
}

/// Upstream marks some short-form entries inside primary nodes.
fn explicit_short_signal(fields: &Map<String, Value>) -> bool {
    fields.get("isShort").and_then(Value::as_bool).unwrap_or(false)
        || fields
            .get("navigationEndpoint")
            .and_then(|n| n.get("reelWatchEndpoint"))
            .is_some()
}

/// Parse "1,234,567 views" style text. Grouping separators and whitespace are
/// dropped and digits are read up to the first decimal point, so "1.2K views"
/// yields 1. Unparseable text yields 0.
pub fn parse_view_count(text: &str) -> u64 {
    let Some(start) = text.find(|c: char| c.is_ascii_digit()) else {
        return 0;
    };

    let digits: String = text[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == ',' || *c == '.' || c.is_whitespace())
        .filter(|c| *c != ',' && !c.is_whitespace())
        .take_while(|c| c.is_ascii_digit())
        .collect();

    digits.parse().unwrap_or(0)
}

/// Parse `H:MM:SS` or `M:SS` into seconds.
pub fn parse_duration(text: &str) -> Option<u32> {
    let parts: Vec<&str> = text.trim().split(':').collect();
    if !(2..=3).contains(&parts.len())
        || parts
            .iter()
            .any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return None;
    }

    parts
        .iter()
        .try_fold(0u32, |acc, p| acc.checked_mul(60)?.checked_add(p.parse().ok()?))
}

/// Whether a title carries a `#short`/`#shorts` hashtag.
pub fn has_short_keyword(title: &str) -> bool {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    lazy_regex(&RE, r"(?i)#shorts?\b").is_some_and(|re| re.is_match(title))
}
