//! Input validation and outbound response shapes.
//!
//! Everything a caller sends is checked here before any fetch is attempted.

use crate::acquisition::lazy_regex;
use crate::acquisition::normalize::ContentItem;
use crate::acquisition::posts::{ChannelInfo, PostItem};
use crate::error::{FeedError, FeedResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Default number of items in a listing.
pub const DEFAULT_MAX_RESULTS: usize = 50;
/// Upper bound on requested items.
pub const MAX_RESULTS_LIMIT: usize = 100;

/// Normalize and validate a subject handle. A leading `@` is dropped.
pub fn validate_handle(raw: Option<&str>) -> FeedResult<String> {
    static HANDLE: OnceLock<Option<Regex>> = OnceLock::new();

    let handle = raw.unwrap_or("").trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle).trim();
    if handle.is_empty() {
        return Err(FeedError::MissingHandle);
    }

    match lazy_regex(&HANDLE, r"^[A-Za-z0-9_-]{2,100}$") {
        Some(re) if re.is_match(handle) => Ok(handle.to_string()),
        _ => Err(FeedError::InvalidHandle(handle.to_string())),
    }
}

/// Parse a requested item count and clamp it into `1..=100`. Missing,
/// unparseable or zero values mean the default.
pub fn clamp_max_results(raw: Option<&str>) -> usize {
    match raw.map(str::trim).and_then(|s| s.parse::<i64>().ok()) {
        None | Some(0) => DEFAULT_MAX_RESULTS,
        Some(n) if n < 0 => 1,
        Some(n) => usize::try_from(n).unwrap_or(MAX_RESULTS_LIMIT).min(MAX_RESULTS_LIMIT),
    }
}

/// Listing sort key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    /// Merge order: main, then shorts, then videos.
    #[default]
    Source,
    Views,
    Date,
}

impl SortBy {
    pub fn parse(raw: Option<&str>) -> FeedResult<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("source") => Ok(SortBy::Source),
            Some("views") => Ok(SortBy::Views),
            Some("date") => Ok(SortBy::Date),
            Some(other) => Err(FeedError::InvalidParam {
                name: "sort",
                value: other.to_string(),
            }),
        }
    }
}

/// Listing sort direction. Descending puts the most viewed or newest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Desc,
    Asc,
}

impl SortOrder {
    pub fn parse(raw: Option<&str>) -> FeedResult<Self> {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("desc") => Ok(SortOrder::Desc),
            Some("asc") => Ok(SortOrder::Asc),
            Some(other) => Err(FeedError::InvalidParam {
                name: "order",
                value: other.to_string(),
            }),
        }
    }
}

/// A validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingQuery {
    pub handle: String,
    pub max_results: usize,
    pub sort: SortBy,
    pub order: SortOrder,
    /// Keep only short-form items.
    pub shorts_only: bool,
}

impl ListingQuery {
    /// Validate raw request parameters.
    pub fn parse(
        handle: Option<&str>,
        max_results: Option<&str>,
        sort: Option<&str>,
        order: Option<&str>,
    ) -> FeedResult<Self> {
        Ok(Self {
            handle: validate_handle(handle)?,
            max_results: clamp_max_results(max_results),
            sort: SortBy::parse(sort)?,
            order: SortOrder::parse(order)?,
            shorts_only: false,
        })
    }

    pub fn shorts_only(mut self) -> Self {
        self.shorts_only = true;
        self
    }

    /// Cache key of the merged listing. Sorting, filtering and truncation
    /// are applied per request on top of it, so every query shape for one
    /// handle shares an entry.
    pub fn cache_key(&self) -> String {
        self.handle.to_ascii_lowercase()
    }
}

/// Content listing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoListResponse {
    pub items: Vec<ContentItem>,
    pub cached: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Post listing response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostsResponse {
    pub posts: Vec<PostItem>,
    pub channel: ChannelInfo,
    #[serde(default)]
    pub cached: bool,
}

/// Channel metric response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSnapshot {
    pub title: String,
    pub username: String,
    pub subscribers: Option<i64>,
    #[serde(rename = "delta24h")]
    pub delta_24h: Option<i64>,
    #[serde(rename = "delta7d")]
    pub delta_7d: Option<i64>,
    pub photo: Option<String>,
}
