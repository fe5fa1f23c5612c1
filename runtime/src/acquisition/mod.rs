//! Page acquisition: fetch raw pages, pull out embedded state, and turn the
//! records found there into canonical items.
//!
//! Nothing in here renders pages. Channel listings are read from the JSON
//! state object the page ships inline; post listings from the public widget
//! markup or the posts API.

pub mod collector;
pub mod http_client;
pub mod island;
pub mod normalize;
pub mod posts;
pub mod recency;

use regex::Regex;
use std::sync::OnceLock;

/// Compile `pattern` once into `cell`. Returns `None` only if the pattern is invalid.
pub(crate) fn lazy_regex(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}
