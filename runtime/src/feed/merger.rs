//! Concurrent multi-page fetch with per-page extraction and priority merge.
//!
//! Each channel page is fetched and parsed independently; a page that fails
//! at any step contributes nothing. Completion order does not matter: pages
//! are re-ordered by source priority before deduplication, so an item seen on
//! several pages keeps the tag of the highest-priority one.

use crate::acquisition::collector::{collect_with_limit, DEFAULT_MAX_DEPTH, VIDEO_RECOGNIZERS};
use crate::acquisition::http_client::{fetch_with_timeout, Fetch, TransportError};
use crate::acquisition::island::{extract_island, INITIAL_DATA_MARKER};
use crate::acquisition::normalize::{ContentItem, RecordNormalizer, SourceTag};
use crate::acquisition::recency::estimate_published_at;
use crate::protocol::{SortBy, SortOrder};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// One page to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePage {
    pub tag: SourceTag,
    pub url: String,
}

/// Channel pages for `handle`, in priority order.
pub fn channel_pages(base_url: &str, handle: &str) -> Vec<SourcePage> {
    let base = base_url.trim_end_matches('/');
    SourceTag::PRIORITY
        .iter()
        .map(|tag| SourcePage {
            tag: *tag,
            url: format!("{base}/@{handle}{}", tag.path_suffix()),
        })
        .collect()
}

/// Why a page contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageFailure {
    Transport(TransportError),
    Status(u16),
    NoIsland,
}

impl std::fmt::Display for PageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PageFailure::Transport(e) => write!(f, "{e}"),
            PageFailure::Status(s) => write!(f, "HTTP {s}"),
            PageFailure::NoIsland => f.write_str("no embedded page state"),
        }
    }
}

/// Result of one merge.
#[derive(Debug, Clone, Default)]
pub struct MergeOutcome {
    /// Deduplicated items in source-priority order.
    pub items: Vec<ContentItem>,
    /// Pages that produced a decodable state object.
    pub pages_ok: usize,
    /// Pages that did not, with the reason.
    pub failures: Vec<(SourceTag, PageFailure)>,
}

impl MergeOutcome {
    /// Whether every page failed.
    pub fn total_failure(&self) -> bool {
        self.pages_ok == 0
    }

    /// Whether every failure was a name-resolution failure, with the host.
    pub fn dns_failure_host(&self) -> Option<&str> {
        let mut host = None;
        for (_, failure) in &self.failures {
            match failure {
                PageFailure::Transport(e) if e.is_dns() => host = Some(e.host()),
                _ => return None,
            }
        }
        host
    }

    /// One-line summary of the failures, for error messages.
    pub fn failure_summary(&self) -> String {
        self.failures
            .iter()
            .map(|(tag, f)| format!("{tag}: {f}"))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Fetches channel pages concurrently and merges their items.
#[derive(Clone)]
pub struct SourceMerger {
    fetcher: Arc<dyn Fetch>,
    normalizer: RecordNormalizer,
    timeout: Duration,
}

impl SourceMerger {
    pub fn new(fetcher: Arc<dyn Fetch>, normalizer: RecordNormalizer, timeout: Duration) -> Self {
        Self {
            fetcher,
            normalizer,
            timeout,
        }
    }

    /// Fetch every page concurrently, then merge in the order `pages` is given.
    pub async fn fetch_all(&self, pages: &[SourcePage]) -> MergeOutcome {
        let results: Vec<(usize, SourceTag, Result<Vec<ContentItem>, PageFailure>)> =
            stream::iter(pages.iter().cloned().enumerate())
                .map(|(idx, page)| {
                    let merger = self.clone();
                    async move {
                        let result = merger.load_page(&page).await;
                        (idx, page.tag, result)
                    }
                })
                .buffer_unordered(pages.len().max(1))
                .collect()
                .await;

        let mut ordered = results;
        ordered.sort_by_key(|(idx, _, _)| *idx);

        let mut outcome = MergeOutcome::default();
        let mut per_page = Vec::with_capacity(ordered.len());
        for (_, tag, result) in ordered {
            match result {
                Ok(items) => {
                    outcome.pages_ok += 1;
                    per_page.push(items);
                }
                Err(failure) => {
                    tracing::warn!("source page {tag} contributed nothing: {failure}");
                    outcome.failures.push((tag, failure));
                }
            }
        }

        outcome.items = dedup_by_id(per_page.into_iter().flatten());
        tracing::info!(
            "merged {} items from {}/{} pages",
            outcome.items.len(),
            outcome.pages_ok,
            pages.len()
        );
        outcome
    }

    async fn load_page(&self, page: &SourcePage) -> Result<Vec<ContentItem>, PageFailure> {
        let resp = fetch_with_timeout(self.fetcher.as_ref(), &page.url, self.timeout)
            .await
            .map_err(PageFailure::Transport)?;
        if !resp.ok() {
            return Err(PageFailure::Status(resp.status));
        }

        let island = extract_island(&resp.body, INITIAL_DATA_MARKER).ok_or(PageFailure::NoIsland)?;
        let collection = collect_with_limit(&island, &VIDEO_RECOGNIZERS, DEFAULT_MAX_DEPTH);
        let items: Vec<ContentItem> = collection
            .records
            .iter()
            .filter_map(|r| self.normalizer.normalize(r, page.tag))
            .collect();

        tracing::debug!(
            "page {}: {} records, {} items",
            page.tag,
            collection.records.len(),
            items.len()
        );
        Ok(items)
    }
}

/// Keep the first occurrence of each id.
pub fn dedup_by_id(items: impl IntoIterator<Item = ContentItem>) -> Vec<ContentItem> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.id.clone()))
        .collect()
}

/// Sort in place. `Source` leaves merge order untouched; ties keep merge order.
pub fn sort_items(items: &mut [ContentItem], sort: SortBy, order: SortOrder, now: DateTime<Utc>) {
    match sort {
        SortBy::Source => return,
        SortBy::Views => items.sort_by(|a, b| b.view_count.cmp(&a.view_count)),
        SortBy::Date => items.sort_by_cached_key(|item| {
            std::cmp::Reverse(
                item.published_at
                    .as_deref()
                    .map(|t| estimate_published_at(t, now))
                    .unwrap_or(DateTime::UNIX_EPOCH),
            )
        }),
    }
    if order == SortOrder::Asc {
        items.reverse();
    }
}
