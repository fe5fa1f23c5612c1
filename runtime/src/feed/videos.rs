//! Video listing service: validate, consult the cache, merge, sort, truncate.

use crate::acquisition::normalize::ContentItem;
use crate::cache::{TtlCache, STALE_NOTE};
use crate::error::{FeedError, FeedResult};
use crate::feed::merger::{channel_pages, sort_items, SourceMerger};
use crate::protocol::{ListingQuery, VideoListResponse};
use chrono::Utc;
use std::time::Duration;

/// Serves merged channel listings through a TTL cache.
pub struct VideoService {
    merger: SourceMerger,
    base_url: String,
    cache: TtlCache<Vec<ContentItem>>,
}

impl VideoService {
    pub fn new(merger: SourceMerger, base_url: &str, ttl: Duration) -> Self {
        Self {
            merger,
            base_url: base_url.trim_end_matches('/').to_string(),
            cache: TtlCache::new("videos", ttl),
        }
    }

    pub fn cache(&self) -> &TtlCache<Vec<ContentItem>> {
        &self.cache
    }

    /// Listing for `query`. Fresh cache, then upstream, then stale cache.
    pub async fn list(&self, query: &ListingQuery) -> FeedResult<VideoListResponse> {
        let key = query.cache_key();
        if let Some(hit) = self.cache.get(&key).filter(|h| h.fresh) {
            tracing::debug!("videos: cache hit for {key}");
            return Ok(respond(query, &hit.value, true, None));
        }

        let outcome = self
            .merger
            .fetch_all(&channel_pages(&self.base_url, &query.handle))
            .await;

        if outcome.total_failure() {
            if let Some(stale) = self.cache.stale(&key) {
                tracing::warn!("videos: all pages failed for {key}, serving stale listing");
                return Ok(respond(query, &stale, true, Some(STALE_NOTE)));
            }
            return Err(match outcome.dns_failure_host() {
                Some(host) => FeedError::UpstreamDns {
                    host: host.to_string(),
                },
                None => FeedError::Upstream {
                    pages: outcome.failures.len(),
                    detail: outcome.failure_summary(),
                },
            });
        }

        if outcome.items.is_empty() {
            if let Some(stale) = self.cache.stale(&key) {
                tracing::warn!("videos: pages for {key} yielded no items, serving stale listing");
                return Ok(respond(query, &stale, true, Some(STALE_NOTE)));
            }
            return Ok(respond(query, &[], false, None));
        }

        let items = self.cache.put(&key, outcome.items);
        Ok(respond(query, &items, false, None))
    }
}

/// Apply the per-request view (shorts filter, sort, truncation) to a merged listing.
fn respond(query: &ListingQuery, merged: &[ContentItem], cached: bool, note: Option<&str>) -> VideoListResponse {
    let mut items: Vec<ContentItem> = merged
        .iter()
        .filter(|item| !query.shorts_only || item.is_short)
        .cloned()
        .collect();
    sort_items(&mut items, query.sort, query.order, Utc::now());
    items.truncate(query.max_results);

    VideoListResponse {
        items,
        cached,
        note: note.map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::{Fetch, FetchResponse, TransportError};
    use crate::acquisition::normalize::RecordNormalizer;
    use crate::protocol::{SortBy, SortOrder};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Instant;

    /// Serves one fixed main page; fails everything when `down` is set.
    struct SwitchFetch {
        down: AtomicBool,
        calls: AtomicUsize,
        body: String,
    }

    #[async_trait]
    impl Fetch for SwitchFetch {
        async fn fetch(&self, url: &str) -> Result<FetchResponse, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(TransportError::Dns {
                    host: "www.youtube.com".into(),
                });
            }
            let body = if url.ends_with("/@chan") { self.body.clone() } else { String::new() };
            Ok(FetchResponse {
                url: url.to_string(),
                status: 200,
                body,
            })
        }
    }

    fn service(body: &str, ttl: Duration) -> (VideoService, Arc<SwitchFetch>) {
        let fetch = Arc::new(SwitchFetch {
            down: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
            body: format!("ytInitialData = {body};"),
        });
        let merger = SourceMerger::new(
            fetch.clone(),
            RecordNormalizer::new("https://www.youtube.com"),
            Duration::from_secs(5),
        );
        (VideoService::new(merger, "https://www.youtube.com", ttl), fetch)
    }

    const LISTING: &str = r#"{"items":[
        {"videoRenderer":{"videoId":"v1","viewCountText":{"simpleText":"10 views"},"lengthText":{"simpleText":"10:00"}}},
        {"videoRenderer":{"videoId":"v2","viewCountText":{"simpleText":"30 views"},"lengthText":{"simpleText":"0:30"}}},
        {"videoRenderer":{"videoId":"v3","viewCountText":{"simpleText":"20 views"},"lengthText":{"simpleText":"4:00"}}}
    ]}"#;

    fn query(max: &str, sort: &str) -> ListingQuery {
        ListingQuery::parse(Some("@chan"), Some(max), Some(sort), None).unwrap()
    }

    #[tokio::test]
    async fn test_list_sorts_and_truncates() {
        let (svc, _) = service(LISTING, Duration::from_secs(60));
        let resp = svc.list(&query("2", "views")).await.unwrap();
        let ids: Vec<&str> = resp.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["v2", "v3"]);
        assert!(!resp.cached);
        assert_eq!(resp.note, None);
    }

    #[tokio::test]
    async fn test_second_request_is_cached() {
        let (svc, fetch) = service(LISTING, Duration::from_secs(60));
        svc.list(&query("50", "source")).await.unwrap();
        let calls = fetch.calls.load(Ordering::SeqCst);

        let resp = svc.list(&query("1", "source")).await.unwrap();
        assert!(resp.cached);
        assert_eq!(resp.items.len(), 1);
        assert_eq!(fetch.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_shorts_only_view() {
        let (svc, _) = service(LISTING, Duration::from_secs(60));
        let q = query("50", "source").shorts_only();
        let resp = svc.list(&q).await.unwrap();
        let ids: Vec<&str> = resp.items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["v2"]);
    }

    #[tokio::test]
    async fn test_stale_served_when_upstream_down() {
        let (svc, fetch) = service(LISTING, Duration::from_secs(60));
        let q = query("50", "source");
        let items = svc.merger.fetch_all(&channel_pages("https://www.youtube.com", "chan")).await.items;
        svc.cache.put_at(&q.cache_key(), items, Instant::now() - Duration::from_secs(600));

        fetch.down.store(true, Ordering::SeqCst);
        let resp = svc.list(&q).await.unwrap();
        assert!(resp.cached);
        assert_eq!(resp.note.as_deref(), Some(STALE_NOTE));
        assert_eq!(resp.items.len(), 3);
    }

    #[tokio::test]
    async fn test_total_dns_failure_without_cache() {
        let (svc, fetch) = service(LISTING, Duration::from_secs(60));
        fetch.down.store(true, Ordering::SeqCst);
        let err = svc.list(&query("50", "source")).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert!(matches!(err, FeedError::UpstreamDns { .. }));
    }

    #[tokio::test]
    async fn test_empty_pages_give_empty_listing() {
        let (svc, _) = service(r#"{"nothing":"here"}"#, Duration::from_secs(60));
        let resp = svc.list(&query("50", "source")).await.unwrap();
        assert!(resp.items.is_empty());
        assert!(!resp.cached);
        assert!(svc.cache().is_empty());
    }

    #[test]
    fn test_respond_order_param() {
        let q = ListingQuery {
            handle: "chan".into(),
            max_results: 10,
            sort: SortBy::Views,
            order: SortOrder::Asc,
            shorts_only: false,
        };
        let mk = |id: &str, v: u64| ContentItem {
            id: id.into(),
            title: id.into(),
            thumbnail: None,
            published_at: None,
            view_count: v,
            url: String::new(),
            duration_seconds: 0,
            is_short: false,
            source: crate::acquisition::normalize::SourceTag::Main,
        };
        let resp = respond(&q, &[mk("a", 5), mk("b", 1)], false, None);
        assert_eq!(resp.items[0].id, "b");
    }
}
