//! Channel post listing.
//!
//! Refresh tries the posts API first (only when a token is configured), then
//! the public widget pages. A good listing is persisted; the persisted copy
//! is the last resort when both tiers fail and nothing is cached in memory.

use crate::acquisition::http_client::{fetch_with_timeout, Fetch};
use crate::acquisition::posts::{
    finalize_widget_posts, from_api_item, parse_widget_page, widget_urls, ApiEnvelope, ChannelInfo, PostItem,
};
use crate::cache::TtlCache;
use crate::error::{FeedError, FeedResult};
use crate::protocol::PostsResponse;
use crate::storage::{read_json, write_json, KeyValueStore};
use chrono::Utc;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Persistence key of the last good listing.
pub const POSTS_KEY: &str = "telegram-posts.json";

const CACHE_KEY: &str = "posts";
const API_PAGE_SIZE: usize = 50;
const API_MAX_PAGES: usize = 3;

/// Where posts come from.
#[derive(Debug, Clone)]
pub struct PostSource {
    /// Channel username without `@`.
    pub channel: String,
    pub web_base: String,
    pub api_base: String,
    /// Posts API credential. Never logged.
    pub api_token: Option<String>,
}

#[derive(Debug)]
enum RefreshError {
    Failed(FeedError),
    /// Pages loaded but carried no posts.
    Empty,
}

impl std::fmt::Display for RefreshError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RefreshError::Failed(e) => write!(f, "{e}"),
            RefreshError::Empty => f.write_str("no posts found"),
        }
    }
}

pub struct PostService {
    fetcher: Arc<dyn Fetch>,
    store: Arc<dyn KeyValueStore>,
    source: PostSource,
    timeout: Duration,
    cache: TtlCache<PostsResponse>,
}

impl PostService {
    pub fn new(
        fetcher: Arc<dyn Fetch>,
        store: Arc<dyn KeyValueStore>,
        source: PostSource,
        ttl: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            fetcher,
            store,
            source,
            timeout,
            cache: TtlCache::new("posts", ttl),
        }
    }

    pub fn cache(&self) -> &TtlCache<PostsResponse> {
        &self.cache
    }

    /// Current post listing: fresh cache, refresh, stale cache, persisted copy.
    pub async fn list(&self) -> FeedResult<PostsResponse> {
        match self.cache.get_or_refresh(CACHE_KEY, || self.refresh()).await {
            Ok(served) => Ok(PostsResponse {
                cached: served.cached(),
                ..(*served.value).clone()
            }),
            Err(e) => {
                if let Some(persisted) = self.load_persisted().await {
                    tracing::warn!("posts refresh failed ({e}), serving persisted listing");
                    return Ok(PostsResponse {
                        cached: true,
                        ..persisted
                    });
                }
                match e {
                    RefreshError::Empty => Ok(PostsResponse {
                        posts: Vec::new(),
                        channel: self.channel_info(),
                        cached: false,
                    }),
                    RefreshError::Failed(err) => Err(err),
                }
            }
        }
    }

    async fn refresh(&self) -> Result<PostsResponse, RefreshError> {
        let mut posts = Vec::new();
        if let Some(token) = self.source.api_token.as_deref() {
            posts = self.fetch_api(token).await;
        }
        if posts.is_empty() {
            posts = self.fetch_widget().await?;
        }
        if posts.is_empty() {
            return Err(RefreshError::Empty);
        }

        let listing = PostsResponse {
            posts,
            channel: self.channel_info(),
            cached: false,
        };
        if let Err(e) = write_json(self.store.as_ref(), POSTS_KEY, &listing).await {
            tracing::warn!("failed to persist post listing: {e}");
        }
        Ok(listing)
    }

    /// Posts API tier. Any failure ends paging; what was gathered so far is kept.
    async fn fetch_api(&self, token: &str) -> Vec<PostItem> {
        let base = self.source.api_base.trim_end_matches('/');
        let mut posts = Vec::new();

        for page in 0..API_MAX_PAGES {
            let url = format!(
                "{base}/channels/posts?token={token}&channelId={}&limit={API_PAGE_SIZE}&offset={}&extended=1",
                self.source.channel,
                page * API_PAGE_SIZE
            );
            let resp = match fetch_with_timeout(self.fetcher.as_ref(), &url, self.timeout).await {
                Ok(resp) if resp.ok() => resp,
                Ok(resp) => {
                    tracing::warn!("posts API page {page}: HTTP {}", resp.status);
                    break;
                }
                Err(e) => {
                    tracing::warn!("posts API page {page}: {e}");
                    break;
                }
            };

            let envelope: ApiEnvelope = match serde_json::from_str(&resp.body) {
                Ok(env) => env,
                Err(e) => {
                    tracing::warn!("posts API page {page}: undecodable response: {e}");
                    break;
                }
            };
            if envelope.status != "ok" {
                tracing::warn!(
                    "posts API page {page}: {}",
                    envelope.error.as_deref().unwrap_or("unknown error")
                );
                break;
            }

            let items = envelope.response.map(|r| r.items).unwrap_or_default();
            let count = items.len();
            posts.extend(items.iter().filter_map(from_api_item));
            if count < API_PAGE_SIZE {
                break;
            }
        }

        tracing::info!("posts API: {} posts", posts.len());
        posts
    }

    /// Widget tier. Fails only when no page could be loaded at all.
    async fn fetch_widget(&self) -> Result<Vec<PostItem>, RefreshError> {
        let urls = widget_urls(&self.source.web_base, &self.source.channel);
        let now_ms = Utc::now().timestamp_millis();
        let results = join_all(
            urls.iter()
                .map(|url| fetch_with_timeout(self.fetcher.as_ref(), url, self.timeout)),
        )
        .await;

        let mut pages = Vec::new();
        let mut failures = Vec::new();
        for (url, result) in urls.iter().zip(results) {
            match result {
                Ok(resp) if resp.ok() => pages.push(parse_widget_page(&resp.body, now_ms)),
                Ok(resp) => failures.push(format!("{url}: HTTP {}", resp.status)),
                Err(e) => failures.push(format!("{url}: {e}")),
            }
        }
        for failure in &failures {
            tracing::warn!("widget page failed: {failure}");
        }

        if pages.is_empty() {
            return Err(RefreshError::Failed(FeedError::Upstream {
                pages: failures.len(),
                detail: failures.join("; "),
            }));
        }

        let posts = finalize_widget_posts(pages);
        tracing::info!("widget pages: {} posts", posts.len());
        Ok(posts)
    }

    async fn load_persisted(&self) -> Option<PostsResponse> {
        match read_json(self.store.as_ref(), POSTS_KEY).await {
            Ok(listing) => listing,
            Err(e) => {
                tracing::warn!("failed to read persisted post listing: {e}");
                None
            }
        }
    }

    fn channel_info(&self) -> ChannelInfo {
        ChannelInfo::from_username(&self.source.channel, &self.source.web_base)
    }
}
