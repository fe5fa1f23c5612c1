// Copyright 2026 Creatorfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! HTTP REST API for Creatorfeed.
//!
//! A thin adapter: each route parses its query string, calls one feed
//! service, and maps [`FeedError`] onto a status code and the standard
//! `{"error": {"code", "message"}}` payload. The subscriber bus is exposed
//! as Server-Sent Events.

use crate::acquisition::http_client::{Fetch, HttpClient};
use crate::acquisition::normalize::RecordNormalizer;
use crate::config::Config;
use crate::error::FeedError;
use crate::events::{EventBus, FeedEvent};
use crate::feed::channel::{ChannelApi, ChannelService};
use crate::feed::merger::SourceMerger;
use crate::feed::posts::{PostService, PostSource};
use crate::feed::videos::VideoService;
use crate::protocol::ListingQuery;
use crate::storage::{FileStore, KeyValueStore};
use crate::temporal::history::MetricHistory;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tower_http::cors::{Any, CorsLayer};

/// Bus capacity; slow SSE clients skip what they miss.
const EVENT_BUS_CAPACITY: usize = 64;

/// Services shared by every request.
pub struct AppState {
    pub videos: VideoService,
    pub posts: PostService,
    pub channel: Arc<ChannelService>,
    pub bus: EventBus,
    pub started_at: Instant,
}

impl AppState {
    /// Wire the services from configuration with the real HTTP client and
    /// a file store under the data directory.
    pub fn from_config(config: &Config) -> Self {
        let fetcher: Arc<dyn Fetch> = Arc::new(HttpClient::new(config.fetch_timeout_ms, &config.accept_language));
        let store: Arc<dyn KeyValueStore> = Arc::new(FileStore::new(config.data_dir.clone()));
        Self::with_collaborators(config, fetcher, store)
    }

    /// Wire the services around injected fetch and persistence capabilities.
    pub fn with_collaborators(config: &Config, fetcher: Arc<dyn Fetch>, store: Arc<dyn KeyValueStore>) -> Self {
        let timeout = Duration::from_millis(config.fetch_timeout_ms);

        let merger = SourceMerger::new(fetcher.clone(), RecordNormalizer::new(&config.youtube_base), timeout);
        let videos = VideoService::new(merger, &config.youtube_base, config.videos_ttl);

        let posts = PostService::new(
            fetcher.clone(),
            store.clone(),
            PostSource {
                channel: config.channel_username().to_string(),
                web_base: config.telegram_web_base.clone(),
                api_base: config.tgstat_base.clone(),
                api_token: config.tgstat_token.clone(),
            },
            config.posts_ttl,
            timeout,
        );

        let channel = ChannelService::new(
            fetcher,
            ChannelApi {
                api_base: config.telegram_api_base.clone(),
                web_base: config.telegram_web_base.clone(),
                bot_token: config.bot_token.clone(),
                chat_id: config.chat_id.clone(),
            },
            MetricHistory::new(store, config.history_retention_days),
            timeout,
        );

        Self {
            videos,
            posts,
            channel: Arc::new(channel),
            bus: EventBus::new(EVENT_BUS_CAPACITY),
            started_at: Instant::now(),
        }
    }
}

/// Build the axum Router with all REST endpoints.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/videos", get(handle_videos))
        .route("/api/shorts", get(handle_shorts))
        .route("/api/posts", get(handle_posts))
        .route("/api/channel", get(handle_channel))
        .route("/api/stream", get(stream_sse))
        .route("/api/clear-cache", get(handle_clear_cache))
        .layer(cors)
        .with_state(state)
}

/// Serve on `listener` until `shutdown` is notified.
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>, shutdown: Arc<Notify>) -> anyhow::Result<()> {
    let app = router(state);
    tracing::info!("REST API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;
    Ok(())
}

// ── Errors ──────────────────────────────────────────────────────

impl IntoResponse for FeedError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if self.is_validation() {
            tracing::debug!("rejected request: {self}");
        } else {
            tracing::warn!("request failed: {self}");
        }
        (status, Json(self.to_payload())).into_response()
    }
}

// ── Handlers ────────────────────────────────────────────────────

async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptimeSeconds": state.started_at.elapsed().as_secs(),
    }))
}

/// Listing query string. Values stay raw so validation owns every default.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListingParams {
    handle: Option<String>,
    max_results: Option<String>,
    sort: Option<String>,
    order: Option<String>,
}

impl ListingParams {
    fn parse(&self) -> Result<ListingQuery, FeedError> {
        ListingQuery::parse(
            self.handle.as_deref(),
            self.max_results.as_deref(),
            self.sort.as_deref(),
            self.order.as_deref(),
        )
    }
}

async fn handle_videos(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingParams>,
) -> Result<Response, FeedError> {
    let query = params.parse()?;
    Ok(Json(state.videos.list(&query).await?).into_response())
}

async fn handle_shorts(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListingParams>,
) -> Result<Response, FeedError> {
    let query = params.parse()?.shorts_only();
    Ok(Json(state.videos.list(&query).await?).into_response())
}

async fn handle_posts(State(state): State<Arc<AppState>>) -> Result<Response, FeedError> {
    Ok(Json(state.posts.list().await?).into_response())
}

async fn handle_channel(State(state): State<Arc<AppState>>) -> Result<Response, FeedError> {
    Ok(Json(state.channel.snapshot().await?).into_response())
}

async fn handle_clear_cache(State(state): State<Arc<AppState>>) -> Json<Value> {
    let entries = state.videos.cache().len();
    state.videos.cache().clear();
    tracing::info!("cleared {entries} cached listings");
    Json(json!({ "message": "Cache cleared", "entries": entries }))
}

/// Server-Sent Events stream of subscriber updates.
///
/// A new client first receives the latest known count, then every change
/// the poller announces.
async fn stream_sse(State(state): State<Arc<AppState>>) -> Sse<impl futures::Stream<Item = Result<Event, Infallible>>> {
    let mut rx = state.bus.subscribe();
    let latest = state.channel.latest_event();

    let stream = async_stream::stream! {
        if let Some(event) = latest {
            yield Ok(sse_event(&event));
        }
        loop {
            match rx.recv().await {
                Ok(event) => yield Ok(sse_event(&event)),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn sse_event(event: &FeedEvent) -> Event {
    Event::default().event(event.name()).data(event.payload().to_string())
}
