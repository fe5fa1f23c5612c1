//! Channel metric service: subscriber count, history deltas, live polling.

use crate::acquisition::http_client::{fetch_with_timeout, Fetch};
use crate::acquisition::posts::userpic_url;
use crate::error::{FeedError, FeedResult};
use crate::events::{EventBus, FeedEvent};
use crate::protocol::ChannelSnapshot;
use crate::temporal::history::{Deltas, MetricHistory};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Channel API coordinates.
#[derive(Debug, Clone)]
pub struct ChannelApi {
    pub api_base: String,
    pub web_base: String,
    /// Bot credential. Never logged; API URLs are logged by method name only.
    pub bot_token: Option<String>,
    pub chat_id: String,
}

impl ChannelApi {
    fn username(&self) -> &str {
        self.chat_id.trim_start_matches('@')
    }
}

#[derive(Debug, Deserialize)]
struct ApiReply<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Chat {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

pub struct ChannelService {
    fetcher: Arc<dyn Fetch>,
    api: ChannelApi,
    history: MetricHistory,
    timeout: Duration,
    /// Last count announced on the bus, and the event that announced it.
    last: Mutex<Option<(i64, FeedEvent)>>,
}

impl ChannelService {
    pub fn new(fetcher: Arc<dyn Fetch>, api: ChannelApi, history: MetricHistory, timeout: Duration) -> Self {
        Self {
            fetcher,
            api,
            history,
            timeout,
            last: Mutex::new(None),
        }
    }

    /// Channel identity plus the current count and its deltas. A failed
    /// count leaves `subscribers` empty; deltas still come from history.
    pub async fn snapshot(&self) -> FeedResult<ChannelSnapshot> {
        let chat: Chat = self.call("getChat").await?;

        let count = match self.call::<i64>("getChatMemberCount").await {
            Ok(n) => Some(n),
            Err(e) => {
                tracing::warn!("channel: member count unavailable: {e}");
                None
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        let deltas = match count {
            Some(n) => self.history.record(n, now_ms).await,
            None => self.history.deltas(now_ms).await,
        };

        let username = chat.username.unwrap_or_else(|| self.api.username().to_string());
        Ok(ChannelSnapshot {
            title: chat.title.unwrap_or_else(|| username.clone()),
            photo: Some(userpic_url(&self.api.web_base, &username)),
            username,
            subscribers: count,
            delta_24h: deltas.delta24h,
            delta_7d: deltas.delta7d,
        })
    }

    /// One poll: record the count and announce it if it changed.
    pub async fn poll_once(&self, bus: &EventBus) {
        match self.call::<i64>("getChatMemberCount").await {
            Ok(count) => {
                let deltas = self.history.record(count, Utc::now().timestamp_millis()).await;
                if let Some(event) = self.note_count(count, deltas) {
                    tracing::info!("channel: subscribers now {count}");
                    bus.emit(event);
                }
            }
            Err(e) => {
                tracing::warn!("channel: poll failed: {e}");
                bus.emit(FeedEvent::PollFailed { message: e.to_string() });
            }
        }
    }

    /// The most recent subscriber event, for late subscribers.
    pub fn latest_event(&self) -> Option<FeedEvent> {
        let last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        last.as_ref().map(|(_, event)| event.clone())
    }

    /// Poll every `interval` until `shutdown` is notified. The first poll
    /// runs immediately.
    pub fn spawn_poller(
        self: Arc<Self>,
        bus: EventBus,
        interval: Duration,
        shutdown: Arc<Notify>,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("subscriber poller started: every {}s", interval.as_secs());
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.notified() => {
                        tracing::info!("subscriber poller stopping");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.poll_once(&bus).await;
                    }
                }
            }
        })
    }

    fn note_count(&self, count: i64, deltas: Deltas) -> Option<FeedEvent> {
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        if matches!(last.as_ref(), Some((prev, _)) if *prev == count) {
            return None;
        }
        let event = FeedEvent::Subscribers {
            subscribers: count,
            delta_24h: deltas.delta24h,
            delta_7d: deltas.delta7d,
        };
        *last = Some((count, event.clone()));
        Some(event)
    }

    async fn call<T: DeserializeOwned>(&self, method: &str) -> FeedResult<T> {
        let token = self
            .api
            .bot_token
            .as_deref()
            .ok_or_else(|| FeedError::ChannelApi("bot token is not configured".into()))?;
        let url = format!(
            "{}/bot{token}/{method}?chat_id={}",
            self.api.api_base.trim_end_matches('/'),
            self.api.chat_id
        );

        let resp = fetch_with_timeout(self.fetcher.as_ref(), &url, self.timeout)
            .await
            .map_err(|e| FeedError::ChannelApi(format!("{method}: {e}")))?;
        let reply: ApiReply<T> = serde_json::from_str(&resp.body)
            .map_err(|_| FeedError::ChannelApi(format!("{method}: HTTP {} with undecodable body", resp.status)))?;

        match reply {
            ApiReply {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiReply { description, .. } => Err(FeedError::ChannelApi(format!(
                "{method}: {}",
                description.as_deref().unwrap_or("request rejected")
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::http_client::HttpClient;
    use crate::storage::MemoryStore;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(server: &MockServer, token: Option<&str>) -> ChannelService {
        ChannelService::new(
            Arc::new(HttpClient::new(2_000, "en-US")),
            ChannelApi {
                api_base: server.uri(),
                web_base: "https://t.me".into(),
                bot_token: token.map(String::from),
                chat_id: "@chan".into(),
            },
            MetricHistory::new(Arc::new(MemoryStore::new()), 14),
            Duration::from_secs(2),
        )
    }

    async fn mount_chat(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/botT0K/getChat"))
            .and(query_param("chat_id", "@chan"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": {"id": -100, "title": "Chan Title", "username": "chan"}
            })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_snapshot() {
        let server = MockServer::start().await;
        mount_chat(&server).await;
        Mock::given(method("GET"))
            .and(path("/botT0K/getChatMemberCount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": 1234})))
            .mount(&server)
            .await;

        let snap = service(&server, Some("T0K")).snapshot().await.unwrap();
        assert_eq!(snap.title, "Chan Title");
        assert_eq!(snap.username, "chan");
        assert_eq!(snap.subscribers, Some(1234));
        assert_eq!(snap.delta_24h, Some(0));
        assert_eq!(snap.photo.as_deref(), Some("https://t.me/i/userpic/320/chan.jpg"));
    }

    #[tokio::test]
    async fn test_snapshot_without_count() {
        let server = MockServer::start().await;
        mount_chat(&server).await;
        Mock::given(method("GET"))
            .and(path("/botT0K/getChatMemberCount"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"ok": false, "description": "Bad Request: chat not found"})),
            )
            .mount(&server)
            .await;

        let snap = service(&server, Some("T0K")).snapshot().await.unwrap();
        assert_eq!(snap.subscribers, None);
        assert_eq!(snap.delta_24h, None);
    }

    #[tokio::test]
    async fn test_missing_token_is_channel_api_error() {
        let server = MockServer::start().await;
        let err = service(&server, None).snapshot().await.unwrap_err();
        assert!(matches!(err, FeedError::ChannelApi(_)));
        assert_eq!(err.status_code(), 500);
    }

    #[tokio::test]
    async fn test_rejected_chat_keeps_token_out_of_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({"ok": false, "description": "Unauthorized"})))
            .mount(&server)
            .await;

        let err = service(&server, Some("T0K")).snapshot().await.unwrap_err();
        let message = err.to_string();
        assert!(message.contains("getChat: Unauthorized"));
        assert!(!message.contains("T0K"));
    }

    #[tokio::test]
    async fn test_unreachable_api_keeps_token_out_of_errors() {
        let svc = ChannelService::new(
            Arc::new(HttpClient::new(2_000, "en-US")),
            ChannelApi {
                api_base: "http://127.0.0.1:1".into(),
                web_base: "https://t.me".into(),
                bot_token: Some("SECRET123:TOKEN".into()),
                chat_id: "@chan".into(),
            },
            MetricHistory::new(Arc::new(MemoryStore::new()), 14),
            Duration::from_secs(2),
        );

        let err = svc.snapshot().await.unwrap_err();
        let payload = err.to_payload().to_string();
        assert!(payload.contains("getChat"));
        assert!(!payload.contains("SECRET123"), "{payload}");

        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        svc.poll_once(&bus).await;
        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "error");
        let sse = event.payload().to_string();
        assert!(sse.contains("getChatMemberCount"));
        assert!(!sse.contains("SECRET123"), "{sse}");
    }

    #[tokio::test]
    async fn test_poll_emits_only_on_change() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botT0K/getChatMemberCount"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": 10})))
            .mount(&server)
            .await;

        let svc = service(&server, Some("T0K"));
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        svc.poll_once(&bus).await;
        svc.poll_once(&bus).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "subscribers");
        assert!(matches!(event, FeedEvent::Subscribers { subscribers: 10, .. }));
        assert!(rx.try_recv().is_err());
        assert_eq!(svc.latest_event(), Some(event));
    }

    #[tokio::test]
    async fn test_poll_failure_emits_error_event() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
            .mount(&server)
            .await;

        let svc = service(&server, Some("T0K"));
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        svc.poll_once(&bus).await;

        let event = rx.recv().await.unwrap();
        assert_eq!(event.name(), "error");
        assert!(svc.latest_event().is_none());
    }

    #[tokio::test]
    async fn test_poller_stops_on_shutdown() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": 5})))
            .mount(&server)
            .await;

        let svc = Arc::new(service(&server, Some("T0K")));
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let shutdown = Arc::new(Notify::new());
        let handle = svc.clone().spawn_poller(bus, Duration::from_secs(60), shutdown.clone());

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, FeedEvent::Subscribers { subscribers: 5, .. }));

        shutdown.notify_one();
        tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap().unwrap();
    }
}
