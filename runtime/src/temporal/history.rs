//! Subscriber-count history: an append-on-change sample log with retention
//! trimming and nearest-prior-sample deltas.

use crate::storage::{self, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Storage key of the persisted log.
pub const HISTORY_KEY: &str = "subs-history.json";
/// Default retention window.
pub const DEFAULT_RETENTION_DAYS: u32 = 14;

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

/// One observation. Serialized as `{"ts": <epoch ms>, "count": <value>}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSample {
    pub ts: i64,
    pub count: i64,
}

/// Time-ordered samples, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleLog {
    samples: Vec<MetricSample>,
}

impl SampleLog {
    pub fn from_samples(samples: Vec<MetricSample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[MetricSample] {
        &self.samples
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.last()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Drop samples older than `now_ms - retention_ms`. Returns whether anything was dropped.
    pub fn trim(&mut self, now_ms: i64, retention_ms: i64) -> bool {
        let cutoff = now_ms.saturating_sub(retention_ms);
        let before = self.samples.len();
        self.samples.retain(|s| s.ts >= cutoff);
        self.samples.len() != before
    }

    /// Trim, then append `sample` unless its value equals the latest retained
    /// value. Returns whether the log changed.
    pub fn record(&mut self, sample: MetricSample, retention_ms: i64) -> bool {
        let trimmed = self.trim(sample.ts, retention_ms);
        if self.latest().map(|s| s.count) == Some(sample.count) {
            return trimmed;
        }
        self.samples.push(sample);
        true
    }

    /// `latest - base` where base is the most recent sample at or before
    /// `now_ms - hours`, or the first sample when none is that old.
    /// `None` on an empty log.
    pub fn delta(&self, hours: i64, now_ms: i64) -> Option<i64> {
        let latest = self.latest()?.count;
        let cutoff = now_ms.saturating_sub(hours.saturating_mul(HOUR_MS));
        let base = self
            .samples
            .iter()
            .rev()
            .find(|s| s.ts <= cutoff)
            .or_else(|| self.samples.first())?
            .count;
        Some(latest - base)
    }
}

/// 24-hour and 7-day deltas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deltas {
    pub delta24h: Option<i64>,
    pub delta7d: Option<i64>,
}

impl Deltas {
    pub fn of(log: &SampleLog, now_ms: i64) -> Self {
        Self {
            delta24h: log.delta(24, now_ms),
            delta7d: log.delta(24 * 7, now_ms),
        }
    }
}

/// Persisted metric history. One record or query runs at a time; the log is
/// loaded once and kept in memory, so a failing store degrades to an
/// in-memory history instead of failing callers.
pub struct MetricHistory {
    store: Arc<dyn KeyValueStore>,
    key: String,
    retention_ms: i64,
    log: Mutex<Option<SampleLog>>,
}

impl MetricHistory {
    pub fn new(store: Arc<dyn KeyValueStore>, retention_days: u32) -> Self {
        Self::with_key(store, HISTORY_KEY, retention_days)
    }

    pub fn with_key(store: Arc<dyn KeyValueStore>, key: &str, retention_days: u32) -> Self {
        Self {
            store,
            key: key.to_string(),
            retention_ms: i64::from(retention_days) * DAY_MS,
            log: Mutex::new(None),
        }
    }

    /// Record `count` observed at `now_ms`; returns the deltas afterwards.
    pub async fn record(&self, count: i64, now_ms: i64) -> Deltas {
        let mut guard = self.log.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let log = guard.get_or_insert_with(SampleLog::default);

        if log.record(MetricSample { ts: now_ms, count }, self.retention_ms) {
            tracing::debug!("history: recorded {count} ({} samples)", log.samples().len());
            if let Err(e) = storage::write_json(self.store.as_ref(), &self.key, &*log).await {
                tracing::warn!("history: failed to persist: {e}");
            }
        }

        Deltas::of(log, now_ms)
    }

    /// Deltas as of `now_ms` without recording.
    pub async fn deltas(&self, now_ms: i64) -> Deltas {
        let mut guard = self.log.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        let log = guard.get_or_insert_with(SampleLog::default);
        Deltas::of(log, now_ms)
    }

    /// Snapshot of the current log.
    pub async fn snapshot(&self) -> SampleLog {
        let mut guard = self.log.lock().await;
        if guard.is_none() {
            *guard = Some(self.load().await);
        }
        guard.clone().unwrap_or_default()
    }

    async fn load(&self) -> SampleLog {
        match storage::read_json::<SampleLog>(self.store.as_ref(), &self.key).await {
            Ok(log) => log.unwrap_or_default(),
            Err(e) => {
                tracing::warn!("history: failed to load, starting empty: {e}");
                SampleLog::default()
            }
        }
    }
}
