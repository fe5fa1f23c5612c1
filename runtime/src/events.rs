// Copyright 2026 Creatorfeed Contributors
// SPDX-License-Identifier: Apache-2.0

//! Creatorfeed event bus.
//!
//! A `tokio::sync::broadcast` channel carrying [`FeedEvent`] values. The
//! subscriber poller publishes here and the REST layer streams it as
//! Server-Sent Events. With no subscribers, events are dropped.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::broadcast;

/// Every event the runtime emits.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FeedEvent {
    // ── Channel metric ────────────────────
    /// The subscriber count changed.
    Subscribers {
        subscribers: i64,
        #[serde(rename = "delta24h")]
        delta_24h: Option<i64>,
        #[serde(rename = "delta7d")]
        delta_7d: Option<i64>,
    },
    /// A poll of the channel API failed.
    PollFailed { message: String },
}

impl FeedEvent {
    /// SSE `event:` name.
    pub fn name(&self) -> &'static str {
        match self {
            FeedEvent::Subscribers { .. } => "subscribers",
            FeedEvent::PollFailed { .. } => "error",
        }
    }

    /// SSE `data:` payload, without the type tag.
    pub fn payload(&self) -> Value {
        match self {
            FeedEvent::Subscribers {
                subscribers,
                delta_24h,
                delta_7d,
            } => json!({ "subscribers": subscribers, "delta24h": delta_24h, "delta7d": delta_7d }),
            FeedEvent::PollFailed { message } => json!({ "message": message }),
        }
    }
}

/// Broadcast bus shared by producers and the SSE endpoint.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<FeedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn emit(&self, event: FeedEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FeedEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
