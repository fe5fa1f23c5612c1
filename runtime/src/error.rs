//! Error taxonomy for feed operations.
//!
//! Per-page transport and extraction failures never reach this type; they
//! are absorbed by the merger. What remains is validation, total upstream
//! failure, and channel API failure.

use serde_json::{json, Value};

/// Stable machine-readable error codes.
pub mod codes {
    pub const MISSING_HANDLE: &str = "E_MISSING_HANDLE";
    pub const INVALID_HANDLE: &str = "E_INVALID_HANDLE";
    pub const INVALID_PARAM: &str = "E_INVALID_PARAM";
    pub const UPSTREAM_DNS: &str = "E_UPSTREAM_DNS";
    pub const UPSTREAM: &str = "E_UPSTREAM";
    pub const CHANNEL_API: &str = "E_CHANNEL_API";
}

/// Errors surfaced to callers of the feed services.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum FeedError {
    #[error("Missing handle query parameter")]
    MissingHandle,

    #[error("Invalid handle format: {0}")]
    InvalidHandle(String),

    #[error("Invalid value for {name}: {value}")]
    InvalidParam { name: &'static str, value: String },

    #[error("DNS resolution failed when contacting {host}")]
    UpstreamDns { host: String },

    #[error("All {pages} source pages failed: {detail}")]
    Upstream { pages: usize, detail: String },

    #[error("Channel API error: {0}")]
    ChannelApi(String),
}

impl FeedError {
    /// HTTP status the routing layer should use.
    pub fn status_code(&self) -> u16 {
        match self {
            FeedError::MissingHandle | FeedError::InvalidHandle(_) | FeedError::InvalidParam { .. } => 400,
            FeedError::UpstreamDns { .. } => 502,
            FeedError::Upstream { .. } | FeedError::ChannelApi(_) => 500,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            FeedError::MissingHandle => codes::MISSING_HANDLE,
            FeedError::InvalidHandle(_) => codes::INVALID_HANDLE,
            FeedError::InvalidParam { .. } => codes::INVALID_PARAM,
            FeedError::UpstreamDns { .. } => codes::UPSTREAM_DNS,
            FeedError::Upstream { .. } => codes::UPSTREAM,
            FeedError::ChannelApi(_) => codes::CHANNEL_API,
        }
    }

    /// Whether the caller sent bad input, as opposed to an upstream failure.
    pub fn is_validation(&self) -> bool {
        self.status_code() == 400
    }

    /// Wire payload: `{"error": {"code", "message"}}`.
    pub fn to_payload(&self) -> Value {
        json!({
            "error": {
                "code": self.code(),
                "message": self.to_string(),
            }
        })
    }
}

pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(FeedError::MissingHandle.status_code(), 400);
        assert_eq!(FeedError::InvalidHandle("x".into()).status_code(), 400);
        assert_eq!(
            FeedError::UpstreamDns {
                host: "www.youtube.com".into()
            }
            .status_code(),
            502
        );
        assert_eq!(
            FeedError::Upstream {
                pages: 3,
                detail: "timeout".into()
            }
            .status_code(),
            500
        );
        assert_eq!(FeedError::ChannelApi("bad token".into()).status_code(), 500);
    }

    #[test]
    fn test_payload_shape() {
        let payload = FeedError::InvalidHandle("a!".into()).to_payload();
        assert_eq!(payload["error"]["code"], "E_INVALID_HANDLE");
        assert_eq!(payload["error"]["message"], "Invalid handle format: a!");
        assert!(FeedError::MissingHandle.is_validation());
        assert!(!FeedError::ChannelApi(String::new()).is_validation());
    }
}
