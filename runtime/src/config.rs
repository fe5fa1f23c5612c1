//! Environment-driven runtime configuration.

use std::path::PathBuf;
use std::time::Duration;

/// Resolved configuration. Every field has a default.
#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub data_dir: PathBuf,
    /// Channel API credential. Never logged.
    pub bot_token: Option<String>,
    pub chat_id: String,
    /// Posts API credential. Never logged.
    pub tgstat_token: Option<String>,
    pub videos_ttl: Duration,
    pub posts_ttl: Duration,
    pub fetch_timeout_ms: u64,
    pub poll_interval: Duration,
    pub history_retention_days: u32,
    pub youtube_base: String,
    pub telegram_api_base: String,
    pub telegram_web_base: String,
    pub tgstat_base: String,
    pub accept_language: String,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup: &lookup };
        let port = match env.string("CREATORFEED_PORT") {
            Some(_) => env.number("CREATORFEED_PORT", 3001u16),
            None => env.number("PORT", 3001u16),
        };

        Self {
            port,
            data_dir: env
                .string("CREATORFEED_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_data_dir),
            bot_token: env.string("BOT_TOKEN").filter(|t| t != "REPLACE_ME"),
            chat_id: env
                .string("CREATORFEED_CHAT_ID")
                .unwrap_or_else(|| "@fromoldnuke7".to_string()),
            tgstat_token: env.string("TGSTAT_TOKEN"),
            videos_ttl: Duration::from_secs(env.number("CREATORFEED_VIDEOS_TTL_SECS", 120u64)),
            posts_ttl: Duration::from_secs(env.number("CREATORFEED_POSTS_TTL_SECS", 300u64)),
            fetch_timeout_ms: env.number("CREATORFEED_FETCH_TIMEOUT_MS", 10_000u64),
            poll_interval: Duration::from_secs(env.number("CREATORFEED_POLL_INTERVAL_SECS", 15u64).max(1)),
            history_retention_days: env.number("CREATORFEED_HISTORY_RETENTION_DAYS", 14u32),
            youtube_base: env.base_url("CREATORFEED_YOUTUBE_BASE", "https://www.youtube.com"),
            telegram_api_base: env.base_url("CREATORFEED_TELEGRAM_API_BASE", "https://api.telegram.org"),
            telegram_web_base: env.base_url("CREATORFEED_TELEGRAM_WEB_BASE", "https://t.me"),
            tgstat_base: env.base_url("CREATORFEED_TGSTAT_BASE", "https://api.tgstat.ru"),
            accept_language: env
                .string("CREATORFEED_ACCEPT_LANGUAGE")
                .unwrap_or_else(|| "en-US,en;q=0.9".to_string()),
        }
    }

    /// Channel username without the leading `@`.
    pub fn channel_username(&self) -> &str {
        self.chat_id.trim_start_matches('@')
    }
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |t: &Option<String>| t.as_ref().map(|_| "<redacted>");
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("data_dir", &self.data_dir)
            .field("bot_token", &redact(&self.bot_token))
            .field("chat_id", &self.chat_id)
            .field("tgstat_token", &redact(&self.tgstat_token))
            .field("videos_ttl", &self.videos_ttl)
            .field("posts_ttl", &self.posts_ttl)
            .field("fetch_timeout_ms", &self.fetch_timeout_ms)
            .field("poll_interval", &self.poll_interval)
            .field("history_retention_days", &self.history_retention_days)
            .field("youtube_base", &self.youtube_base)
            .field("telegram_api_base", &self.telegram_api_base)
            .field("telegram_web_base", &self.telegram_web_base)
            .field("tgstat_base", &self.tgstat_base)
            .finish()
    }
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".creatorfeed")
}

struct Env<'a> {
    lookup: &'a dyn Fn(&str) -> Option<String>,
}

impl Env<'_> {
    /// Trimmed non-empty value.
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn number<T>(&self, name: &str, default_value: T) -> T
    where
        T: std::str::FromStr + std::fmt::Display + Copy,
    {
        match self.string(name) {
            None => default_value,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                tracing::warn!("{name}={raw:?} is not a valid number, using {default_value}");
                default_value
            }),
        }
    }

    fn base_url(&self, name: &str, default_value: &str) -> String {
        self.string(name)
            .unwrap_or_else(|| default_value.to_string())
            .trim_end_matches('/')
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn test_defaults() {
        let cfg = config_with(&[]);
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.videos_ttl, Duration::from_secs(120));
        assert_eq!(cfg.posts_ttl, Duration::from_secs(300));
        assert_eq!(cfg.fetch_timeout_ms, 10_000);
        assert_eq!(cfg.poll_interval, Duration::from_secs(15));
        assert_eq!(cfg.history_retention_days, 14);
        assert_eq!(cfg.chat_id, "@fromoldnuke7");
        assert_eq!(cfg.channel_username(), "fromoldnuke7");
        assert!(cfg.bot_token.is_none());
        assert!(cfg.data_dir.ends_with(".creatorfeed"));
        assert_eq!(cfg.youtube_base, "https://www.youtube.com");
    }

    #[test]
    fn test_overrides() {
        let cfg = config_with(&[
            ("PORT", "8080"),
            ("BOT_TOKEN", " secret "),
            ("CREATORFEED_VIDEOS_TTL_SECS", "5"),
            ("CREATORFEED_YOUTUBE_BASE", "http://127.0.0.1:9999/"),
            ("CREATORFEED_DATA_DIR", "/var/lib/creatorfeed"),
        ]);
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.bot_token.as_deref(), Some("secret"));
        assert_eq!(cfg.videos_ttl, Duration::from_secs(5));
        assert_eq!(cfg.youtube_base, "http://127.0.0.1:9999");
        assert_eq!(cfg.data_dir, PathBuf::from("/var/lib/creatorfeed"));
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let cfg = config_with(&[("BOT_TOKEN", "123:abc"), ("TGSTAT_TOKEN", "xyz")]);
        let dbg = format!("{cfg:?}");
        assert!(!dbg.contains("123:abc"));
        assert!(!dbg.contains("xyz"));
        assert!(dbg.contains("<redacted>"));
    }

    #[test]
    fn test_specific_port_wins() {
        let cfg = config_with(&[("PORT", "8080"), ("CREATORFEED_PORT", "9090")]);
        assert_eq!(cfg.port, 9090);
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let cfg = config_with(&[
            ("CREATORFEED_PORT", "eighty"),
            ("CREATORFEED_POSTS_TTL_SECS", "-1"),
            ("BOT_TOKEN", "REPLACE_ME"),
        ]);
        assert_eq!(cfg.port, 3001);
        assert_eq!(cfg.posts_ttl, Duration::from_secs(300));
        assert!(cfg.bot_token.is_none());
    }
}
