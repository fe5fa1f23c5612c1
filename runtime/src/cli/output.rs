//! Output mode shared by every subcommand.
//!
//! The binary records the global flags in the environment once, so command
//! modules can check them without threading them through every call.

use serde::Serialize;

pub const JSON_ENV: &str = "CREATORFEED_JSON";

/// Whether `--json` was given.
pub fn is_json() -> bool {
    std::env::var(JSON_ENV).map(|v| v == "1").unwrap_or(false)
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => eprintln!("  Error: failed to encode output: {e}"),
    }
}

/// `1234567` as `1.2M`, `45300` as `45.3K`.
pub fn compact(n: u64) -> String {
    match n {
        0..=9_999 => n.to_string(),
        10_000..=999_999 => format!("{:.1}K", n as f64 / 1_000.0),
        _ => format!("{:.1}M", n as f64 / 1_000_000.0),
    }
}

/// Seconds as `m:ss` or `h:mm:ss`.
pub fn duration(seconds: u32) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Signed delta, or `-` when unknown.
pub fn delta(d: Option<i64>) -> String {
    match d {
        Some(d) if d > 0 => format!("+{d}"),
        Some(d) => d.to_string(),
        None => "-".to_string(),
    }
}
