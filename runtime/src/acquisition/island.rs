//! Locate and decode the JSON state object a page embeds in its HTML.
//!
//! Pages assign their initial state to a script variable
//! (`var ytInitialData = {...};`). Rather than parsing the document, we find
//! the marker, then the first `{` after it, and scan forward balancing braces
//! until depth returns to zero. The candidate slice is decoded strictly.
//!
//! Every failure (marker absent, no opening brace, unbalanced object,
//! invalid JSON) yields `None`. Extraction is a best-effort probe.

use serde_json::Value;

/// Marker preceding the initial-data object on channel pages.
pub const INITIAL_DATA_MARKER: &str = "ytInitialData";

/// Extract the first balanced JSON object following `marker` in `text`.
pub fn extract_island(text: &str, marker: &str) -> Option<Value> {
    let slice = island_slice(text, marker)?;
    match serde_json::from_str::<Value>(slice) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::debug!("island after '{marker}' did not decode: {e}");
            None
        }
    }
}

/// Return the raw text of the balanced object following `marker`, undecoded.
pub fn island_slice<'a>(text: &'a str, marker: &str) -> Option<&'a str> {
    if marker.is_empty() {
        return None;
    }
    let marker_at = text.find(marker)?;
    let start = marker_at + text[marker_at..].find('{')?;
    let end = balanced_end(text.as_bytes(), start)?;
    Some(&text[start..=end])
}

/// Scan from the opening brace at `start`; return the offset of the brace that
/// brings depth back to zero.
///
/// Braces inside string literals do not count. All delimiters are ASCII, so a
/// byte scan never lands inside a multi-byte UTF-8 sequence.
fn balanced_end(bytes: &[u8], start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }

    None
}
