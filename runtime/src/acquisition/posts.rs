//! Channel post parsing: posts API items and public widget pages.

use crate::acquisition::lazy_regex;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Longest post text kept, in characters.
pub const MAX_POST_TEXT: usize = 300;
/// Most posts kept from widget pages.
pub const MAX_WIDGET_POSTS: usize = 50;

/// A channel post as served to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostItem {
    pub id: u64,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub date: i64,
    pub views: u64,
    pub reactions: u64,
    pub photo: Option<String>,
}

/// Public identity of a channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelInfo {
    pub username: String,
    pub title: String,
    pub photo: Option<String>,
}

impl ChannelInfo {
    /// Identity derived from the username alone, with the public avatar URL.
    pub fn from_username(username: &str, web_base: &str) -> Self {
        Self {
            username: username.to_string(),
            title: username.to_string(),
            photo: Some(userpic_url(web_base, username)),
        }
    }
}

/// Public avatar URL for a channel username.
pub fn userpic_url(web_base: &str, username: &str) -> String {
    format!("{}/i/userpic/320/{username}.jpg", web_base.trim_end_matches('/'))
}

// ── Posts API ──

/// Envelope of one posts API page.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope {
    pub status: String,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub response: Option<ApiPage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiPage {
    #[serde(default)]
    pub items: Vec<ApiItem>,
}

/// One post as the posts API returns it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiItem {
    pub id: u64,
    /// Seconds since the Unix epoch.
    #[serde(default)]
    pub date: i64,
    #[serde(default)]
    pub views: Option<u64>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub is_deleted: Option<Value>,
    #[serde(default)]
    pub media: Option<ApiMedia>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ApiMedia {
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_url: Option<String>,
    #[serde(default)]
    pub file_thumbnail_url: Option<String>,
}

impl ApiItem {
    fn deleted(&self) -> bool {
        match &self.is_deleted {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            _ => false,
        }
    }
}

/// Convert an API item. Deleted items and items with neither text nor media
/// yield `None`.
pub fn from_api_item(item: &ApiItem) -> Option<PostItem> {
    if item.deleted() {
        return None;
    }

    let raw = item.text.as_deref().unwrap_or("");
    let photo = item
        .media
        .as_ref()
        .and_then(api_media_url)
        .or_else(|| youtube_thumbnail(raw));
    let text = truncate_chars(&clean_post_text(raw), MAX_POST_TEXT);
    if text.is_empty() && photo.is_none() {
        return None;
    }

    Some(PostItem {
        id: item.id,
        text,
        date: item.date.saturating_mul(1000),
        views: item.views.unwrap_or(0),
        reactions: 0,
        photo,
    })
}

fn api_media_url(media: &ApiMedia) -> Option<String> {
    match media.media_type.as_deref() {
        Some("mediaPhoto") if media.file_url.is_some() => media.file_url.clone(),
        Some("mediaDocument") if media.file_thumbnail_url.is_some() => media.file_thumbnail_url.clone(),
        _ if media.mime_type.as_deref() == Some("image/webp") => media.file_url.clone(),
        _ => None,
    }
}

/// Strip markup from API post text: anchors keep their text, other tags are
/// dropped, the basic named entities are decoded, and whitespace is trimmed.
pub fn clean_post_text(html: &str) -> String {
    static ANCHOR: OnceLock<Option<Regex>> = OnceLock::new();
    static TAG: OnceLock<Option<Regex>> = OnceLock::new();

    let mut text = html.to_string();
    if let Some(re) = lazy_regex(&ANCHOR, r"(?s)<a[^>]*>(.*?)</a>") {
        text = re.replace_all(&text, "$1").into_owned();
    }
    if let Some(re) = lazy_regex(&TAG, r"<[^>]+>") {
        text = re.replace_all(&text, "").into_owned();
    }

    text.replace("&quot;", "\"")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
        .trim()
        .to_string()
}

/// Thumbnail for the first video link in `text`, if any.
pub fn youtube_thumbnail(text: &str) -> Option<String> {
    static LINK: OnceLock<Option<Regex>> = OnceLock::new();
    let re = lazy_regex(&LINK, r"(?:youtube\.com/watch\?v=|youtu\.be/)([a-zA-Z0-9_-]{11})")?;
    let id = re.captures(text)?.get(1)?.as_str();
    Some(format!("https://img.youtube.com/vi/{id}/maxresdefault.jpg"))
}

// ── Widget pages ──

/// Widget page URLs for a channel, in fetch order.
pub fn widget_urls(web_base: &str, channel: &str) -> Vec<String> {
    let base = format!("{}/s/{channel}", web_base.trim_end_matches('/'));
    vec![
        base.clone(),
        format!("{base}?embed=1"),
        format!("{base}?before=9999999999"),
    ]
}

/// Parse every message block on one widget page. `now_ms` stands in for
/// blocks without a timestamp. Ids are left at zero and text is kept whole;
/// see [`finalize_widget_posts`].
pub fn parse_widget_page(html: &str, now_ms: i64) -> Vec<PostItem> {
    let doc = Html::parse_document(html);
    let Ok(message_sel) = Selector::parse(".tgme_widget_message") else {
        return Vec::new();
    };

    let mut posts = Vec::new();
    let mut skipped = 0usize;
    for block in doc.select(&message_sel) {
        match parse_message_block(block, now_ms) {
            Some(post) => posts.push(post),
            None => skipped += 1,
        }
    }

    tracing::debug!("widget page: {} posts, {skipped} blocks without content", posts.len());
    posts
}

fn parse_message_block(block: ElementRef<'_>, now_ms: i64) -> Option<PostItem> {
    let text = first_in(block, ".tgme_widget_message_text")
        .map(|el| element_text(el).trim().to_string())
        .unwrap_or_default();

    let photo = background_image(block).or_else(|| youtube_thumbnail(&text));
    if text.is_empty() && photo.is_none() {
        return None;
    }

    let date = first_in(block, "time[datetime]")
        .and_then(|el| el.value().attr("datetime"))
        .and_then(|d| chrono::DateTime::parse_from_rfc3339(d).ok())
        .map(|d| d.timestamp_millis())
        .unwrap_or(now_ms);

    let views = first_in(block, ".tgme_widget_message_views")
        .map(|el| parse_compact_count(&el.text().collect::<String>()))
        .unwrap_or(0);

    let reactions = match Selector::parse(".tgme_widget_message_reactions_count") {
        Ok(sel) => block
            .select(&sel)
            .map(|el| parse_compact_count(&el.text().collect::<String>()))
            .sum(),
        Err(_) => 0,
    };

    Some(PostItem {
        id: 0,
        text,
        date,
        views,
        reactions,
        photo,
    })
}

fn first_in<'a>(el: ElementRef<'a>, selector: &str) -> Option<ElementRef<'a>> {
    let sel = Selector::parse(selector).ok()?;
    el.select(&sel).next()
}

/// Visible text of an element with `<br>` rendered as a newline.
fn element_text(el: ElementRef<'_>) -> String {
    let mut out = String::new();
    for node in el.descendants() {
        match node.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(e) if e.name() == "br" => out.push('\n'),
            _ => {}
        }
    }
    out
}

/// First non-emoji `background-image:url('...')` inside a block.
fn background_image(block: ElementRef<'_>) -> Option<String> {
    static BG: OnceLock<Option<Regex>> = OnceLock::new();
    let re = lazy_regex(&BG, r"background-image:\s*url\('([^']+)'\)")?;
    let sel = Selector::parse("[style]").ok()?;

    block
        .select(&sel)
        .filter_map(|el| el.value().attr("style"))
        .filter_map(|style| re.captures(style)?.get(1).map(|m| m.as_str()))
        .find(|url| !url.contains("/emoji/"))
        .map(|url| {
            if url.starts_with("//") {
                format!("https:{url}")
            } else {
                url.to_string()
            }
        })
}

/// Parse counts like `1.2K`, `3M`, `12 345` or `987`. Unparseable text is 0.
pub fn parse_compact_count(text: &str) -> u64 {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    let (number, scale) = if let Some(n) = compact.strip_suffix(['K', 'k']) {
        (n, 1_000.0)
    } else if let Some(n) = compact.strip_suffix(['M', 'm']) {
        (n, 1_000_000.0)
    } else {
        return compact.parse().unwrap_or(0);
    };

    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => (v * scale).round() as u64,
        _ => 0,
    }
}

/// Merge widget posts from all pages: dedup by full (text, date) keeping the
/// first, cap at [`MAX_WIDGET_POSTS`], truncate text, number from 1, then sort
/// by views descending.
pub fn finalize_widget_posts(pages: Vec<Vec<PostItem>>) -> Vec<PostItem> {
    let mut seen = HashSet::new();
    let mut posts: Vec<PostItem> = pages
        .into_iter()
        .flatten()
        .filter(|p| seen.insert((p.text.clone(), p.date)))
        .take(MAX_WIDGET_POSTS)
        .enumerate()
        .map(|(i, p)| PostItem {
            id: i as u64 + 1,
            text: truncate_chars(&p.text, MAX_POST_TEXT),
            ..p
        })
        .collect();

    posts.sort_by(|a, b| b.views.cmp(&a.views));
    posts
}

fn truncate_chars(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const WIDGET: &str = r#"
<html><body>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message text_not_supported_wrap" data-post="chan/10">
    <a class="tgme_widget_message_photo_wrap" style="width:100%;background-image:url('//cdn4.telesco.pe/file/photo1.jpg')"></a>
    <div class="tgme_widget_message_text js-message_text">New video<br/>out now &amp; <b>live</b></div>
    <div class="tgme_widget_message_reactions">
      <span class="tgme_reaction"><i class="emoji" style="background-image:url('//telegram.org/img/emoji/40/F09F9189.png')"></i><span class="tgme_widget_message_reactions_count">12</span></span>
      <span class="tgme_reaction"><span class="tgme_widget_message_reactions_count">3</span></span>
    </div>
    <span class="tgme_widget_message_views">1.2K</span>
    <time datetime="2026-02-01T10:00:00+00:00" class="time">10:00</time>
  </div>
</div>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="chan/11">
    <div class="tgme_widget_message_text">Watch https://youtu.be/dQw4w9WgXcQ</div>
    <span class="tgme_widget_message_views">980</span>
    <time datetime="2026-02-02T10:00:00+00:00">10:00</time>
  </div>
</div>
<div class="tgme_widget_message_wrap">
  <div class="tgme_widget_message" data-post="chan/12">
    <span class="tgme_widget_message_views">5</span>
  </div>
</div>
</body></html>"#;

    #[test]
    fn test_parse_widget_page() {
        let posts = parse_widget_page(WIDGET, 42);
        assert_eq!(posts.len(), 2);

        let first = &posts[0];
        assert_eq!(first.text, "New video\nout now & live");
        assert_eq!(first.photo.as_deref(), Some("https://cdn4.telesco.pe/file/photo1.jpg"));
        assert_eq!(first.views, 1200);
        assert_eq!(first.reactions, 15);
        assert_eq!(first.date, 1_769_940_000_000);

        let second = &posts[1];
        assert_eq!(
            second.photo.as_deref(),
            Some("https://img.youtube.com/vi/dQw4w9WgXcQ/maxresdefault.jpg")
        );
        assert_eq!(second.views, 980);
        assert_eq!(second.reactions, 0);
    }

    #[test]
    fn test_widget_missing_time_uses_now() {
        let html = r#"<div class="tgme_widget_message"><div class="tgme_widget_message_text">hi</div></div>"#;
        let posts = parse_widget_page(html, 1234);
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].date, 1234);
    }

    #[test]
    fn test_finalize_dedups_numbers_and_sorts() {
        let post = |text: &str, date: i64, views: u64| PostItem {
            id: 0,
            text: text.to_string(),
            date,
            views,
            reactions: 0,
            photo: None,
        };
        let pages = vec![
            vec![post("a", 1, 10), post("b", 2, 30)],
            vec![post("a", 1, 99), post("a", 5, 20)],
        ];
        let posts = finalize_widget_posts(pages);
        let summary: Vec<(u64, &str, u64)> = posts.iter().map(|p| (p.id, p.text.as_str(), p.views)).collect();
        assert_eq!(summary, vec![(2, "b", 30), (3, "a", 20), (1, "a", 10)]);
    }

    #[test]
    fn test_finalize_keys_on_untruncated_text() {
        let shared = "x".repeat(MAX_POST_TEXT);
        let post = |tail: &str| PostItem {
            id: 0,
            text: format!("{shared}{tail}"),
            date: 7,
            views: 0,
            reactions: 0,
            photo: None,
        };
        let posts = finalize_widget_posts(vec![vec![post("first ending"), post("second ending")]]);
        assert_eq!(posts.len(), 2);
        assert!(posts.iter().all(|p| p.text == shared));
    }

    #[test]
    fn test_finalize_caps_at_limit() {
        let page: Vec<PostItem> = (0..80)
            .map(|i| PostItem {
                id: 0,
                text: format!("post {i}"),
                date: i,
                views: 0,
                reactions: 0,
                photo: None,
            })
            .collect();
        let posts = finalize_widget_posts(vec![page]);
        assert_eq!(posts.len(), MAX_WIDGET_POSTS);
        assert_eq!(posts.iter().map(|p| p.id).max(), Some(50));
    }

    #[test]
    fn test_parse_compact_count() {
        assert_eq!(parse_compact_count("987"), 987);
        assert_eq!(parse_compact_count("12 345"), 12345);
        assert_eq!(parse_compact_count("1.2K"), 1200);
        assert_eq!(parse_compact_count("3M"), 3_000_000);
        assert_eq!(parse_compact_count(" 4.5 K "), 4500);
        assert_eq!(parse_compact_count(""), 0);
        assert_eq!(parse_compact_count("n/a"), 0);
    }

    #[test]
    fn test_clean_post_text() {
        let raw = r#"  Check <a href="https://x.y">this link</a> &amp; <b>that</b> &quot;quote&quot; &lt;tag&gt; "#;
        assert_eq!(clean_post_text(raw), r#"Check this link & that "quote" <tag>"#);
        assert_eq!(clean_post_text("&amp;lt;"), "&lt;");
    }

    #[test]
    fn test_from_api_item() {
        let item: ApiItem = serde_json::from_value(json!({
            "id": 77, "date": 1700000000, "views": 500,
            "text": "Hello <a href='u'>world</a>",
            "media": {"media_type": "mediaPhoto", "file_url": "https://cdn/x.jpg"}
        }))
        .unwrap();
        let post = from_api_item(&item).unwrap();
        assert_eq!(post.id, 77);
        assert_eq!(post.text, "Hello world");
        assert_eq!(post.date, 1_700_000_000_000);
        assert_eq!(post.views, 500);
        assert_eq!(post.photo.as_deref(), Some("https://cdn/x.jpg"));
    }

    #[test]
    fn test_from_api_item_skips_deleted_and_empty() {
        let deleted: ApiItem =
            serde_json::from_value(json!({"id": 1, "date": 0, "text": "x", "is_deleted": 1})).unwrap();
        assert!(from_api_item(&deleted).is_none());

        let empty: ApiItem = serde_json::from_value(json!({"id": 2, "date": 0, "text": "  <br>  "})).unwrap();
        assert!(from_api_item(&empty).is_none());
    }

    #[test]
    fn test_api_media_selection() {
        let doc: ApiItem = serde_json::from_value(json!({
            "id": 3, "date": 0,
            "media": {"media_type": "mediaDocument", "file_thumbnail_url": "https://cdn/thumb.jpg"}
        }))
        .unwrap();
        assert_eq!(from_api_item(&doc).unwrap().photo.as_deref(), Some("https://cdn/thumb.jpg"));

        let sticker: ApiItem = serde_json::from_value(json!({
            "id": 4, "date": 0,
            "media": {"media_type": "mediaSticker", "mime_type": "image/webp", "file_url": "https://cdn/s.webp"}
        }))
        .unwrap();
        assert_eq!(from_api_item(&sticker).unwrap().photo.as_deref(), Some("https://cdn/s.webp"));
    }

    #[test]
    fn test_long_text_truncated() {
        let item: ApiItem =
            serde_json::from_value(json!({"id": 5, "date": 0, "text": "я".repeat(400)})).unwrap();
        assert_eq!(from_api_item(&item).unwrap().text.chars().count(), MAX_POST_TEXT);
    }

    #[test]
    fn test_channel_info_urls() {
        let info = ChannelInfo::from_username("chan", "https://t.me/");
        assert_eq!(info.photo.as_deref(), Some("https://t.me/i/userpic/320/chan.jpg"));
        assert_eq!(
            widget_urls("https://t.me", "chan"),
            vec![
                "https://t.me/s/chan",
                "https://t.me/s/chan?embed=1",
                "https://t.me/s/chan?before=9999999999"
            ]
        );
    }
}
