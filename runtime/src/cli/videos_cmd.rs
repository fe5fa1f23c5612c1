//! `creatorfeed videos <handle>`: fetch and print one merged listing.

use crate::cli::output;
use crate::config::Config;
use crate::protocol::ListingQuery;
use crate::rest::AppState;
use anyhow::Result;

pub async fn run(handle: &str, max: Option<u32>, sort: Option<&str>, order: Option<&str>, shorts_only: bool) -> Result<()> {
    let max = max.map(|m| m.to_string());
    let mut query = ListingQuery::parse(Some(handle), max.as_deref(), sort, order)?;
    if shorts_only {
        query = query.shorts_only();
    }

    let state = AppState::from_config(&Config::from_env());
    let listing = state.videos.list(&query).await?;

    if output::is_json() {
        output::print_json(&listing);
        return Ok(());
    }

    if listing.items.is_empty() {
        println!("  No videos found for @{}", query.handle);
        return Ok(());
    }
    for (i, item) in listing.items.iter().enumerate() {
        let kind = if item.is_short { "short" } else { "video" };
        println!(
            "  {:>3}. [{kind}] {}  ({} views, {})",
            i + 1,
            item.title,
            output::compact(item.view_count),
            output::duration(item.duration_seconds)
        );
        println!("       {}", item.url);
    }
    if let Some(note) = &listing.note {
        println!("\n  Note: {note}");
    }
    Ok(())
}
