//! `creatorfeed posts`: print the channel's recent posts.

use crate::cli::output;
use crate::config::Config;
use crate::rest::AppState;
use anyhow::Result;

pub async fn run() -> Result<()> {
    let state = AppState::from_config(&Config::from_env());
    let listing = state.posts.list().await?;

    if output::is_json() {
        output::print_json(&listing);
        return Ok(());
    }

    println!("  {} (@{})", listing.channel.title, listing.channel.username);
    if listing.cached {
        println!("  (served from cache)");
    }
    for post in &listing.posts {
        let when = chrono::DateTime::from_timestamp_millis(post.date)
            .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_default();
        let first_line = post.text.lines().next().unwrap_or("");
        println!(
            "  {when}  {:>6} views  {:>4} reactions  {first_line}",
            output::compact(post.views),
            post.reactions
        );
    }
    Ok(())
}
