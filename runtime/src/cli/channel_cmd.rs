//! `creatorfeed channel`: print the subscriber count and its deltas.

use crate::cli::output;
use crate::config::Config;
use crate::rest::AppState;
use anyhow::Result;

pub async fn run() -> Result<()> {
    let state = AppState::from_config(&Config::from_env());
    let snapshot = state.channel.snapshot().await?;

    if output::is_json() {
        output::print_json(&snapshot);
        return Ok(());
    }

    let subscribers = snapshot
        .subscribers
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unavailable".to_string());
    println!("  {} (@{})", snapshot.title, snapshot.username);
    println!("  Subscribers: {subscribers}");
    println!("  24h: {}   7d: {}", output::delta(snapshot.delta_24h), output::delta(snapshot.delta_7d));
    Ok(())
}
