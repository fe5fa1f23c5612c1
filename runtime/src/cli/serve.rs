//! `creatorfeed serve`: run the REST API and the subscriber poller.

use crate::config::Config;
use crate::rest::{self, AppState};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::info;

pub async fn run(port: Option<u16>) -> Result<()> {
    let mut config = Config::from_env();
    if let Some(port) = port {
        config.port = port;
    }
    info!("starting Creatorfeed v{}", env!("CARGO_PKG_VERSION"));
    tracing::debug!("config: {config:?}");

    std::fs::create_dir_all(&config.data_dir)
        .with_context(|| format!("failed to create data directory {}", config.data_dir.display()))?;

    let state = Arc::new(AppState::from_config(&config));
    let shutdown = Arc::new(Notify::new());

    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("received shutdown signal");
        shutdown_signal.notify_waiters();
    });

    let poller = if config.bot_token.is_some() {
        Some(state.channel.clone().spawn_poller(state.bus.clone(), config.poll_interval, shutdown.clone()))
    } else {
        info!("BOT_TOKEN not set; subscriber polling disabled");
        None
    };

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;

    let result = rest::serve(listener, state, shutdown).await;
    if let Some(poller) = poller {
        poller.abort();
    }
    info!("Creatorfeed stopped");
    result
}
