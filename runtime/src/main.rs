// Copyright 2026 Creatorfeed Contributors
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use creatorfeed_runtime::cli;

#[derive(Parser)]
#[command(
    name = "creatorfeed",
    about = "Creatorfeed: creator videos, posts and subscriber counts from public pages",
    version,
    after_help = "Run 'creatorfeed <command> --help' for details on each command."
)]
struct Cli {
    /// Output results as JSON (machine-readable)
    #[arg(long, global = true)]
    json: bool,

    /// Enable verbose/debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP API and the subscriber poller
    Serve {
        /// Listen port (overrides CREATORFEED_PORT / PORT)
        #[arg(long)]
        port: Option<u16>,
    },
    /// List a channel's videos
    Videos {
        /// Channel handle, with or without the leading '@'
        handle: String,
        /// Maximum number of items (1-100)
        #[arg(long)]
        max: Option<u32>,
        /// Sort key (source, views, date)
        #[arg(long)]
        sort: Option<String>,
        /// Sort direction (desc, asc)
        #[arg(long)]
        order: Option<String>,
        /// Only short-form items
        #[arg(long)]
        shorts_only: bool,
    },
    /// List the channel's recent posts
    Posts,
    /// Show the channel's subscriber count and deltas
    Channel,
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "creatorfeed=debug" } else { "creatorfeed=info" };
    let mut filter = tracing_subscriber::EnvFilter::from_default_env();
    if let Ok(directive) = level.parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.json {
        std::env::set_var(cli::output::JSON_ENV, "1");
    }
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Serve { port } => cli::serve::run(port).await,
        Commands::Videos {
            handle,
            max,
            sort,
            order,
            shorts_only,
        } => cli::videos_cmd::run(&handle, max, sort.as_deref(), order.as_deref(), shorts_only).await,
        Commands::Posts => cli::posts_cmd::run().await,
        Commands::Channel => cli::channel_cmd::run().await,
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "creatorfeed", &mut std::io::stdout());
            Ok(())
        }
    };

    // Consistent exit codes: 0=success, 1=error
    if let Err(e) = &result {
        if cli::output::is_json() {
            cli::output::print_json(&serde_json::json!({
                "error": true,
                "message": format!("{e:#}"),
            }));
        } else {
            eprintln!("  Error: {e:#}");
        }
        std::process::exit(1);
    }

    result
}
