use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use lookout_common::observability::init_logging;
use lookout_feed::FeedService;

#[derive(Debug, Parser)]
#[command(name = "lookout", version, about = "Aggregate recent posts from tracked Twitter/X accounts")]
struct Cli {
    /// YAML configuration file. Defaults to ./lookout.yaml and the user config dir.
    #[arg(short, long, env = "LOOKOUT_CONFIG", global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Serve the feed API (default).
    Serve {
        /// Overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Run one aggregation and print the response as JSON.
    Fetch {
        /// Accounts to fetch instead of the configured ones.
        usernames: Vec<String>,
        #[arg(long)]
        pretty: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 1) Load config (env wins)
    let cfg = lookout_app::load_config(cli.config.as_deref())?;

    let log_path = init_logging(cfg.logging.to_log_config())?;
    tracing::info!(
        log = %log_path.display(),
        accounts = cfg.accounts.len(),
        strategy = ?cfg.twitter.strategy,
        "lookout.start"
    );

    let service = Arc::new(FeedService::from_config(&cfg)?);

    match cli.command.unwrap_or(Command::Serve { bind: None }) {
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| cfg.server.bind.clone());
            lookout_app::server::serve(service, &bind).await
        }
        Command::Fetch { usernames, pretty } => {
            let explicit = (!usernames.is_empty()).then_some(usernames);
            let resp = service.feed(explicit.as_deref()).await;
            let out = if pretty {
                serde_json::to_string_pretty(&resp)?
            } else {
                serde_json::to_string(&resp)?
            };
            println!("{out}");
            Ok(())
        }
    }
}
