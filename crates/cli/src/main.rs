mod bot;
mod config_commands;
mod db_commands;

use std::path::{Path, PathBuf};

use {
    clap::{Parser, Subcommand},
    crosschat_config::CrossChatConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "crosschat", about = "CrossChat, a cross-guild Discord chat relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (overrides discovery in `./` and the user config dir).
    #[arg(long, global = true, env = "CROSSCHAT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and start relaying (default when no subcommand is provided).
    Run,
    /// Configuration inspection.
    Config {
        #[command(subcommand)]
        action: config_commands::ConfigAction,
    },
    /// Database management.
    Db {
        #[command(subcommand)]
        action: db_commands::DbAction,
    },
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// An explicit path must load; discovery falls back to defaults.
fn load(path: Option<&Path>) -> anyhow::Result<CrossChatConfig> {
    match path {
        Some(path) => Ok(crosschat_config::load_config(path)?),
        None => Ok(crosschat_config::discover_and_load()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    init_telemetry(&cli);

    info!(version = env!("CARGO_PKG_VERSION"), "crosschat starting");

    let path = cli.config.as_deref();
    match cli.command {
        None | Some(Commands::Run) => bot::run(load(path)?).await,
        Some(Commands::Config { action }) => config_commands::handle_config(action, path),
        Some(Commands::Db { action }) => {
            let config = load(path)?;
            db_commands::handle_db(action, &config.database).await
        },
    }
}
