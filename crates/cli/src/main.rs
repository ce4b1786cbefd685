mod config;
mod items;
mod output;
mod watch;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::output::OutputFormat;

#[derive(Parser)]
#[command(
    name = "itemboard",
    version,
    about = "Shared item list with realtime sync"
)]
struct Cli {
    /// Config file (default: ~/.config/itemboard/itemboard.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List all items
    List {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Create an item
    Add {
        /// Item title (leading and trailing whitespace is dropped)
        title: String,
    },

    /// Flip an item's completed flag
    Toggle { id: String },

    /// Delete an item
    Delete { id: String },

    /// Show the board live and keep it in sync; reads commands from stdin
    Watch {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Show or set configuration
    Config {
        /// Set the GraphQL endpoint URL
        #[arg(long)]
        endpoint: Option<String>,

        /// Set the AWS region
        #[arg(long)]
        region: Option<String>,

        /// Set the API key
        #[arg(long)]
        api_key: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,itemboard=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<()> {
    let path = config::resolve_path(cli.config.as_deref())?;

    let command = match cli.command {
        Commands::Config {
            endpoint,
            region,
            api_key,
        } => {
            return if endpoint.is_none() && region.is_none() && api_key.is_none() {
                config::show_config(&path)
            } else {
                config::set_config(&path, endpoint, region, api_key)
            };
        }
        command => command,
    };

    let cfg = config::load_validated(&path)?;
    let client = config::api_client(&cfg)?;

    match command {
        Commands::List { format } => items::run_list(client, &format).await,
        Commands::Add { title } => items::run_add(&client, &title).await,
        Commands::Toggle { id } => items::run_toggle(&client, &id).await,
        Commands::Delete { id } => items::run_delete(&client, &id).await,
        Commands::Watch { format } => watch::run_watch(&cfg, client, &format).await,
        Commands::Config { .. } => Ok(()),
    }
}
