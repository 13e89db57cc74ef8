mod commands;
mod telemetry;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand};
use gateway_client::config::DEFAULT_BASE_URL;
use gateway_client::guide::Platform;
use gateway_client::{ComparisonOp, KeyScope};
use std::path::PathBuf;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gateway-cli", version, about = "Command-line client for the IoT gateway")]
pub struct Cli {
    /// Gateway base URL
    #[arg(long, global = true, env = "GATEWAY_API_URL", default_value = DEFAULT_BASE_URL)]
    pub api_url: String,

    /// File holding saved channels and their API keys
    #[arg(long, global = true, env = "GATEWAY_STORE_PATH", default_value = ".iot-gateway.json")]
    pub store: PathBuf,

    /// Print client request metrics after the command
    #[arg(long, global = true)]
    pub print_metrics: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// API key given directly, or looked up from a saved channel.
#[derive(Debug, Clone, Args)]
pub struct KeyArgs {
    #[arg(long, env = "GATEWAY_API_KEY")]
    pub key: Option<String>,

    /// Saved channel whose key to use
    #[arg(long)]
    pub channel: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a channel, issue a read/write key and save both locally
    Create {
        #[arg(long, default_value = "Demo Channel")]
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Comma-separated field names
        #[arg(long, default_value = "temperature,humidity")]
        fields: String,
    },
    /// Show one channel
    Channel { id: String },
    /// Issue an API key for a channel
    Key {
        channel_id: String,
        #[arg(long, default_value = "readwrite")]
        scope: KeyScope,
    },
    /// Submit one reading, given as field=value pairs
    Post {
        #[command(flatten)]
        auth: KeyArgs,
        #[arg(required = true)]
        fields: Vec<String>,
    },
    /// Show the latest reading
    Latest {
        #[command(flatten)]
        auth: KeyArgs,
    },
    /// List readings, newest first
    Readings {
        #[command(flatten)]
        auth: KeyArgs,
        #[arg(long, default_value_t = 100)]
        limit: u32,
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Show the time series of one field
    Series {
        #[command(flatten)]
        auth: KeyArgs,
        #[arg(long)]
        field: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },
    /// Manage threshold webhook workflows
    #[command(subcommand)]
    Workflow(WorkflowCommand),
    /// Download readings as CSV
    Export {
        #[command(flatten)]
        auth: KeyArgs,
        #[arg(long, default_value_t = 1000)]
        limit: u32,
        /// Write to a file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Manage locally saved channels
    #[command(subcommand)]
    Saved(SavedCommand),
    /// Poll a channel's latest reading and series
    Watch {
        channel_id: String,
        #[arg(long)]
        key: Option<String>,
        /// Field to chart; defaults to temperature, else the channel's first field
        #[arg(long)]
        field: Option<String>,
        #[arg(long, default_value_t = 10)]
        interval_secs: u64,
        /// Stop after this many refreshes
        #[arg(long)]
        count: Option<u64>,
    },
    /// Print device integration code for a channel
    Guide {
        channel_id: String,
        #[arg(long)]
        key: Option<String>,
        #[arg(long, default_value = "esp32")]
        platform: Platform,
    },
    /// Post random readings at a fixed interval
    Simulate {
        #[command(flatten)]
        auth: KeyArgs,
        /// Comma-separated field names
        #[arg(long, default_value = "temperature,humidity")]
        fields: String,
        #[arg(long, default_value_t = 15)]
        interval_secs: u64,
        /// Stop after this many readings
        #[arg(long)]
        count: Option<u64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum WorkflowCommand {
    /// Create a workflow that calls a webhook when a rule matches
    Create {
        #[command(flatten)]
        auth: KeyArgs,
        #[arg(long, default_value = "Alert Workflow")]
        name: String,
        #[arg(long, default_value = "temperature")]
        field: String,
        /// One of >, >=, <, <=, ==
        #[arg(long, default_value = ">")]
        op: ComparisonOp,
        #[arg(long, default_value_t = 30.0, allow_negative_numbers = true)]
        value: f64,
        #[arg(long, default_value = "https://webhook.site/")]
        url: String,
        /// Create the workflow disabled
        #[arg(long)]
        disabled: bool,
    },
    /// List workflows of the key's channel
    List {
        #[command(flatten)]
        auth: KeyArgs,
    },
}

#[derive(Debug, Subcommand)]
pub enum SavedCommand {
    List,
    Remove { id: String },
    Clear,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = commands::run(cli).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
