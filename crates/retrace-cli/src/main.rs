mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use retrace_device::{DeviceClient, DeviceConfig, GlobalAction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "retrace", version)]
#[command(about = "Record and replay Android UI workflows over the accessibility portal", long_about = None)]
struct Cli {
    /// Base URL of the device portal
    #[arg(long, env = "RETRACE_DEVICE_URL", default_value = "http://127.0.0.1:8080", global = true)]
    device_url: String,

    /// Per-request timeout in seconds
    #[arg(long, env = "RETRACE_TIMEOUT", default_value_t = 10, global = true)]
    timeout: u64,

    /// Directory for the JSON log files (defaults to ./logs)
    #[arg(long, env = "RETRACE_LOG_DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that the device portal answers
    Ping,

    /// Print the current accessibility tree with each node's primary selector
    Dump,

    /// Press a system button: back, home, recents or notifications
    Global { action: GlobalAction },

    /// Print the selector chain generated for a captured element
    Selectors {
        /// JSON file holding the element's attributes
        element: PathBuf,
    },

    /// Replay a workflow file (.json, .yaml or .yml)
    Replay {
        workflow: PathBuf,

        /// Keep going after a failed step
        #[arg(long)]
        continue_on_error: bool,

        /// Attempts per device call, counting the first
        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        #[arg(long, default_value_t = 500)]
        retry_delay_ms: u64,

        /// Pause between consecutive steps
        #[arg(long, default_value_t = 500)]
        step_delay_ms: u64,
    },

    /// Record interactions from the device until Ctrl-C, then save them
    Record {
        /// Output workflow file (.json, .yaml or .yml)
        #[arg(short, long)]
        out: PathBuf,

        /// Workflow name (defaults to the output file stem)
        #[arg(short, long)]
        name: Option<String>,

        #[arg(long, default_value_t = 500)]
        poll_ms: u64,
    },
}

impl Cli {
    fn device(&self) -> anyhow::Result<DeviceClient> {
        let config = DeviceConfig {
            base_url: self.device_url.clone(),
            timeout: Duration::from_secs(self.timeout),
        };
        DeviceClient::new(config).context("failed to set up device client")
    }
}

fn default_log_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join("logs")
}

fn init_logging(log_dir: &Path) -> anyhow::Result<tracing_appender::non_blocking::WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("retrace")
        .filename_suffix("txt")
        .build(log_dir)
        .context("failed to create log file appender")?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file_filter = EnvFilter::new("trace");

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(file_filter),
        )
        .init();
    Ok(guard)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_dir = cli.log_dir.clone().unwrap_or_else(default_log_dir);
    let _guard = init_logging(&log_dir)?;

    match &cli.command {
        Commands::Ping => commands::ping(&cli.device()?).await,
        Commands::Dump => commands::dump(&cli.device()?).await,
        Commands::Global { action } => commands::global(&cli.device()?, *action).await,
        Commands::Selectors { element } => commands::selectors(element),
        Commands::Replay {
            workflow,
            continue_on_error,
            max_attempts,
            retry_delay_ms,
            step_delay_ms,
        } => {
            let config = retrace_engine::ReplayConfig {
                stop_on_error: !continue_on_error,
                max_attempts: *max_attempts,
                retry_delay: Duration::from_millis(*retry_delay_ms),
                step_delay: Duration::from_millis(*step_delay_ms),
                ..Default::default()
            };
            commands::replay(cli.device()?, workflow, config).await
        }
        Commands::Record { out, name, poll_ms } => {
            let config = retrace_engine::RecordingConfig {
                poll_interval: Duration::from_millis(*poll_ms),
            };
            commands::record(cli.device()?, out, name.clone(), config).await
        }
    }
}
