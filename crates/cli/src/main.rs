use std::path::{Path, PathBuf};
use std::sync::Arc;

use aggregator::AggregatorClient;
use aipscan_core::{JobOutcome, StorageServiceId};
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use events::{Event, EventEnvelope};
use orchestrator::{MonitorConfig, PipelineOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const CONFIG_DIR: &str = ".aipscan-fetch";
const CONFIG_FILE: &str = "config.toml";

#[derive(Parser)]
#[command(name = "aipscan-fetch")]
#[command(about = "Start an AIPscan fetch job and follow it to the end", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file, defaults to .aipscan-fetch/config.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Aggregator base URL, e.g. http://localhost:5000/aggregator
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Reject task state literals outside the known set
    #[arg(long, global = true)]
    strict: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start a fetch job for a storage service and monitor it
    Run {
        #[arg(short, long)]
        storage_service: String,

        /// Print events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the effective configuration
    Config {
        /// Write it to the config file
        #[arg(long)]
        write: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| Path::new(CONFIG_DIR).join(CONFIG_FILE));
    let config = load_config(&cli, &config_path).await?;

    match cli.command {
        Commands::Run {
            ref storage_service,
            json,
        } => run(config, storage_service, json).await,
        Commands::Config { write } => show_config(&config, &config_path, write).await,
    }
}

async fn load_config(cli: &Cli, path: &Path) -> Result<MonitorConfig> {
    let mut config = MonitorConfig::read(path).await;
    if let Some(ref base_url) = cli.base_url {
        config.base_url = base_url.clone();
    }
    if cli.strict {
        config.strict_states = true;
    }
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

async fn run(config: MonitorConfig, storage_service: &str, json: bool) -> Result<()> {
    init_tracing();

    let storage_service_id =
        StorageServiceId::new(storage_service).context("Invalid storage service id")?;

    let http = reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .context("Failed to build HTTP client")?;
    let client =
        AggregatorClient::with_client(&config.base_url, http).with_strict_states(config.strict_states);

    tracing::info!(base_url = %config.base_url, "Aggregator");

    let orchestrator = PipelineOrchestrator::new(Arc::new(client), config);
    let mut handle = orchestrator.start(storage_service_id)?;

    if !json {
        println!();
        println!(
            "Fetch job {} for storage service {}",
            handle.job_id().to_string().bold(),
            handle.storage_service_id().to_string().bold()
        );
        println!("Press Ctrl+C to cancel");
        println!();
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                handle.cancel();
                if !json {
                    println!("{}", "Cancelled".yellow());
                }
                break;
            }
            envelope = handle.next_event() => match envelope {
                Some(envelope) if json => println!("{}", serde_json::to_string(&envelope)?),
                Some(envelope) => render(&envelope),
                None => break,
            },
        }
    }

    match handle.join().await {
        JobOutcome::Failed => bail!("Fetch job failed"),
        JobOutcome::TimedOut => bail!("Fetch job timed out"),
        _ => Ok(()),
    }
}

fn render(envelope: &EventEnvelope) {
    match &envelope.event {
        Event::JobStarted {
            fetch_job_id,
            started_at,
            ..
        } => println!(
            "{} fetch job {} at {}",
            "Started".green().bold(),
            fetch_job_id,
            started_at
        ),
        Event::JobStartFailed { reason, .. } => {
            println!("{} {}", "Could not start:".red().bold(), reason)
        }
        Event::PhaseStarted { phase, .. } => println!("{}", phase.label().cyan().bold()),
        Event::PhaseMessage { message, .. } => println!("  {}", message),
        Event::PhaseProgress {
            state, processed, ..
        } => match processed {
            Some(count) => println!("  {} {} ({} AIPs)", "·".dimmed(), state.dimmed(), count),
            None => println!("  {} {}", "·".dimmed(), state.dimmed()),
        },
        Event::PhaseSucceeded { phase, state, .. } => {
            println!("  {} {} {}", "✓".green(), phase.label(), state.dimmed())
        }
        Event::PhaseFailed { phase, reason, .. } => {
            println!("  {} {}: {}", "✗".red(), phase.label(), reason)
        }
        Event::TriggerReleased { .. } => {}
        Event::JobCompleted {
            indexed,
            refresh_after_ms,
            ..
        } => {
            println!();
            if *indexed {
                println!("{}", "Fetch job completed".green().bold());
            } else {
                println!(
                    "{}",
                    "Fetch job completed, index refresh not needed".green().bold()
                );
            }
            println!(
                "{}",
                format!("Reload the report view in {} ms", refresh_after_ms).dimmed()
            );
        }
        Event::JobFailed { phase, reason, .. } => {
            println!();
            println!("{} {}: {}", "Failed during".red().bold(), phase.label(), reason);
        }
        Event::JobTimedOut {
            phase, elapsed_ms, ..
        } => {
            println!();
            println!(
                "{} {} after {} ms",
                "Timed out during".red().bold(),
                phase.label(),
                elapsed_ms
            );
        }
    }
}

async fn show_config(config: &MonitorConfig, path: &Path, write: bool) -> Result<()> {
    let content = toml::to_string_pretty(config)?;
    println!("# {}", path.display());
    println!("{}", content);

    if write {
        config
            .write(path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Saved to {}", path.display());
    }
    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "aipscan_fetch=info,orchestrator=info,aggregator=warn".into()),
        )
        .init();
}
