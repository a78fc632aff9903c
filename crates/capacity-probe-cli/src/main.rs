//! capacity-probe command-line entry point.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use capacity_probe::batch::effective_query;
use capacity_probe::{build_request, BatchOrchestrator, BatchProgress, DiagnosticsRecorder, DirectorySnapshotStore};
use capacity_probe_cli::config::{load_config, load_job, resolve_config_path};
use capacity_probe_cli::output::{render_json, render_table, summary_line};
use capacity_probe_cli::renderer::ChromiumProvider;

#[derive(Parser)]
#[command(
    name = "capacity-probe",
    about = "Find how many seats remain on a flight by raising passenger count until it disappears",
    version
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Probe every item of a job file.
    Run {
        /// Path to the job file (JSON).
        #[arg(short, long)]
        job: PathBuf,

        /// Path to the configuration file.
        #[arg(short, long)]
        config: Option<String>,

        /// Directory for review snapshots.
        #[arg(long)]
        snapshot_dir: Option<PathBuf>,

        /// Override the job's demand ceiling.
        #[arg(long, value_parser = clap::value_parser!(u32).range(1..))]
        ceiling: Option<u32>,

        /// Print results as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Check a job file without opening a browser.
    Validate {
        /// Path to the job file (JSON).
        #[arg(short, long)]
        job: PathBuf,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   capacity-probe completions bash > ~/.local/share/bash-completion/completions/capacity-probe
    ///   capacity-probe completions zsh > ~/.zfunc/_capacity-probe
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Run {
            job,
            config,
            snapshot_dir,
            ceiling,
            json,
        } => {
            let mut job_file = load_job(&job)?;
            if let Some(ceiling) = ceiling {
                job_file.ceiling = ceiling;
            }

            let config_path = resolve_config_path(config.as_deref());
            let app_config = load_config(&config_path)
                .with_context(|| format!("loading configuration from {}", config_path.display()))?;
            let snapshot_dir = snapshot_dir.unwrap_or_else(|| app_config.snapshot_dir());
            tracing::info!("Job: {}", job.display());
            tracing::info!("Snapshots: {}", snapshot_dir.display());

            let recorder = DiagnosticsRecorder::new(Arc::new(DirectorySnapshotStore::new(snapshot_dir)));
            let orchestrator = BatchOrchestrator::new(recorder)
                .with_interaction_timeout(Duration::from_millis(app_config.source.interaction_timeout_ms));
            let provider = ChromiumProvider::new(app_config.source);

            let mut on_progress = |p: &BatchProgress| {
                eprintln!("[{}] {} (max {})", p.label(), p.status, p.confirmed_max);
            };
            let results = orchestrator
                .submit_batch(&provider, job_file.into_job(), Some(&mut on_progress))
                .await;

            if json {
                println!("{}", render_json(&results)?);
            } else {
                print!("{}", render_table(&results));
                println!("{}", summary_line(&results));
            }
        }

        Commands::Validate { job } => {
            let job_file = match load_job(&job) {
                Ok(job_file) => job_file,
                Err(e) => {
                    eprintln!("Invalid job file: {e}");
                    std::process::exit(1);
                }
            };

            let today = chrono::Local::now().date_naive();
            let batch = job_file.into_job();
            let mut problems = 0;
            for (i, item) in batch.items.iter().enumerate() {
                let query = effective_query(&item.query, &batch.config);
                let checked = build_request(&query, today).and_then(|_| item.target.validate());
                if let Err(e) = checked {
                    problems += 1;
                    eprintln!("  item {}: {e}", i + 1);
                }
            }

            if problems > 0 {
                eprintln!("{problems} of {} items are invalid", batch.len());
                std::process::exit(1);
            }
            println!("Valid job file: {}", job.display());
            println!("  Items: {}", batch.len());
            println!("  Ceiling: {}", batch.config.ceiling);
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "capacity-probe", &mut std::io::stdout());
        }
    }

    Ok(())
}
