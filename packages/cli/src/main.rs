//! `jobstore`: inspect and maintain a job storage from the command line.

use std::path::PathBuf;

use anyhow::{Context, Result};
use api::{JobStorage, MonitoringApi};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

mod config;

use config::FileConfig;

#[derive(Parser, Debug)]
#[command(name = "jobstore", version, about = "Inspect and maintain a job storage")]
struct CliArgs {
    /// TOML configuration file
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Database endpoint, e.g. `mem://` or `rocksdb://./data`
    #[arg(long)]
    endpoint: Option<String>,

    #[arg(long)]
    namespace: Option<String>,

    #[arg(long)]
    database: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Dashboard totals
    Stats,
    /// Queues with their backlog and oldest jobs
    Queues,
    /// Registered servers
    Servers,
    /// One job with its state history
    Job { job_id: String },
    /// Jobs currently in a state, newest first
    Jobs {
        #[arg(value_enum)]
        state: ListedState,
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Jobs waiting in a queue, oldest first
    Enqueued {
        queue: String,
        #[arg(long, default_value_t = 0)]
        from: usize,
        #[arg(long, default_value_t = 20)]
        count: usize,
    },
    /// Succeeded or failed jobs per day (or per hour)
    Timeline {
        #[arg(value_enum, default_value_t = TimelineStat::Succeeded)]
        stat: TimelineStat,
        #[arg(long)]
        hourly: bool,
    },
    /// Run a maintenance sweep once
    Sweep {
        #[arg(value_enum, default_value_t = SweepTarget::All)]
        target: SweepTarget,
    },
    /// Run the background sweeps until interrupted
    Serve,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ListedState {
    Processing,
    Scheduled,
    Succeeded,
    Failed,
    Deleted,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum TimelineStat {
    Succeeded,
    Failed,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum SweepTarget {
    Aggregate,
    Expire,
    All,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli_args = CliArgs::parse();

    let file_config = FileConfig::load(cli_args.config.as_deref())?;
    let mut db_config = file_config.db_config();
    if let Some(endpoint) = cli_args.endpoint {
        db_config = db_config.with_endpoint(endpoint);
    }
    if let Some(namespace) = cli_args.namespace {
        db_config = db_config.with_namespace(namespace);
    }
    if let Some(database) = cli_args.database {
        db_config = db_config.with_database(database);
    }

    let storage = JobStorage::connect(db_config, file_config.storage)
        .await
        .context("Failed to connect to the job storage")?;

    run(cli_args.command, &storage).await
}

async fn run(command: Command, storage: &JobStorage) -> Result<()> {
    let monitoring = storage.monitoring_api();

    match command {
        Command::Stats => print_json(&monitoring.get_statistics().await?),
        Command::Queues => print_json(&monitoring.queues().await?),
        Command::Servers => print_json(&monitoring.servers().await?),
        Command::Job { job_id } => match monitoring.job_details(&job_id).await? {
            Some(details) => print_json(&details),
            None => anyhow::bail!("Job {} not found", job_id),
        },
        Command::Jobs { state, from, count } => list_jobs(&monitoring, state, from, count).await,
        Command::Enqueued { queue, from, count } => {
            print_json(&monitoring.enqueued_jobs(&queue, from, count).await?)
        }
        Command::Timeline { stat, hourly } => {
            let timeline = match (stat, hourly) {
                (TimelineStat::Succeeded, false) => monitoring.succeeded_by_dates_count().await?,
                (TimelineStat::Failed, false) => monitoring.failed_by_dates_count().await?,
                (TimelineStat::Succeeded, true) => monitoring.hourly_succeeded_jobs().await?,
                (TimelineStat::Failed, true) => monitoring.hourly_failed_jobs().await?,
            };
            print_json(&timeline)
        }
        Command::Sweep { target } => sweep(storage, target).await,
        Command::Serve => serve(storage).await,
    }
}

async fn list_jobs(monitoring: &MonitoringApi, state: ListedState, from: usize, count: usize) -> Result<()> {
    match state {
        ListedState::Processing => print_json(&monitoring.processing_jobs(from, count).await?),
        ListedState::Scheduled => print_json(&monitoring.scheduled_jobs(from, count).await?),
        ListedState::Succeeded => print_json(&monitoring.succeeded_jobs(from, count).await?),
        ListedState::Failed => print_json(&monitoring.failed_jobs(from, count).await?),
        ListedState::Deleted => print_json(&monitoring.deleted_jobs(from, count).await?),
    }
}

async fn sweep(storage: &JobStorage, target: SweepTarget) -> Result<()> {
    let components = storage.start_components().await?;

    let result = async {
        if matches!(target, SweepTarget::Aggregate | SweepTarget::All) {
            let folded = components.run_aggregation_now().await?;
            tracing::info!("Folded {} raw counters", folded);
        }
        if matches!(target, SweepTarget::Expire | SweepTarget::All) {
            let removed = components.run_expiration_now().await?;
            tracing::info!("Removed {} expired documents", removed);
        }
        anyhow::Ok(())
    }
    .await;

    components.shutdown().await?;
    result
}

async fn serve(storage: &JobStorage) -> Result<()> {
    storage.write_options_to_log();
    let components = storage.start_components().await?;
    tracing::info!("Background sweeps running, press Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    components.shutdown().await?;
    tracing::info!("Stopped");
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
