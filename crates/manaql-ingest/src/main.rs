//! ManaQL Ingest - card catalog ingestion tool

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use manaql_common::logging::{init_logging, LogConfig, LogLevel};
use manaql_ingest::catalog::{BulkDataClient, FileCatalogSource};
use manaql_ingest::config::{default_workers, IngestConfig, DEFAULT_CATALOG_FILE};
use manaql_ingest::coordinator::{IngestError, IngestReport, IngestionCoordinator, RunContext};
use manaql_ingest::normalize::SerializationRule;
use manaql_ingest::store::{CatalogStore, PgCatalogStore, RunCommand};
use manaql_ingest::strategy::ExecutionStrategy;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "manaql-ingest")]
#[command(author, version, about = "ManaQL card catalog ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Download the bulk card catalog
    Download {
        #[command(flatten)]
        download: DownloadArgs,
    },

    /// Ingest a catalog file into the database
    Ingest {
        /// Catalog file (JSON array, optionally gzip-compressed)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        options: IngestArgs,
    },

    /// Download the catalog, then ingest it
    All {
        #[command(flatten)]
        download: DownloadArgs,

        #[command(flatten)]
        options: IngestArgs,
    },
}

#[derive(Args, Debug)]
struct DownloadArgs {
    /// Directory the catalog is written to
    #[arg(long, env = "MANAQL_ARTIFACT_DIR")]
    output_dir: Option<PathBuf>,

    /// File name of the downloaded catalog
    #[arg(long, default_value = DEFAULT_CATALOG_FILE)]
    file_name: String,
}

#[derive(Args, Debug)]
struct IngestArgs {
    /// Batch execution strategy: sequential or parallel
    #[arg(long, env = "INGEST_STRATEGY")]
    strategy: Option<String>,

    /// Concurrent workers for the parallel strategy
    #[arg(long, env = "INGEST_WORKERS")]
    workers: Option<usize>,

    /// Records per write batch
    #[arg(long, env = "INGEST_BATCH_SIZE")]
    batch_size: Option<usize>,

    /// Serialized printing detection: promo_type or collector_number
    #[arg(long, env = "INGEST_SERIALIZATION_RULE")]
    serialization_rule: Option<SerializationRule>,
}

impl IngestArgs {
    /// Overlay flags on the loaded configuration
    fn apply(&self, config: &mut IngestConfig) -> Result<()> {
        if let Some(batch_size) = self.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(rule) = self.serialization_rule {
            config.serialization_rule = rule;
        }

        let workers = self.workers.unwrap_or(match config.strategy {
            ExecutionStrategy::Parallel { workers } => workers,
            ExecutionStrategy::Sequential => default_workers(),
        });
        let name = self.strategy.as_deref().unwrap_or(config.strategy.as_str());
        config.strategy = ExecutionStrategy::from_name(name, workers).map_err(anyhow::Error::msg)?;

        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over the flag
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("manaql-ingest")
        .build()
        .merge_env()?;

    init_logging(&log_config)?;

    let mut config = IngestConfig::load()?;

    match cli.command {
        Command::Download { download } => {
            let store = open_store(&config).await?;
            logged(
                store.as_ref(),
                RunCommand::Download,
                download_catalog(&config, &download),
                |path: &PathBuf| format!("downloaded {}", path.display()),
            )
            .await?;
        },
        Command::Ingest { input, options } => {
            options.apply(&mut config)?;
            let store = open_store(&config).await?;
            let report = logged(
                store.as_ref(),
                RunCommand::Ingest,
                ingest(&config, store.clone(), &input),
                summary,
            )
            .await?;
            print_report(&report)?;
        },
        Command::All { download, options } => {
            options.apply(&mut config)?;
            let store = open_store(&config).await?;
            let report = logged(
                store.as_ref(),
                RunCommand::All,
                async {
                    let path = download_catalog(&config, &download).await?;
                    ingest(&config, store.clone(), &path).await
                },
                summary,
            )
            .await?;
            print_report(&report)?;
        },
    }

    Ok(())
}

async fn open_store(config: &IngestConfig) -> Result<Arc<PgCatalogStore>> {
    let store = PgCatalogStore::connect(&config.database)
        .await
        .context("Failed to connect to database")?;
    store
        .migrate()
        .await
        .context("Failed to apply database migrations")?;
    Ok(Arc::new(store))
}

/// Run `work`, recording start and outcome in the run log
async fn logged<T, F, S>(
    store: &dyn CatalogStore,
    command: RunCommand,
    work: F,
    describe: S,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
    S: Fn(&T) -> String,
{
    record(store, command, &format!("{} started", command)).await;

    match work.await {
        Ok(value) => {
            record(store, command, &describe(&value)).await;
            Ok(value)
        },
        Err(e) => {
            record(store, command, &format!("{} failed: {:#}", command, e)).await;
            Err(e)
        },
    }
}

async fn record(store: &dyn CatalogStore, command: RunCommand, message: &str) {
    if let Err(e) = store.record_run(command, message).await {
        warn!("Failed to write run log entry: {}", e);
    }
}

async fn download_catalog(config: &IngestConfig, args: &DownloadArgs) -> Result<PathBuf> {
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.artifact_dir.clone());

    info!("Downloading {} catalog", config.scryfall.bulk_type);
    BulkDataClient::new(&config.scryfall)?
        .download(&output_dir, &args.file_name)
        .await
}

async fn ingest(config: &IngestConfig, store: Arc<PgCatalogStore>, input: &Path) -> Result<IngestReport> {
    if !input.exists() {
        anyhow::bail!("Catalog file not found: {}", input.display());
    }

    let coordinator = IngestionCoordinator::from_config(store, config)
        .context("Failed to build normalizer")?;
    let source = FileCatalogSource::new(input);

    let result = coordinator.run(&mut RunContext::new(), &source).await;
    if let Err(IngestError::ChunksExhausted { report, .. }) = &result {
        print_report(report)?;
    }
    Ok(result?)
}

fn summary(report: &IngestReport) -> String {
    format!(
        "ingested {} cards and {} printings ({} failed) in {:.1}s",
        report.cards_created,
        report.printings_created,
        report.failed_names.len(),
        report.duration_secs
    )
}

fn print_report(report: &IngestReport) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(report)?);
    Ok(())
}
