use anyhow::Context;
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{error, info, warn};

use daily_ingest::app::{DatasetOutcome, PipelineDriver};
use daily_ingest::common::config::{parse_ingestion_date, PipelineConfig};
use daily_ingest::observability::{init_logging, metrics};
use daily_ingest::pipeline::DatasetName;

#[derive(Parser)]
#[command(name = "daily_ingest")]
#[command(about = "Daily clickstream and transaction ingestion")]
#[command(version = "0.1.0")]
struct Cli {
    /// TOML config file (defaults to ./etl.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Ingestion date, YYYY-MM-DD (defaults to the current UTC date)
    #[arg(long, global = true)]
    ingestion_date: Option<String>,

    /// Clickstream input path or http(s) URL
    #[arg(long, global = true)]
    clickstream: Option<String>,

    /// Transactions input path or http(s) URL
    #[arg(long, global = true)]
    transactions: Option<String>,

    #[arg(long, global = true)]
    chunk_size: Option<usize>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch rates, then process clickstream and transactions
    Run,
    /// Fetch and archive today's exchange rates only
    FetchRates,
    /// Process a single dataset
    Process {
        #[arg(long)]
        dataset: DatasetName,
    },
}

fn build_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(date) = &cli.ingestion_date {
        config.ingestion_date = Some(parse_ingestion_date(date)?);
    }
    if let Some(input) = &cli.clickstream {
        config.clickstream_input = input.clone();
    }
    if let Some(input) = &cli.transactions {
        config.transactions_input = input.clone();
    }
    if let Some(chunk_size) = cli.chunk_size {
        config.chunk_size = chunk_size;
    }
    config.validate()?;
    Ok(config)
}

fn report(name: DatasetName, outcome: &DatasetOutcome) {
    match outcome {
        DatasetOutcome::Published { run, receipt } => info!(
            dataset = %name,
            rows_in = run.stats.rows_in,
            rows_out = run.stats.rows_out,
            status = %receipt.record.validation_status,
            key = %receipt.key,
            "Published"
        ),
        DatasetOutcome::Skipped(reason) => warn!(dataset = %name, reason = reason.as_str(), "Skipped"),
        DatasetOutcome::Rejected { error, .. } | DatasetOutcome::Failed(error) => {
            error!(dataset = %name, "{}", error)
        }
    }
}

async fn execute(cli: &Cli, driver: &PipelineDriver, ingestion_date: NaiveDate) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Run => {
            let summary = driver.run(ingestion_date).await?;
            report(DatasetName::Clickstream, &summary.clickstream);
            report(DatasetName::Transactions, &summary.transactions);
            if let Some(error) = summary.first_failure() {
                anyhow::bail!("run {} failed: {}", summary.run_id, error);
            }
        }
        Commands::FetchRates => {
            let rates = driver.fetch_rates(ingestion_date).await?;
            info!(currencies = rates.len(), "Exchange rates archived");
        }
        Commands::Process { dataset } => {
            let outcome = driver.process(*dataset, ingestion_date).await?;
            report(*dataset, &outcome);
            if let Some(error) = outcome.error() {
                anyhow::bail!("{} failed: {}", dataset, error);
            }
        }
    }
    Ok(())
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let config = build_config(&cli).context("invalid configuration")?;
    let _guard = init_logging(&config.log_dir);
    metrics::init();

    let ingestion_date = config.ingestion_date.unwrap_or_else(|| Utc::now().date_naive());
    let pushgateway_url = config.pushgateway_url.clone();
    info!(ingestion_date = %ingestion_date, "daily_ingest starting");

    let driver = PipelineDriver::from_config(config)?;
    let result = execute(&cli, &driver, ingestion_date).await;

    if let Some(url) = pushgateway_url {
        let instance = ingestion_date.to_string();
        if let Err(e) = metrics::push_to_gateway(&url, "daily_ingest", &instance).await {
            warn!("Failed to push metrics: {}", e);
        }
    }

    result
}
