use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use location_common::{SearchConfig, SummaryConfig};
use location_summary::store::{LogSink, RawEventSource, SearchStore, SummarySink};
use location_summary::{BackfillDriver, BackfillPlan, DayAggregator};
use search_client::{RetryPolicy, SearchClient};

#[derive(Parser)]
#[command(name = "location-summary", about = "Summarize daily job locations per organization and subdomain")]
struct Cli {
    /// Path to config TOML file
    #[arg(long, default_value = "./config/location-summary.toml")]
    config: PathBuf,

    /// Process only these days (YYYY-MM-DD) instead of the backfill plan
    #[arg(long = "day", value_parser = parse_day)]
    days: Vec<NaiveDate>,

    /// Override the number of days processed concurrently
    #[arg(long)]
    workers: Option<usize>,

    /// Log summaries instead of writing them
    #[arg(long)]
    dry_run: bool,
}

fn parse_day(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid day '{s}': {e}"))
}

/// Default log directives, applied on top of `RUST_LOG`. Covers the store
/// client so retry warnings show without extra configuration.
const DEFAULT_DIRECTIVES: [&str; 2] = ["location=info", "search_client=info"];

fn env_filter() -> Result<EnvFilter> {
    let mut filter = EnvFilter::from_default_env();
    for directive in DEFAULT_DIRECTIVES {
        filter = filter.add_directive(directive.parse()?);
    }
    Ok(filter)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter()?)
        .init();

    info!("Location summary starting...");

    let cli = Cli::parse();

    let config = SummaryConfig::load(&cli.config)?;
    info!(
        config = %cli.config.display(),
        sites = config.sites.len(),
        ignored = ?config.ignore_organizations,
        "Loaded summary config"
    );

    let search = SearchConfig::from_env();
    search.log_redacted();

    let mut client =
        SearchClient::new(search.url.clone()).with_request_timeout(config.store.request_timeout());
    if let Some(user) = search.user.clone() {
        client = client.with_basic_auth(user, search.password.clone());
    }

    client
        .ping()
        .await
        .with_context(|| format!("Search cluster {} is down", search.url))?;

    let store = Arc::new(
        SearchStore::new(
            client,
            config.store.raw_index_pattern.clone(),
            RetryPolicy::new(config.store.max_write_attempts, config.store.retry_base_delay()),
        )
        .with_group_count_estimate(config.store.estimate_group_count),
    );
    let source: Arc<dyn RawEventSource> = store.clone();
    let sink: Arc<dyn SummarySink> = if cli.dry_run {
        info!("Dry run: summaries will be logged, not written");
        Arc::new(LogSink)
    } else {
        store
    };

    let plan = if cli.days.is_empty() {
        BackfillPlan::build(Utc::now().date_naive(), &config.backfill, &mut rand::rng())
    } else {
        BackfillPlan::from_days(cli.days.iter().copied())
    };

    let aggregator = DayAggregator::from_config(source, sink, &config);
    let workers = cli.workers.unwrap_or(config.backfill.workers);
    let stats = BackfillDriver::new(aggregator, workers).run(&plan).await?;

    info!("Location summary complete. {stats}");
    Ok(())
}
