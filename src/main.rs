use std::path::PathBuf;
use std::sync::Arc;

use clap::{ArgAction, Parser};
use color_eyre::eyre::WrapErr;
use crl_watch::{
    config::Config,
    feed::FeedReader,
    lint::{CrlLinter, RuleFilter},
    pki::{
        TrustStore,
        crl::{CacheLayout, CrlChecker, CrlFetcher, CrlUpdater},
    },
    report::RunStatistics,
    telemetry,
};
use time::OffsetDateTime;
use tracing::{info, warn};

/// Keep a local cache of published CRLs fresh, verify them against trusted
/// intermediates and lint them.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Download new and changed CRLs
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    update: bool,

    /// Validate and lint the cached CRLs
    #[arg(long, action = ArgAction::Set, default_value_t = true)]
    check: bool,

    /// Verbose logging
    #[arg(long)]
    debug: bool,

    /// Log each lint violation
    #[arg(long)]
    show_lint_errors: bool,

    /// Configuration file, instead of config/settings
    #[arg(long, env = "CRL_WATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Print the run summary as JSON
    #[arg(long)]
    json: bool,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    let _ = dotenvy::dotenv();
    color_eyre::install()?;

    let cli = Cli::parse();
    telemetry::init_tracing(cli.debug);
    info!("{} {} starting", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = Config::load_with_sources(cli.config.clone(), None)
        .wrap_err("Failed to load configuration")?;
    tracing::debug!("Loaded configuration: {:?}", config);

    let stats = Arc::new(RunStatistics::new());
    let layout = CacheLayout::new(&config.monitor.cache_root);

    if cli.update {
        let client = reqwest::Client::new();
        let reader = FeedReader::download(&client, &config.feed.url)
            .await
            .wrap_err_with(|| format!("Failed to download feed from {}", config.feed.url))?;

        let mut records = Vec::new();
        for record in reader.records() {
            match record {
                Ok(record) => {
                    stats.record_feed_record();
                    records.push(record);
                }
                Err(e) => {
                    warn!("Skipping feed row: {}", e);
                    stats.record_malformed_row();
                }
            }
        }
        info!("Feed lists {} CAs", records.len());

        let fetcher = CrlFetcher::new(
            layout.clone(),
            config.monitor.fetch_timeout(),
            config.monitor.max_crl_size,
        )?;
        CrlUpdater::new(fetcher, config.monitor.fetch_concurrency, Arc::clone(&stats))
            .run(&records)
            .await;
    }

    if cli.check {
        let trust_store = TrustStore::load(&config.monitor.trust_store_path).wrap_err_with(|| {
            format!(
                "Failed to load trust store from {}",
                config.monitor.trust_store_path.display()
            )
        })?;

        let filter = match &config.monitor.lint_rule_filter {
            Some(path) => RuleFilter::load(path),
            None => RuleFilter::builtin(),
        }
        .wrap_err("Failed to load lint rule filter")?;
        let linter = CrlLinter::from_filter(&filter, config.monitor.lint_severity_threshold)
            .wrap_err("Invalid lint rule filter")?;

        CrlChecker::new(Arc::new(trust_store), linter, Arc::clone(&stats))
            .show_lint_errors(cli.show_lint_errors)
            .run(layout.root(), OffsetDateTime::now_utc())
            .await;
    }

    let summary = stats.summary();
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("{summary}");
    }
    Ok(())
}
