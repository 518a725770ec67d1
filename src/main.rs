use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::Result;
use tracing_subscriber::EnvFilter;

use tfsweeper::cli::{Cli, SummaryFormat};
use tfsweeper::plugin::LaunchOptions;
use tfsweeper::providers::Provider;
use tfsweeper::providers::aws::{self, AwsProvider};
use tfsweeper::{SweepError, read_state_file, sweep};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .init();

    let meta = aws::plugin_meta(cli.plugin.clone(), cli.plugin_version.clone());
    let options = LaunchOptions {
        start_timeout: Duration::from_secs(cli.start_timeout),
        ..LaunchOptions::default()
    };
    let provider = AwsProvider::launch(&meta, &options)
        .await
        .map_err(SweepError::LoadProvider)?;

    let config = aws::provider_config(
        &cli.profile,
        &cli.region,
        &cli.terraform_version,
        cli.provider_config.clone(),
    );
    provider
        .configure(&config)
        .await
        .map_err(SweepError::Configure)?;
    tracing::debug!(profile = %cli.profile, region = %cli.region, "provider configured");

    let state = read_state_file(&cli.state).map_err(SweepError::ReadState)?;
    tracing::debug!(
        path = %cli.state.display(),
        version = state.version,
        serial = state.serial,
        "state loaded"
    );
    if state.is_empty() {
        tracing::warn!(path = %cli.state.display(), "state file has no resources");
    }

    let report = sweep(&state, &provider).await;
    provider.shutdown().await;

    tracing::info!(
        imported = report.imported(),
        failed = report.failed(),
        skipped = report.skipped(),
        "sweep complete"
    );

    match cli.summary {
        Some(SummaryFormat::Table) => println!("{}", report.table()),
        Some(SummaryFormat::Json) => {
            let json = serde_json::to_string_pretty(&report).map_err(SweepError::Report)?;
            println!("{}", json);
        }
        None => {}
    }

    Ok(())
}
