//! The staking scraper, responsible for indexing the liquid staking protocol
//! on the parachain and its relay chain and serving the results as metrics

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::needless_pass_by_value)]
#![deny(clippy::needless_pass_by_ref_mut)]
#![deny(clippy::missing_docs_in_private_items)]

use clap::Parser;
use staking_scraper::{
    cli::Cli,
    error::ScraperError,
    scraper::Scraper,
    telemetry::{install_prometheus_exporter, setup_logging},
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

// --------
// | Main |
// --------

#[tokio::main]
async fn main() -> Result<(), ScraperError> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level, cli.pretty_logs)?;
    install_prometheus_exporter(cli.prometheus_metrics_port)?;

    let scraper = Scraper::build_from_cli(&cli).await?;

    let cancel = CancellationToken::new();
    let mut tasks = JoinSet::new();
    scraper.spawn_loops(&mut tasks, &cancel);
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    while let Some(res) = tasks.join_next().await {
        match res {
            Err(e) => error!("Error joining scan loop task: {e}"),
            Ok(Ok(())) if cancel.is_cancelled() => {},
            Ok(Ok(())) => warn!("Scan loop exited"),
            Ok(Err(e)) => error!("Scan loop error: {e}"),
        }
    }

    info!("all scan loops stopped");
    Ok(())
}

/// Cancel the scan loops once the process is interrupted
async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received interrupt, stopping scan loops"),
        Err(e) => error!("Error listening for interrupt, stopping scan loops: {e}"),
    }

    cancel.cancel();
}
