//! Logging and metrics exporter setup

use std::net::{Ipv4Addr, SocketAddr};

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ScraperError;

/// Install the global tracing subscriber
///
/// `RUST_LOG` takes precedence over the configured log level. Logs are JSON
/// with file and line numbers unless `pretty` is set.
pub fn setup_logging(log_level: &str, pretty: bool) -> Result<(), ScraperError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(log_level).map_err(ScraperError::telemetry)?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if pretty {
        let layer = fmt::layer().pretty().with_file(true).with_line_number(true);
        registry.with(layer).try_init().map_err(ScraperError::telemetry)
    } else {
        let layer = fmt::layer().with_file(true).with_line_number(true).json().flatten_event(true);
        registry.with(layer).try_init().map_err(ScraperError::telemetry)
    }
}

/// Install the Prometheus recorder and serve it on the given port
///
/// Must be called from within a tokio runtime.
pub fn install_prometheus_exporter(port: u16) -> Result<(), ScraperError> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
    PrometheusBuilder::new().with_http_listener(addr).install().map_err(ScraperError::telemetry)?;

    info!(%addr, "serving prometheus metrics");
    Ok(())
}
