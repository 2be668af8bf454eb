// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Logging and metrics bootstrap

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::info;

use troops_core::domain::node_config::NodeConfigManifest;
use troops_core::infrastructure::metrics::register_metrics;

/// Log level and format a process should use: the config's logging section
/// wins over the CLI default, `RUST_LOG` wins over both.
pub fn logging_settings(config: Option<&NodeConfigManifest>, cli_level: &str) -> (String, String) {
    let logging = config
        .and_then(|c| c.spec.observability.as_ref())
        .and_then(|o| o.logging.as_ref());
    match logging {
        Some(logging) => (logging.level.clone(), logging.format.clone()),
        None => (cli_level.to_string(), "text".to_string()),
    }
}

/// Initialize tracing subscriber for logging
pub fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    if format.eq_ignore_ascii_case("json") {
        builder.json().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

/// Install the Prometheus exporter when the config enables it.
pub fn init_metrics(config: &NodeConfigManifest) -> Result<()> {
    let metrics = config
        .spec
        .observability
        .as_ref()
        .and_then(|o| o.metrics.as_ref());

    if let Some(metrics) = metrics.filter(|m| m.enabled) {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], metrics.port))
            .install()
            .context("Failed to install Prometheus recorder")?;
        info!(port = metrics.port, "Prometheus exporter listening");
    }
    register_metrics();
    Ok(())
}
