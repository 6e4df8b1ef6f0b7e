//! Loan Inference Gateway - Main Entry Point
//!
//! Fetches model artifacts if missing, loads both models, then serves
//! predictions over HTTP. Startup failures abort before the socket is bound.

use actix_web::web;
use anyhow::{Context, Result};
use loan_inference_gateway::{
    config::{AppConfig, LogFormat, LoggingConfig},
    metrics::{GatewayMetrics, MetricsReporter},
    server, Gateway,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "loan_inference_gateway={0},loan_gateway={0},actix_web=info",
            logging.level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    init_tracing(&config.logging);
    info!("Starting Loan Inference Gateway");

    // Fetch artifacts and load models; nothing is served without both
    let gateway = Gateway::bootstrap(&config)
        .await
        .context("Gateway initialization failed")?;
    info!("Models loaded, gateway ready");

    let metrics = web::Data::new(GatewayMetrics::new());

    if config.metrics.report_interval_secs > 0 {
        let reporter = MetricsReporter::new(
            metrics.clone().into_inner(),
            config.metrics.report_interval_secs,
        );
        actix_web::rt::spawn(reporter.start());
    }

    server::serve(&config.server, web::Data::new(gateway), metrics.clone())
        .await
        .context("HTTP server failed")?;

    info!("Gateway shutting down...");
    metrics.print_summary();

    Ok(())
}
