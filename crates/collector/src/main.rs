//! FPS collector
//!
//! Samples frame-rate tags from distributed traces, correlates them with the
//! resource allocation of a Kubernetes workload and appends one record row
//! per sampling cycle. Re-samples whenever the allocation changes.

use anyhow::{Context, Result};
use collector_lib::{
    cluster::KubeClusterReader,
    health::HealthRegistry,
    monitor::MonitorLoopBuilder,
    observability::{MonitorMetrics, StructuredLogger},
    record::CsvRecordSink,
    traces::ZipkinClient,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const COLLECTOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fps-collector");

    let config = config::CollectorConfig::load()?;
    info!(
        namespace = %config.namespace,
        pod = %config.pod_name,
        deployment = %config.deployment_name,
        trace_backend = %config.trace_backend_url,
        record_dir = %config.record_dir.display(),
        "Collector configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = MonitorMetrics::new();

    let logger = StructuredLogger::new(&config.deployment_name);
    logger.log_startup(COLLECTOR_VERSION, &config.namespace, &config.services);

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone(), metrics));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let trace_source =
        ZipkinClient::new(config.zipkin_config()).context("Failed to create trace client")?;
    let cluster = KubeClusterReader::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    let sink = CsvRecordSink::new(&config.record_dir);

    let monitor = MonitorLoopBuilder::new()
        .trace_source(Arc::new(trace_source))
        .cluster(Arc::new(cluster))
        .sink(Arc::new(sink))
        .target(config.monitor_target())
        .services(config.services.clone())
        .config(config.monitor_config())
        .health(health_registry.clone())
        .build()?;

    // Mark collector as ready after initialization
    health_registry.set_ready(true);

    tokio::select! {
        reason = monitor.run() => {
            logger.log_shutdown(&reason.to_string());
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
