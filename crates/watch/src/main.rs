//! fleet-watch - periodic resource health checks with predictive alerting
//!
//! Samples CPU and memory utilisation on an interval, forecasts each
//! target's trend and raises active or predictive alerts to the log and an
//! optional webhook.

use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use watch_lib::{
    health::{components, ComponentHealth, HealthRegistry},
    observability::StructuredLogger,
    FanoutSink, LogSink, MetricSource, MonitorBuilder, NotificationSink, ProcfsSource, Scheduler,
    WebhookSink,
};

mod api;
mod config;

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting fleet-watch");

    // Invalid configuration is fatal before anything is scheduled
    let config = config::AgentConfig::load()?;
    let monitor_config = config.monitor_config().validate()?;
    info!(node_name = %config.node_name, "Monitor configured");

    let health_registry = HealthRegistry::new();
    health_registry.register_defaults().await;

    let logger = StructuredLogger::new(&config.node_name);
    logger.log_startup(
        MONITOR_VERSION,
        monitor_config.targets.len(),
        monitor_config.rules.len(),
        monitor_config.interval.as_millis(),
    );

    let source: Arc<dyn MetricSource> =
        Arc::new(ProcfsSource::with_proc_root(config.proc_root.clone()));

    let mut sinks: Vec<Arc<dyn NotificationSink>> = vec![Arc::new(LogSink::new(logger.clone()))];
    if let Some(url) = &config.webhook_url {
        let webhook = WebhookSink::new(
            url.clone(),
            config.node_name.clone(),
            Duration::from_millis(config.webhook_timeout_ms),
        )?;
        info!(url = %webhook.url(), "Webhook notifications enabled");
        sinks.push(Arc::new(webhook));
    }

    let monitor = MonitorBuilder::new()
        .config(monitor_config.clone())
        .source(source)
        .sink(Arc::new(FanoutSink::new(sinks)))
        .logger(logger.clone())
        .health(health_registry.clone())
        .build()?;

    let scheduler = Scheduler::new(Arc::new(monitor))
        .with_stop_grace(monitor_config.stop_grace)
        .with_logger(logger.clone());
    scheduler.start(monitor_config.interval).await?;

    // Mark monitor as ready once the scheduler runs
    health_registry.set_ready(true).await;

    // Start health and metrics server
    let app_state = Arc::new(api::AppState::new(health_registry.clone()));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");

    health_registry.set_ready(false).await;
    scheduler.stop().await;
    health_registry
        .update(
            components::SCHEDULER,
            ComponentHealth::unhealthy("Scheduler stopped"),
        )
        .await;
    api_handle.abort();

    info!("Shutdown complete");
    Ok(())
}
