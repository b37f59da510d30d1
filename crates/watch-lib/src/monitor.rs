//! The evaluation cycle
//!
//! One cycle samples every target, feeds the trend histories, forecasts,
//! evaluates the rules and dispatches the resulting alerts. Targets that
//! fail to sample are skipped; the cycle still evaluates the rest.

use crate::alert::{AlertDispatcher, DispatchReport, NotificationSink, ThresholdEvaluator};
use crate::config::ValidatedConfig;
use crate::error::SourceError;
use crate::health::HealthRegistry;
use crate::models::{Alert, AlertRule, Forecast, Sample, Severity, Target};
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::scheduler::CycleRunner;
use crate::source::{MetricSource, SourceSampler};
use crate::trend::TrendEstimator;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Overall status of the fleet after a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemStatus {
    /// No rule is breached by a current value
    Optimal,
    /// At least one active alert was raised
    Warning,
}

impl std::fmt::Display for SystemStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SystemStatus::Optimal => write!(f, "optimal"),
            SystemStatus::Warning => write!(f, "warning"),
        }
    }
}

/// Result of one cycle
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: u64,
    pub samples: Vec<Sample>,
    pub unavailable: Vec<SourceError>,
    pub forecasts: Vec<Forecast>,
    pub alerts: Vec<Alert>,
    pub dispatch: DispatchReport,
    pub status: SystemStatus,
    pub elapsed: Duration,
}

/// Sample → forecast → evaluate → dispatch pipeline for a fixed fleet
pub struct Monitor {
    targets: Vec<Target>,
    rules: Vec<AlertRule>,
    horizon: Duration,
    sampler: SourceSampler,
    estimator: TrendEstimator,
    evaluator: ThresholdEvaluator,
    dispatcher: AlertDispatcher,
    health: HealthRegistry,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
    cycles: AtomicU64,
}

impl Monitor {
    pub fn new(
        config: &ValidatedConfig,
        source: Arc<dyn MetricSource>,
        sink: Arc<dyn NotificationSink>,
        logger: StructuredLogger,
        health: HealthRegistry,
    ) -> Self {
        let metrics = MonitorMetrics::new();
        metrics.set_targets_monitored(config.targets.len() as i64);

        Self {
            targets: config.targets.clone(),
            rules: config.rules.clone(),
            horizon: config.forecast_horizon,
            sampler: SourceSampler::new(source, config.source_timeout, config.parallelism),
            estimator: TrendEstimator::new(config.history_capacity),
            evaluator: ThresholdEvaluator::new(config.targets.clone()),
            dispatcher: AlertDispatcher::new(sink, &config.rules, logger.clone()),
            health,
            logger,
            metrics,
            cycles: AtomicU64::new(0),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn estimator(&self) -> &TrendEstimator {
        &self.estimator
    }

    pub fn cycles_run(&self) -> u64 {
        self.cycles.load(Ordering::SeqCst)
    }

    /// Run one full cycle across all targets
    pub async fn run_cycle(&self) -> CycleReport {
        let start = Instant::now();
        let cycle = self.cycles.fetch_add(1, Ordering::SeqCst) + 1;

        let mut samples = Vec::with_capacity(self.targets.len());
        let mut unavailable = Vec::new();
        for outcome in self.sampler.sample(&self.targets).await {
            match outcome {
                Ok(sample) => samples.push(sample),
                Err(e) => {
                    self.logger
                        .log_source_unavailable(e.target(), e.kind(), &e.to_string());
                    self.metrics.inc_source_errors(e.kind());
                    unavailable.push(e);
                }
            }
        }
        self.metrics.inc_samples_collected(samples.len() as u64);

        for sample in &samples {
            self.estimator.update(sample.clone());
        }

        let forecasts: Vec<Forecast> = samples
            .iter()
            .filter_map(|s| self.estimator.forecast(&s.target, self.horizon))
            .collect();

        let alerts = self.evaluator.evaluate(&samples, &forecasts, &self.rules);
        let status = if alerts.iter().any(|a| a.severity == Severity::Active) {
            SystemStatus::Warning
        } else {
            SystemStatus::Optimal
        };

        let dispatch = self.dispatcher.dispatch(alerts.clone()).await;

        self.health
            .record_sampling(samples.len(), unavailable.len())
            .await;
        self.health.record_delivery(dispatch.failed).await;

        let elapsed = start.elapsed();
        self.metrics.observe_cycle_latency(elapsed.as_secs_f64());
        self.logger.log_cycle(
            cycle,
            &status.to_string(),
            samples.len(),
            unavailable.len(),
            alerts.len(),
            elapsed.as_millis(),
        );

        CycleReport {
            cycle,
            samples,
            unavailable,
            forecasts,
            alerts,
            dispatch,
            status,
            elapsed,
        }
    }
}

#[async_trait]
impl CycleRunner for Monitor {
    async fn run(&self) -> Result<()> {
        self.run_cycle().await;
        Ok(())
    }
}

/// Builder for creating a monitor
pub struct MonitorBuilder {
    config: Option<ValidatedConfig>,
    source: Option<Arc<dyn MetricSource>>,
    sink: Option<Arc<dyn NotificationSink>>,
    logger: StructuredLogger,
    health: HealthRegistry,
}

impl MonitorBuilder {
    pub fn new() -> Self {
        Self {
            config: None,
            source: None,
            sink: None,
            logger: StructuredLogger::new("local"),
            health: HealthRegistry::new(),
        }
    }

    pub fn config(mut self, config: ValidatedConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn source(mut self, source: Arc<dyn MetricSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = health;
        self
    }

    pub fn build(self) -> Result<Monitor> {
        let config = self
            .config
            .ok_or_else(|| anyhow::anyhow!("Validated config is required"))?;
        let source = self
            .source
            .ok_or_else(|| anyhow::anyhow!("Metric source is required"))?;
        let sink = self
            .sink
            .ok_or_else(|| anyhow::anyhow!("Notification sink is required"))?;

        Ok(Monitor::new(&config, source, sink, self.logger, self.health))
    }
}

impl Default for MonitorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
