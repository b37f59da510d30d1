//! Observability infrastructure for the monitor
//!
//! Provides:
//! - Prometheus metrics (cycle latency, skipped cycles, source errors, alerts)
//! - Structured JSON logging with tracing

use crate::models::Alert;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Default histogram buckets for cycle latency (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    cycle_latency_seconds: Histogram,
    cycles_run: IntCounter,
    cycles_skipped: IntCounter,
    cycles_failed: IntCounter,
    targets_monitored: IntGauge,
    samples_collected: IntCounter,
    source_errors: IntCounterVec,
    alerts_dispatched: IntCounterVec,
    alerts_suppressed: IntCounter,
    sink_failures: IntCounter,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            cycle_latency_seconds: register_histogram!(
                "fleet_watch_cycle_latency_seconds",
                "Time spent running one sample/evaluate/dispatch cycle",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register cycle_latency_seconds"),

            cycles_run: register_int_counter!(
                "fleet_watch_cycles_total",
                "Total number of evaluation cycles run"
            )
            .expect("Failed to register cycles_total"),

            cycles_skipped: register_int_counter!(
                "fleet_watch_cycles_skipped_total",
                "Ticks skipped because the previous cycle was still running"
            )
            .expect("Failed to register cycles_skipped_total"),

            cycles_failed: register_int_counter!(
                "fleet_watch_cycles_failed_total",
                "Cycles that ended with an error or panic"
            )
            .expect("Failed to register cycles_failed_total"),

            targets_monitored: register_int_gauge!(
                "fleet_watch_targets_monitored",
                "Number of registered targets"
            )
            .expect("Failed to register targets_monitored"),

            samples_collected: register_int_counter!(
                "fleet_watch_samples_collected_total",
                "Total number of samples collected from sources"
            )
            .expect("Failed to register samples_collected_total"),

            source_errors: register_int_counter_vec!(
                "fleet_watch_source_errors_total",
                "Per-target source failures by kind",
                &["kind"]
            )
            .expect("Failed to register source_errors_total"),

            alerts_dispatched: register_int_counter_vec!(
                "fleet_watch_alerts_dispatched_total",
                "Alerts handed to the notification sink, by severity",
                &["severity"]
            )
            .expect("Failed to register alerts_dispatched_total"),

            alerts_suppressed: register_int_counter!(
                "fleet_watch_alerts_suppressed_total",
                "Alerts suppressed by the cool-down policy"
            )
            .expect("Failed to register alerts_suppressed_total"),

            sink_failures: register_int_counter!(
                "fleet_watch_sink_failures_total",
                "Notification sink delivery failures"
            )
            .expect("Failed to register sink_failures_total"),
        }
    }
}

/// Monitor metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    pub fn observe_cycle_latency(&self, duration_secs: f64) {
        self.inner().cycle_latency_seconds.observe(duration_secs);
        self.inner().cycles_run.inc();
    }

    pub fn inc_cycles_skipped(&self, count: u64) {
        self.inner().cycles_skipped.inc_by(count);
    }

    pub fn inc_cycles_failed(&self) {
        self.inner().cycles_failed.inc();
    }

    pub fn set_targets_monitored(&self, count: i64) {
        self.inner().targets_monitored.set(count);
    }

    pub fn inc_samples_collected(&self, count: u64) {
        self.inner().samples_collected.inc_by(count);
    }

    pub fn inc_source_errors(&self, kind: &str) {
        self.inner().source_errors.with_label_values(&[kind]).inc();
    }

    pub fn inc_alerts_dispatched(&self, severity: &str) {
        self.inner()
            .alerts_dispatched
            .with_label_values(&[severity])
            .inc();
    }

    pub fn inc_alerts_suppressed(&self) {
        self.inner().alerts_suppressed.inc();
    }

    pub fn inc_sink_failures(&self) {
        self.inner().sink_failures.inc();
    }
}

/// Structured logger for monitor events
///
/// Provides consistent JSON-formatted logging for cycles, source failures
/// and alert delivery.
#[derive(Clone)]
pub struct StructuredLogger {
    node_name: String,
}

impl StructuredLogger {
    pub fn new(node_name: impl Into<String>) -> Self {
        Self {
            node_name: node_name.into(),
        }
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    /// Log monitor startup
    pub fn log_startup(&self, version: &str, targets: usize, rules: usize, interval_ms: u128) {
        info!(
            event = "monitor_started",
            node = %self.node_name,
            version = %version,
            targets = targets,
            rules = rules,
            interval_ms = interval_ms as u64,
            "Fleet monitor started"
        );
    }

    /// Log monitor shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            node = %self.node_name,
            reason = %reason,
            "Fleet monitor shutting down"
        );
    }

    /// Log a completed cycle with its overall status
    pub fn log_cycle(
        &self,
        cycle: u64,
        status: &str,
        sampled: usize,
        unavailable: usize,
        alerts: usize,
        elapsed_ms: u128,
    ) {
        let elapsed_ms = elapsed_ms as u64;
        if status == "optimal" {
            info!(
                event = "cycle_complete",
                node = %self.node_name,
                cycle = cycle,
                status = %status,
                sampled = sampled,
                unavailable = unavailable,
                alerts = alerts,
                elapsed_ms = elapsed_ms,
                "Health check cycle complete"
            );
        } else {
            warn!(
                event = "cycle_complete",
                node = %self.node_name,
                cycle = cycle,
                status = %status,
                sampled = sampled,
                unavailable = unavailable,
                alerts = alerts,
                elapsed_ms = elapsed_ms,
                "Health check cycle complete with high resource usage"
            );
        }
    }

    /// Log a per-target source failure
    pub fn log_source_unavailable(&self, target: &str, kind: &str, reason: &str) {
        warn!(
            event = "source_unavailable",
            node = %self.node_name,
            target_id = %target,
            error_kind = %kind,
            reason = %reason,
            "SourceUnavailable: skipping target this cycle"
        );
    }

    /// Log an alert handed to the sink
    pub fn log_alert(&self, alert: &Alert) {
        warn!(
            event = "alert_dispatched",
            node = %self.node_name,
            rule_id = %alert.rule_id,
            target_id = %alert.target,
            severity = %alert.severity,
            observed_value = alert.observed_value,
            predicted_value = ?alert.predicted_value,
            confidence = ?alert.confidence,
            threshold = alert.threshold,
            comparator = %alert.comparator,
            triggered_at = %alert.triggered_at.to_rfc3339(),
            "{}",
            alert.summary()
        );
    }

    /// Log an alert suppressed by cool-down
    pub fn log_suppressed(&self, alert: &Alert, remaining_secs: i64) {
        info!(
            event = "alert_suppressed",
            node = %self.node_name,
            rule_id = %alert.rule_id,
            target_id = %alert.target,
            severity = %alert.severity,
            cool_down_remaining_secs = remaining_secs,
            "Alert suppressed (cool-down)"
        );
    }

    /// Log a notification sink failure
    pub fn log_sink_failure(&self, sink: &str, alert: &Alert, error: &str) {
        warn!(
            event = "sink_failure",
            node = %self.node_name,
            sink = %sink,
            rule_id = %alert.rule_id,
            target_id = %alert.target,
            error = %error,
            "Notification sink failed, continuing"
        );
    }

    /// Log the time until the next tick
    pub fn log_next_check(&self, interval_ms: u128) {
        debug!(
            event = "next_check",
            node = %self.node_name,
            interval_ms = interval_ms as u64,
            "Next check scheduled"
        );
    }
}
