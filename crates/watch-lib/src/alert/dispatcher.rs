//! Alert dispatch with cool-down deduplication
//!
//! Cool-down is measured between alert trigger times, so replaying the same
//! alerts gives the same outcome regardless of wall-clock time. Each key
//! expires only against its own alerts' trigger times; targets whose sample
//! clocks disagree never shorten each other's cool-down.

use super::NotificationSink;
use crate::models::{Alert, AlertRule, Severity};
use crate::observability::{MonitorMetrics, StructuredLogger};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Key for cool-down tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DispatchKey {
    rule_id: String,
    target: String,
}

impl DispatchKey {
    fn of(alert: &Alert) -> Self {
        Self {
            rule_id: alert.rule_id.clone(),
            target: alert.target.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct LastDispatch {
    at: DateTime<Utc>,
    severity: Severity,
}

/// Per-rule dispatch policy
#[derive(Debug, Clone, Copy)]
struct RulePolicy {
    cool_down: Duration,
    escalate: bool,
}

/// What happened to one alert
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Dispatched,
    /// Dispatched although within cool-down, because it escalates a
    /// predictive alert to an active one
    Escalated,
    Suppressed,
    SinkFailed,
}

/// Summary of one dispatch call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    pub dispatched: usize,
    pub suppressed: usize,
    pub failed: usize,
    /// One outcome per input alert, in input order
    pub outcomes: Vec<DispatchOutcome>,
}

/// Emits alerts to a sink, suppressing repeats within each rule's cool-down
pub struct AlertDispatcher {
    sink: Arc<dyn NotificationSink>,
    policies: HashMap<String, RulePolicy>,
    default_policy: RulePolicy,
    last_dispatch: Mutex<HashMap<DispatchKey, LastDispatch>>,
    logger: StructuredLogger,
    metrics: MonitorMetrics,
}

impl AlertDispatcher {
    pub fn new(
        sink: Arc<dyn NotificationSink>,
        rules: &[AlertRule],
        logger: StructuredLogger,
    ) -> Self {
        let policies = rules
            .iter()
            .map(|r| {
                (
                    r.id.clone(),
                    RulePolicy {
                        cool_down: r.cool_down,
                        escalate: r.escalate,
                    },
                )
            })
            .collect();

        Self {
            sink,
            policies,
            default_policy: RulePolicy {
                cool_down: Duration::from_secs(crate::config::DEFAULT_COOL_DOWN_SECS),
                escalate: true,
            },
            last_dispatch: Mutex::new(HashMap::new()),
            logger,
            metrics: MonitorMetrics::new(),
        }
    }

    /// Cool-down for alerts whose rule was not registered
    pub fn with_default_cool_down(mut self, cool_down: Duration) -> Self {
        self.default_policy.cool_down = cool_down;
        self
    }

    pub fn sink_name(&self) -> &str {
        self.sink.name()
    }

    fn policy(&self, rule_id: &str) -> RulePolicy {
        self.policies
            .get(rule_id)
            .copied()
            .unwrap_or(self.default_policy)
    }

    /// Dispatch alerts in order, never failing on sink errors
    pub async fn dispatch(&self, alerts: Vec<Alert>) -> DispatchReport {
        let mut report = DispatchReport::default();

        for alert in alerts {
            let outcome = match self.admit(&alert).await {
                Admission::Suppressed { remaining_secs } => {
                    self.logger.log_suppressed(&alert, remaining_secs);
                    self.metrics.inc_alerts_suppressed();
                    report.suppressed += 1;
                    DispatchOutcome::Suppressed
                }
                Admission::Admitted { escalated } => match self.sink.send(&alert).await {
                    Ok(()) => {
                        self.metrics
                            .inc_alerts_dispatched(&alert.severity.to_string());
                        report.dispatched += 1;
                        if escalated {
                            DispatchOutcome::Escalated
                        } else {
                            DispatchOutcome::Dispatched
                        }
                    }
                    Err(e) => {
                        self.logger
                            .log_sink_failure(self.sink.name(), &alert, &e.to_string());
                        self.metrics.inc_sink_failures();
                        report.failed += 1;
                        DispatchOutcome::SinkFailed
                    }
                },
            };
            report.outcomes.push(outcome);
        }

        report
    }

    /// Check the cool-down table and record the dispatch if admitted
    ///
    /// The lock is released before the sink is called.
    async fn admit(&self, alert: &Alert) -> Admission {
        let policy = self.policy(&alert.rule_id);
        let cool_down = chrono::Duration::from_std(policy.cool_down)
            .unwrap_or(chrono::Duration::MAX);
        let key = DispatchKey::of(alert);

        let mut table = self.last_dispatch.lock().await;

        let mut escalated = false;
        if let Some(last) = table.get(&key) {
            let elapsed = alert.triggered_at - last.at;
            if elapsed < cool_down {
                let escalates = policy.escalate
                    && last.severity == Severity::Predictive
                    && alert.severity == Severity::Active;
                if !escalates {
                    let remaining_secs = cool_down
                        .checked_sub(&elapsed)
                        .map(|d| d.num_seconds())
                        .unwrap_or(i64::MAX);
                    return Admission::Suppressed { remaining_secs };
                }
                escalated = true;
            }
        }

        table.insert(
            key,
            LastDispatch {
                at: alert.triggered_at,
                severity: alert.severity,
            },
        );

        Admission::Admitted { escalated }
    }

    /// Number of (rule, target) keys with a recorded dispatch
    ///
    /// Bounded by the configured rules and targets.
    pub async fn tracked_keys(&self) -> usize {
        self.last_dispatch.lock().await.len()
    }
}

enum Admission {
    Admitted { escalated: bool },
    Suppressed { remaining_secs: i64 },
}
