//! Core data models for the monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of resource a target represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetKind {
    Cpu,
    Memory,
    Disk,
    Custom,
}

impl TargetKind {
    /// Default unit for samples of this kind
    pub fn default_unit(&self) -> Unit {
        match self {
            TargetKind::Cpu | TargetKind::Memory | TargetKind::Disk => Unit::Percent,
            TargetKind::Custom => Unit::Custom(String::new()),
        }
    }
}

impl std::fmt::Display for TargetKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TargetKind::Cpu => write!(f, "cpu"),
            TargetKind::Memory => write!(f, "memory"),
            TargetKind::Disk => write!(f, "disk"),
            TargetKind::Custom => write!(f, "custom"),
        }
    }
}

/// A monitored resource, immutable once registered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Target {
    pub id: String,
    pub kind: TargetKind,
}

impl Target {
    pub fn new(id: impl Into<String>, kind: TargetKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }
}

/// Unit of a sampled value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    Percent,
    Custom(String),
}

impl std::fmt::Display for Unit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unit::Percent => write!(f, "%"),
            Unit::Custom(unit) => write!(f, "{}", unit),
        }
    }
}

/// One observed value for a target at a point in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub target: String,
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub unit: Unit,
}

impl Sample {
    pub fn new(target: impl Into<String>, timestamp: DateTime<Utc>, value: f64, unit: Unit) -> Self {
        Self {
            target: target.into(),
            timestamp,
            value,
            unit,
        }
    }

    /// Percent sample, the common case for cpu/memory/disk targets
    pub fn percent(target: impl Into<String>, timestamp: DateTime<Utc>, value: f64) -> Self {
        Self::new(target, timestamp, value, Unit::Percent)
    }
}

/// Projected value for a target `horizon` after its latest sample
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Forecast {
    pub target: String,
    pub horizon: Duration,
    pub predicted_value: f64,
    /// Always within [0, 1]
    pub confidence: f64,
}

/// Comparison applied between an observed value and a rule threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">", alias = "gt")]
    GreaterThan,
    #[serde(rename = ">=", alias = "ge")]
    GreaterOrEqual,
    #[serde(rename = "<", alias = "lt")]
    LessThan,
    #[serde(rename = "<=", alias = "le")]
    LessOrEqual,
}

impl Comparator {
    pub fn holds(&self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::GreaterThan => value > threshold,
            Comparator::GreaterOrEqual => value >= threshold,
            Comparator::LessThan => value < threshold,
            Comparator::LessOrEqual => value <= threshold,
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Comparator::GreaterThan => write!(f, ">"),
            Comparator::GreaterOrEqual => write!(f, ">="),
            Comparator::LessThan => write!(f, "<"),
            Comparator::LessOrEqual => write!(f, "<="),
        }
    }
}

/// Threshold rule evaluated against every matching target each cycle
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRule {
    pub id: String,
    /// Target id, `*` matches any run of characters
    pub target_pattern: String,
    /// Restricts the rule to targets of one kind
    pub kind: Option<TargetKind>,
    pub threshold: f64,
    pub comparator: Comparator,
    pub cool_down: Duration,
    /// Whether forecast values may raise predictive alerts
    pub use_forecast: bool,
    /// Minimum forecast confidence for a predictive trigger
    pub min_confidence: f64,
    /// Active alerts bypass the cool-down once after a predictive dispatch
    pub escalate: bool,
}

impl AlertRule {
    pub fn new(
        id: impl Into<String>,
        target_pattern: impl Into<String>,
        comparator: Comparator,
        threshold: f64,
        cool_down: Duration,
    ) -> Self {
        Self {
            id: id.into(),
            target_pattern: target_pattern.into(),
            kind: None,
            threshold,
            comparator,
            cool_down,
            use_forecast: true,
            min_confidence: 0.0,
            escalate: true,
        }
    }

    pub fn with_kind(mut self, kind: TargetKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn without_forecast(mut self) -> Self {
        self.use_forecast = false;
        self
    }

    pub fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn with_escalation(mut self, escalate: bool) -> Self {
        self.escalate = escalate;
        self
    }

    /// Whether this rule applies to the given target
    pub fn matches(&self, target: &Target) -> bool {
        if let Some(kind) = self.kind {
            if kind != target.kind {
                return false;
            }
        }
        target_matches(&self.target_pattern, &target.id)
    }
}

fn target_matches(pattern: &str, target_id: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    glob_match::glob_match(pattern, target_id)
}

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// The current value breaches the threshold
    Active,
    /// Only the forecast breaches the threshold
    Predictive,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Active => write!(f, "active"),
            Severity::Predictive => write!(f, "predictive"),
        }
    }
}

/// A triggered rule for one target
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub rule_id: String,
    pub target: String,
    pub observed_value: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub predicted_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub threshold: f64,
    pub comparator: Comparator,
    pub triggered_at: DateTime<Utc>,
    pub severity: Severity,
}

impl Alert {
    /// Human-readable one-line description
    pub fn summary(&self) -> String {
        match (self.severity, self.predicted_value) {
            (Severity::Predictive, Some(predicted)) => format!(
                "{} predicted to reach {:.2} ({} {:.2}), currently {:.2}",
                self.target, predicted, self.comparator, self.threshold, self.observed_value
            ),
            _ => format!(
                "{} at {:.2} ({} {:.2})",
                self.target, self.observed_value, self.comparator, self.threshold
            ),
        }
    }
}
