//! Monitor configuration
//!
//! Deserialized from the binary's config sources and validated once at
//! startup. Validation failures are fatal.

use crate::error::ConfigError;
use crate::models::{AlertRule, Comparator, Target, TargetKind};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;

/// Default evaluation interval (5 seconds)
pub const DEFAULT_INTERVAL_MS: u64 = 5_000;

/// Default per-target history capacity
pub const DEFAULT_HISTORY_CAPACITY: usize = 60;

/// Default forecast horizon (5 minutes ahead)
pub const DEFAULT_FORECAST_HORIZON_SECS: u64 = 300;

/// Default cool-down applied to rules that do not set their own
pub const DEFAULT_COOL_DOWN_SECS: u64 = 60;

/// Default timeout for a single source read
pub const DEFAULT_SOURCE_TIMEOUT_MS: u64 = 2_000;

/// Default grace period for an in-flight cycle on stop
pub const DEFAULT_STOP_GRACE_MS: u64 = 5_000;

/// Longest accepted evaluation interval (one day)
pub const MAX_INTERVAL_MS: u64 = 86_400_000;

/// Rule as written in configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RuleConfig {
    pub id: String,
    #[serde(default = "default_target_pattern")]
    pub target: String,
    #[serde(default)]
    pub kind: Option<TargetKind>,
    pub threshold: f64,
    #[serde(default = "default_comparator")]
    pub comparator: Comparator,
    #[serde(default)]
    pub cool_down_secs: Option<u64>,
    #[serde(default = "default_true")]
    pub use_forecast: bool,
    #[serde(default)]
    pub min_confidence: f64,
    #[serde(default = "default_true")]
    pub escalate: bool,
}

fn default_target_pattern() -> String {
    "*".to_string()
}

fn default_comparator() -> Comparator {
    Comparator::GreaterThan
}

fn default_true() -> bool {
    true
}

impl RuleConfig {
    fn into_rule(self, default_cool_down: Duration) -> AlertRule {
        AlertRule {
            id: self.id,
            target_pattern: self.target,
            kind: self.kind,
            threshold: self.threshold,
            comparator: self.comparator,
            cool_down: self
                .cool_down_secs
                .map(Duration::from_secs)
                .unwrap_or(default_cool_down),
            use_forecast: self.use_forecast,
            min_confidence: self.min_confidence,
            escalate: self.escalate,
        }
    }
}

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Evaluation interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Monitored targets, in evaluation order
    #[serde(default)]
    pub targets: Vec<Target>,

    /// Alert rules, in evaluation order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Samples retained per target for trend estimation
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// How far ahead forecasts project, in seconds
    #[serde(default = "default_forecast_horizon")]
    pub forecast_horizon_secs: u64,

    /// Maximum concurrent source reads; defaults to the target count
    #[serde(default)]
    pub parallelism: Option<usize>,

    /// Cool-down for rules without an explicit one
    #[serde(default = "default_cool_down")]
    pub default_cool_down_secs: u64,

    /// Timeout for a single source read in milliseconds
    #[serde(default = "default_source_timeout")]
    pub source_timeout_ms: u64,

    /// Grace period for an in-flight cycle when stopping
    #[serde(default = "default_stop_grace")]
    pub stop_grace_ms: u64,
}

fn default_interval_ms() -> u64 {
    DEFAULT_INTERVAL_MS
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_forecast_horizon() -> u64 {
    DEFAULT_FORECAST_HORIZON_SECS
}

fn default_cool_down() -> u64 {
    DEFAULT_COOL_DOWN_SECS
}

fn default_source_timeout() -> u64 {
    DEFAULT_SOURCE_TIMEOUT_MS
}

fn default_stop_grace() -> u64 {
    DEFAULT_STOP_GRACE_MS
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_ms: DEFAULT_INTERVAL_MS,
            targets: Vec::new(),
            rules: Vec::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            forecast_horizon_secs: DEFAULT_FORECAST_HORIZON_SECS,
            parallelism: None,
            default_cool_down_secs: DEFAULT_COOL_DOWN_SECS,
            source_timeout_ms: DEFAULT_SOURCE_TIMEOUT_MS,
            stop_grace_ms: DEFAULT_STOP_GRACE_MS,
        }
    }
}

/// Configuration after validation, with durations and rules resolved
#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub interval: Duration,
    pub targets: Vec<Target>,
    pub rules: Vec<AlertRule>,
    pub history_capacity: usize,
    pub forecast_horizon: Duration,
    pub parallelism: usize,
    pub source_timeout: Duration,
    pub stop_grace: Duration,
}

impl MonitorConfig {
    /// Check every option and resolve defaults
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        if self.interval_ms == 0 {
            return Err(ConfigError::invalid("interval_ms", "must be greater than zero"));
        }
        if self.interval_ms > MAX_INTERVAL_MS {
            return Err(ConfigError::invalid(
                "interval_ms",
                format!("must not exceed {}", MAX_INTERVAL_MS),
            ));
        }
        if self.history_capacity < 2 {
            return Err(ConfigError::invalid("history_capacity", "must be at least 2"));
        }
        if self.source_timeout_ms == 0 {
            return Err(ConfigError::invalid(
                "source_timeout_ms",
                "must be greater than zero",
            ));
        }
        if self.parallelism == Some(0) {
            return Err(ConfigError::invalid("parallelism", "must be greater than zero"));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::invalid("targets", "must not be empty"));
        }

        let mut seen = HashSet::new();
        for target in &self.targets {
            if target.id.trim().is_empty() {
                return Err(ConfigError::invalid("targets", "id must not be empty"));
            }
            if !seen.insert(target.id.as_str()) {
                return Err(ConfigError::Duplicate {
                    what: "target",
                    id: target.id.clone(),
                });
            }
        }

        let default_cool_down = Duration::from_secs(self.default_cool_down_secs);
        let mut rule_ids = HashSet::new();
        let mut rules = Vec::with_capacity(self.rules.len());
        for rule in self.rules {
            if rule.id.trim().is_empty() {
                return Err(ConfigError::invalid("rules", "id must not be empty"));
            }
            if !rule_ids.insert(rule.id.clone()) {
                return Err(ConfigError::Duplicate {
                    what: "rule",
                    id: rule.id,
                });
            }
            if !rule.threshold.is_finite() {
                return Err(ConfigError::invalid(
                    format!("rules.{}.threshold", rule.id),
                    "must be a finite number",
                ));
            }
            if !(0.0..=1.0).contains(&rule.min_confidence) {
                return Err(ConfigError::invalid(
                    format!("rules.{}.min_confidence", rule.id),
                    "must be within [0, 1]",
                ));
            }

            let rule = rule.into_rule(default_cool_down);
            if !self.targets.iter().any(|t| rule.matches(t)) {
                return Err(ConfigError::UnmatchedRule { rule: rule.id });
            }
            rules.push(rule);
        }

        let parallelism = self.parallelism.unwrap_or(self.targets.len());

        Ok(ValidatedConfig {
            interval: Duration::from_millis(self.interval_ms),
            targets: self.targets,
            rules,
            history_capacity: self.history_capacity,
            forecast_horizon: Duration::from_secs(self.forecast_horizon_secs),
            parallelism,
            source_timeout: Duration::from_millis(self.source_timeout_ms),
            stop_grace: Duration::from_millis(self.stop_grace_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> MonitorConfig {
        MonitorConfig {
            targets: vec![
                Target::new("cpu-1", TargetKind::Cpu),
                Target::new("disk-2", TargetKind::Disk),
            ],
            rules: vec![RuleConfig {
                id: "cpu-high".to_string(),
                target: "cpu-*".to_string(),
                kind: None,
                threshold: 90.0,
                comparator: Comparator::GreaterThan,
                cool_down_secs: None,
                use_forecast: true,
                min_confidence: 0.0,
                escalate: true,
            }],
            ..MonitorConfig::default()
        }
    }

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.interval_ms, 5_000);
        assert_eq!(config.history_capacity, 60);
        assert_eq!(config.forecast_horizon_secs, 300);
        assert!(config.parallelism.is_none());
    }

    #[test]
    fn test_validate_resolves_defaults() {
        let validated = base_config().validate().unwrap();
        assert_eq!(validated.interval, Duration::from_secs(5));
        assert_eq!(validated.parallelism, 2);
        assert_eq!(validated.rules[0].cool_down, Duration::from_secs(60));
        assert_eq!(validated.forecast_horizon, Duration::from_secs(300));
    }

    #[test]
    fn test_deserialize_from_json() {
        let config: MonitorConfig = serde_json::from_str(
            r#"{
                "interval_ms": 1000,
                "targets": [{"id": "cpu-1", "kind": "cpu"}],
                "rules": [{"id": "hot", "target": "cpu-1", "threshold": 80, "comparator": ">=", "cool_down_secs": 10}]
            }"#,
        )
        .unwrap();

        let validated = config.validate().unwrap();
        assert_eq!(validated.interval, Duration::from_secs(1));
        assert_eq!(validated.rules[0].comparator, Comparator::GreaterOrEqual);
        assert_eq!(validated.rules[0].cool_down, Duration::from_secs(10));
        assert!(validated.rules[0].use_forecast);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = MonitorConfig {
            interval_ms: 0,
            ..base_config()
        };
        assert_eq!(invalid_field(config), "interval_ms");
    }

    #[test]
    fn test_rule_without_target_rejected() {
        let mut config = base_config();
        config.rules[0].target = "gpu-*".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(
            err,
            ConfigError::UnmatchedRule {
                rule: "cpu-high".to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_target_rejected() {
        let mut config = base_config();
        config.targets.push(Target::new("cpu-1", TargetKind::Cpu));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Duplicate { what: "target", .. })
        ));
    }

    #[test]
    fn test_invalid_confidence_rejected() {
        let mut config = base_config();
        config.rules[0].min_confidence = 1.5;
        assert_eq!(invalid_field(config), "rules.cpu-high.min_confidence");
    }

    fn invalid_field(config: MonitorConfig) -> String {
        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => field,
            other => panic!("expected invalid configuration, got {:?}", other),
        }
    }

    #[test]
    fn test_interval_upper_bound() {
        let config = MonitorConfig {
            interval_ms: MAX_INTERVAL_MS + 1,
            ..base_config()
        };
        assert_eq!(invalid_field(config), "interval_ms");

        let config = MonitorConfig {
            interval_ms: MAX_INTERVAL_MS,
            ..base_config()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_parallelism_rejected() {
        let config = MonitorConfig {
            parallelism: Some(0),
            ..base_config()
        };
        assert_eq!(invalid_field(config), "parallelism");
    }

    #[test]
    fn test_zero_source_timeout_rejected() {
        let config = MonitorConfig {
            source_timeout_ms: 0,
            ..base_config()
        };
        assert_eq!(invalid_field(config), "source_timeout_ms");
    }

    #[test]
    fn test_single_sample_history_rejected() {
        let config = MonitorConfig {
            history_capacity: 1,
            ..base_config()
        };
        assert_eq!(invalid_field(config), "history_capacity");
    }

    #[test]
    fn test_empty_target_id_rejected() {
        let mut config = base_config();
        config.targets.push(Target::new("  ", TargetKind::Memory));
        assert_eq!(invalid_field(config), "targets");
    }

    #[test]
    fn test_empty_rule_id_rejected() {
        let mut config = base_config();
        config.rules[0].id = String::new();
        assert_eq!(invalid_field(config), "rules");
    }

    #[test]
    fn test_duplicate_rule_rejected() {
        let mut config = base_config();
        let duplicate = config.rules[0].clone();
        config.rules.push(duplicate);
        assert_eq!(
            config.validate().unwrap_err(),
            ConfigError::Duplicate {
                what: "rule",
                id: "cpu-high".to_string()
            }
        );
    }

    #[test]
    fn test_non_finite_threshold_rejected() {
        let mut config = base_config();
        config.rules[0].threshold = f64::NAN;
        assert_eq!(invalid_field(config), "rules.cpu-high.threshold");

        let mut config = base_config();
        config.rules[0].threshold = f64::INFINITY;
        assert_eq!(invalid_field(config), "rules.cpu-high.threshold");
    }

    #[test]
    fn test_empty_targets_rejected() {
        assert_eq!(invalid_field(MonitorConfig::default()), "targets");
    }
}
