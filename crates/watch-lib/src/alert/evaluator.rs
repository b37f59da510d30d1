//! Threshold evaluation
//!
//! Compares current and forecast values against rules. Output order is
//! stable: target registration order, then rule order.

use crate::models::{Alert, AlertRule, Forecast, Sample, Severity, Target};
use std::collections::HashMap;
use tracing::debug;

/// Turns samples and forecasts into alerts for the registered targets
#[derive(Debug, Clone)]
pub struct ThresholdEvaluator {
    targets: Vec<Target>,
}

impl ThresholdEvaluator {
    pub fn new(targets: Vec<Target>) -> Self {
        Self { targets }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Evaluate every rule against every matching target
    ///
    /// A current breach yields an active alert; a forecast-only breach
    /// yields a predictive one. Targets without a sample this cycle are
    /// skipped.
    pub fn evaluate(
        &self,
        samples: &[Sample],
        forecasts: &[Forecast],
        rules: &[AlertRule],
    ) -> Vec<Alert> {
        let samples: HashMap<&str, &Sample> =
            samples.iter().map(|s| (s.target.as_str(), s)).collect();
        let forecasts: HashMap<&str, &Forecast> =
            forecasts.iter().map(|f| (f.target.as_str(), f)).collect();

        let mut alerts = Vec::new();

        for target in &self.targets {
            let Some(sample) = samples.get(target.id.as_str()) else {
                debug!(target_id = %target.id, "No sample this cycle, skipping evaluation");
                continue;
            };
            let forecast = forecasts.get(target.id.as_str()).copied();

            for rule in rules.iter().filter(|r| r.matches(target)) {
                if let Some(alert) = evaluate_rule(rule, sample, forecast) {
                    alerts.push(alert);
                }
            }
        }

        alerts
    }
}

fn evaluate_rule(rule: &AlertRule, sample: &Sample, forecast: Option<&Forecast>) -> Option<Alert> {
    let forecast = forecast.filter(|f| rule.use_forecast && f.confidence >= rule.min_confidence);

    let current_breach = rule.comparator.holds(sample.value, rule.threshold);
    let predicted_breach = forecast
        .map(|f| rule.comparator.holds(f.predicted_value, rule.threshold))
        .unwrap_or(false);

    let severity = if current_breach {
        Severity::Active
    } else if predicted_breach {
        Severity::Predictive
    } else {
        return None;
    };

    Some(Alert {
        rule_id: rule.id.clone(),
        target: sample.target.clone(),
        observed_value: sample.value,
        predicted_value: forecast.map(|f| f.predicted_value),
        confidence: forecast.map(|f| f.confidence),
        threshold: rule.threshold,
        comparator: rule.comparator,
        triggered_at: sample.timestamp,
        severity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Comparator, TargetKind};
    use chrono::Utc;
    use std::time::Duration;

    fn rule(id: &str, pattern: &str, threshold: f64) -> AlertRule {
        AlertRule::new(id, pattern, Comparator::GreaterThan, threshold, Duration::from_secs(60))
    }

    fn forecast(target: &str, value: f64, confidence: f64) -> Forecast {
        Forecast {
            target: target.to_string(),
            horizon: Duration::from_secs(300),
            predicted_value: value,
            confidence,
        }
    }

    fn evaluator() -> ThresholdEvaluator {
        ThresholdEvaluator::new(vec![
            Target::new("cpu-1", TargetKind::Cpu),
            Target::new("mem-1", TargetKind::Memory),
        ])
    }

    #[test]
    fn test_active_alert() {
        let now = Utc::now();
        let samples = vec![Sample::percent("cpu-1", now, 95.0)];
        let alerts = evaluator().evaluate(&samples, &[], &[rule("hot", "cpu-1", 90.0)]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Active);
        assert_eq!(alerts[0].observed_value, 95.0);
        assert_eq!(alerts[0].triggered_at, now);
    }

    #[test]
    fn test_predictive_alert() {
        let samples = vec![Sample::percent("cpu-1", Utc::now(), 80.0)];
        let forecasts = vec![forecast("cpu-1", 97.0, 0.5)];
        let alerts = evaluator().evaluate(&samples, &forecasts, &[rule("hot", "cpu-1", 90.0)]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Predictive);
        assert_eq!(alerts[0].predicted_value, Some(97.0));
    }

    #[test]
    fn test_current_breach_wins_over_forecast() {
        let samples = vec![Sample::percent("cpu-1", Utc::now(), 92.0)];
        let forecasts = vec![forecast("cpu-1", 99.0, 0.9)];
        let alerts = evaluator().evaluate(&samples, &forecasts, &[rule("hot", "cpu-1", 90.0)]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].severity, Severity::Active);
    }

    #[test]
    fn test_forecast_filters() {
        let samples = vec![Sample::percent("cpu-1", Utc::now(), 80.0)];
        let forecasts = vec![forecast("cpu-1", 97.0, 0.2)];

        let strict = rule("hot", "cpu-1", 90.0).with_min_confidence(0.5);
        assert!(evaluator().evaluate(&samples, &forecasts, &[strict]).is_empty());

        let current_only = rule("hot", "cpu-1", 90.0).without_forecast();
        assert!(evaluator()
            .evaluate(&samples, &forecasts, &[current_only])
            .is_empty());
    }

    #[test]
    fn test_multiple_rules_produce_independent_alerts() {
        let now = Utc::now();
        let samples = vec![
            Sample::percent("mem-1", now, 96.0),
            Sample::percent("cpu-1", now, 96.0),
        ];
        let rules = vec![rule("warn", "*", 80.0), rule("crit", "*", 95.0)];

        let alerts = evaluator().evaluate(&samples, &[], &rules);
        let order: Vec<(&str, &str)> = alerts
            .iter()
            .map(|a| (a.target.as_str(), a.rule_id.as_str()))
            .collect();

        // Registration order, then rule order, regardless of sample order
        assert_eq!(
            order,
            vec![
                ("cpu-1", "warn"),
                ("cpu-1", "crit"),
                ("mem-1", "warn"),
                ("mem-1", "crit")
            ]
        );
    }

    #[test]
    fn test_missing_sample_skipped() {
        let samples = vec![Sample::percent("mem-1", Utc::now(), 99.0)];
        let alerts = evaluator().evaluate(&samples, &[], &[rule("any", "*", 90.0)]);

        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].target, "mem-1");
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let now = Utc::now();
        let samples = vec![
            Sample::percent("cpu-1", now, 91.0),
            Sample::percent("mem-1", now, 70.0),
        ];
        let forecasts = vec![forecast("mem-1", 93.0, 0.4), forecast("cpu-1", 95.0, 0.4)];
        let rules = vec![rule("hot", "*", 90.0)];

        let evaluator = evaluator();
        let first = evaluator.evaluate(&samples, &forecasts, &rules);
        let second = evaluator.evaluate(&samples, &forecasts, &rules);

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }
}
