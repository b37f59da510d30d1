//! Trend estimation
//!
//! Keeps a bounded history per target and projects it forward with an
//! ordinary least-squares line. Confidence grows with history fullness and
//! shrinks with residual variance relative to the magnitude of the values,
//! so it reads the same for percentages and raw counters. Forecasts are a
//! pure function of the retained history.

mod history;

pub use history::History;

use crate::models::{Forecast, Sample};
use dashmap::DashMap;
use std::time::Duration;

/// Least-squares fit over a history
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LinearFit {
    /// Change per second
    pub slope: f64,
    /// Value at the first retained sample
    pub intercept: f64,
    /// Mean squared residual
    pub residual_variance: f64,
    /// Residual variance divided by the mean squared value (floored at 1)
    pub relative_variance: f64,
    /// Seconds between first and last retained sample
    pub span_secs: f64,
}

impl LinearFit {
    /// Fit a line through `(seconds since first sample, value)` points
    ///
    /// Returns `None` for fewer than two samples. When all samples share a
    /// timestamp the slope is zero and the line sits at the mean.
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Option<Self> {
        let mut iter = samples.into_iter().peekable();
        let t0 = iter.peek()?.timestamp;

        let points: Vec<(f64, f64)> = iter
            .map(|s| {
                let x = (s.timestamp - t0).num_milliseconds() as f64 / 1000.0;
                (x, s.value)
            })
            .collect();
        if points.len() < 2 {
            return None;
        }

        let n = points.len() as f64;
        let mean_x = points.iter().map(|(x, _)| x).sum::<f64>() / n;
        let mean_y = points.iter().map(|(_, y)| y).sum::<f64>() / n;

        let mut sxx = 0.0;
        let mut sxy = 0.0;
        for (x, y) in &points {
            sxx += (x - mean_x) * (x - mean_x);
            sxy += (x - mean_x) * (y - mean_y);
        }

        let (slope, intercept) = if sxx < f64::EPSILON {
            (0.0, mean_y)
        } else {
            let slope = sxy / sxx;
            (slope, mean_y - slope * mean_x)
        };

        let sse: f64 = points
            .iter()
            .map(|(x, y)| {
                let residual = y - (intercept + slope * x);
                residual * residual
            })
            .sum();

        let span_secs = points.last().map(|(x, _)| *x).unwrap_or(0.0);
        let residual_variance = sse / n;
        let mean_square = points.iter().map(|(_, y)| y * y).sum::<f64>() / n;

        Some(Self {
            slope,
            intercept,
            residual_variance,
            relative_variance: residual_variance / mean_square.max(1.0),
            span_secs,
        })
    }

    /// Value `secs_after_last` seconds after the last sample
    pub fn project(&self, secs_after_last: f64) -> f64 {
        self.intercept + self.slope * (self.span_secs + secs_after_last)
    }
}

/// Confidence from history fullness and relative fit error, within [0, 1]
pub fn confidence(fullness: f64, relative_variance: f64) -> f64 {
    let fit = 1.0 / (1.0 + relative_variance.max(0.0));
    (fullness.clamp(0.0, 1.0) * fit).clamp(0.0, 1.0)
}

/// Snapshot statistics about tracked histories
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrendStats {
    pub targets_tracked: usize,
    pub total_samples: usize,
}

/// Per-target bounded histories with short-horizon forecasting
///
/// Each target's history sits behind its own map entry, so updates for
/// different targets do not contend on a shared lock and an update for one
/// target is applied atomically.
#[derive(Debug)]
pub struct TrendEstimator {
    capacity: usize,
    histories: DashMap<String, History>,
}

impl TrendEstimator {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            histories: DashMap::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append a sample to its target's history
    pub fn update(&self, sample: Sample) {
        self.histories
            .entry(sample.target.clone())
            .or_insert_with(|| History::new(self.capacity))
            .push(sample);
    }

    /// Forecast a target `horizon` past its latest sample
    ///
    /// With fewer than two samples the last value is returned with zero
    /// confidence. Returns `None` for targets with no history.
    pub fn forecast(&self, target: &str, horizon: Duration) -> Option<Forecast> {
        let history = self.histories.get(target)?;
        let last = history.last()?;

        let (predicted_value, confidence) = match LinearFit::from_samples(history.iter()) {
            Some(fit) => (
                fit.project(horizon.as_secs_f64()),
                confidence(history.fullness(), fit.relative_variance),
            ),
            None => (last.value, 0.0),
        };

        Some(Forecast {
            target: target.to_string(),
            horizon,
            predicted_value,
            confidence,
        })
    }

    /// Oldest-first copy of a target's history
    pub fn history(&self, target: &str) -> Vec<Sample> {
        self.histories
            .get(target)
            .map(|h| h.to_vec())
            .unwrap_or_default()
    }

    pub fn len(&self, target: &str) -> usize {
        self.histories.get(target).map(|h| h.len()).unwrap_or(0)
    }

    /// Stop tracking a target
    pub fn remove(&self, target: &str) {
        self.histories.remove(target);
    }

    pub fn stats(&self) -> TrendStats {
        TrendStats {
            targets_tracked: self.histories.len(),
            total_samples: self.histories.iter().map(|h| h.len()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn feed(estimator: &TrendEstimator, start: DateTime<Utc>, step_secs: i64, values: &[f64]) {
        for (i, value) in values.iter().enumerate() {
            let ts = start + chrono::Duration::seconds(step_secs * i as i64);
            estimator.update(Sample::percent("cpu-1", ts, *value));
        }
    }

    #[test]
    fn test_exact_linear_extrapolation() {
        let estimator = TrendEstimator::new(60);
        // 2 units per 5 seconds
        feed(&estimator, Utc::now(), 5, &[10.0, 12.0, 14.0, 16.0]);

        let forecast = estimator
            .forecast("cpu-1", Duration::from_secs(300))
            .unwrap();

        // 16 + 0.4/s * 300s
        assert!((forecast.predicted_value - 136.0).abs() < 1e-9);
        assert!(forecast.confidence > 0.0);
        assert!((forecast.confidence - 4.0 / 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_two_points_forecast() {
        let estimator = TrendEstimator::new(10);
        feed(&estimator, Utc::now(), 10, &[50.0, 40.0]);

        let forecast = estimator.forecast("cpu-1", Duration::from_secs(20)).unwrap();
        assert!((forecast.predicted_value - 20.0).abs() < 1e-9);
        assert!(forecast.confidence > 0.0);
    }

    #[test]
    fn test_single_sample_forecast() {
        let estimator = TrendEstimator::new(60);
        feed(&estimator, Utc::now(), 5, &[42.5]);

        let forecast = estimator.forecast("cpu-1", Duration::from_secs(300)).unwrap();
        assert_eq!(forecast.predicted_value, 42.5);
        assert_eq!(forecast.confidence, 0.0);
    }

    #[test]
    fn test_unknown_target() {
        let estimator = TrendEstimator::new(60);
        assert!(estimator.forecast("nope", Duration::from_secs(1)).is_none());
        assert!(estimator.history("nope").is_empty());
    }

    #[test]
    fn test_identical_timestamps_use_mean() {
        let estimator = TrendEstimator::new(10);
        feed(&estimator, Utc::now(), 0, &[10.0, 20.0, 30.0]);

        let forecast = estimator.forecast("cpu-1", Duration::from_secs(60)).unwrap();
        assert!((forecast.predicted_value - 20.0).abs() < 1e-9);
        assert!(forecast.confidence >= 0.0 && forecast.confidence <= 1.0);
    }

    #[test]
    fn test_capacity_bound_and_order() {
        let estimator = TrendEstimator::new(5);
        let values: Vec<f64> = (0..8).map(|i| i as f64).collect();
        feed(&estimator, Utc::now(), 1, &values);

        let history = estimator.history("cpu-1");
        assert_eq!(history.len(), 5);
        let kept: Vec<f64> = history.iter().map(|s| s.value).collect();
        assert_eq!(kept, vec![3.0, 4.0, 5.0, 6.0, 7.0]);
    }

    #[test]
    fn test_confidence_monotonicity() {
        // Fuller history raises confidence
        assert!(confidence(0.5, 1.0) < confidence(1.0, 1.0));
        // Lower variance raises confidence
        assert!(confidence(1.0, 4.0) < confidence(1.0, 0.5));
        // Bounded
        assert_eq!(confidence(2.0, 0.0), 1.0);
        assert!(confidence(1.0, f64::MAX) >= 0.0);
    }

    #[test]
    fn test_noisy_history_lowers_confidence() {
        let start = Utc::now();
        let clean = TrendEstimator::new(10);
        let noisy = TrendEstimator::new(10);
        feed(&clean, start, 5, &[10.0, 20.0, 30.0, 40.0]);
        feed(&noisy, start, 5, &[10.0, 35.0, 15.0, 40.0]);

        let horizon = Duration::from_secs(60);
        let clean = clean.forecast("cpu-1", horizon).unwrap();
        let noisy = noisy.forecast("cpu-1", horizon).unwrap();
        assert!(noisy.confidence < clean.confidence);
    }

    #[test]
    fn test_confidence_ignores_value_scale() {
        let start = Utc::now();
        let percent = TrendEstimator::new(10);
        let counter = TrendEstimator::new(10);
        feed(&percent, start, 5, &[10.0, 35.0, 15.0, 40.0]);
        feed(&counter, start, 5, &[1000.0, 3500.0, 1500.0, 4000.0]);

        let horizon = Duration::from_secs(60);
        let percent = percent.forecast("cpu-1", horizon).unwrap();
        let counter = counter.forecast("cpu-1", horizon).unwrap();
        assert!((percent.confidence - counter.confidence).abs() < 1e-12);
    }

    #[test]
    fn test_small_noise_keeps_high_confidence() {
        let estimator = TrendEstimator::new(8);
        // Flat around 50% with a couple of points of jitter
        feed(
            &estimator,
            Utc::now(),
            5,
            &[50.0, 52.0, 48.0, 51.0, 49.0, 53.0, 47.0, 50.0],
        );

        let forecast = estimator.forecast("cpu-1", Duration::from_secs(60)).unwrap();
        assert!(forecast.confidence > 0.9);
    }

    #[test]
    fn test_forecast_is_deterministic() {
        let estimator = TrendEstimator::new(20);
        feed(&estimator, Utc::now(), 3, &[5.0, 9.0, 4.0, 11.0, 7.0]);

        let horizon = Duration::from_secs(120);
        let first = estimator.forecast("cpu-1", horizon).unwrap();
        let second = estimator.forecast("cpu-1", horizon).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_stats_and_remove() {
        let estimator = TrendEstimator::new(10);
        feed(&estimator, Utc::now(), 1, &[1.0, 2.0, 3.0]);
        estimator.update(Sample::percent("mem-1", Utc::now(), 5.0));

        assert_eq!(
            estimator.stats(),
            TrendStats {
                targets_tracked: 2,
                total_samples: 4
            }
        );

        estimator.remove("cpu-1");
        assert_eq!(estimator.len("cpu-1"), 0);
        assert_eq!(estimator.stats().targets_tracked, 1);
    }
}
