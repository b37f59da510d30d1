//! In-memory source with scripted values per target

use super::MetricSource;
use crate::error::SourceError;
use crate::models::{Sample, Target};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Default)]
struct Script {
    values: VecDeque<f64>,
    delay: Option<Duration>,
    failure: Option<String>,
    reads: u32,
}

/// Source that replays queued values for each target
///
/// Targets with no queued value left are reported unavailable. A fixed
/// clock makes sample timestamps reproducible: the n-th read of a target
/// is stamped `start + n * step`.
#[derive(Debug, Default)]
pub struct StaticSource {
    scripts: DashMap<String, Script>,
    clock: Option<(DateTime<Utc>, chrono::Duration)>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp samples from a fixed clock instead of wall-clock time
    pub fn with_fixed_clock(mut self, start: DateTime<Utc>, step: Duration) -> Self {
        let step = chrono::Duration::from_std(step).unwrap_or_else(|_| chrono::Duration::zero());
        self.clock = Some((start, step));
        self
    }

    /// Queue values to be returned by successive reads of `target`
    pub fn push_values(&self, target: &str, values: impl IntoIterator<Item = f64>) {
        self.scripts
            .entry(target.to_string())
            .or_default()
            .values
            .extend(values);
    }

    /// Delay every read of `target`
    pub fn set_delay(&self, target: &str, delay: Duration) {
        self.scripts.entry(target.to_string()).or_default().delay = Some(delay);
    }

    /// Make every read of `target` fail
    pub fn fail(&self, target: &str, reason: impl Into<String>) {
        self.scripts.entry(target.to_string()).or_default().failure = Some(reason.into());
    }

    /// Values still queued for `target`
    pub fn remaining(&self, target: &str) -> usize {
        self.scripts
            .get(target)
            .map(|s| s.values.len())
            .unwrap_or(0)
    }
}

#[async_trait]
impl MetricSource for StaticSource {
    async fn sample(&self, target: &Target) -> Result<Sample, SourceError> {
        let delay = self.scripts.get(&target.id).and_then(|s| s.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        // The entry guard is only held between awaits
        let mut script = self
            .scripts
            .get_mut(&target.id)
            .ok_or_else(|| SourceError::unavailable(&target.id, "no script for target"))?;

        if let Some(reason) = &script.failure {
            return Err(SourceError::unavailable(&target.id, reason.clone()));
        }

        let value = script
            .values
            .pop_front()
            .ok_or_else(|| SourceError::unavailable(&target.id, "script exhausted"))?;

        let timestamp = match self.clock {
            Some((start, step)) => start + step * script.reads as i32,
            None => Utc::now(),
        };
        script.reads += 1;

        Ok(Sample::new(
            &target.id,
            timestamp,
            value,
            target.kind.default_unit(),
        ))
    }

    fn name(&self) -> &str {
        "static"
    }
}
