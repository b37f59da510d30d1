//! Metric sources
//!
//! A [`MetricSource`] reads the current value of one target. The
//! [`SourceSampler`] fans reads out across all targets with bounded
//! parallelism and a per-read timeout, then fans the outcomes back in
//! registration order. A failed target never aborts the others.

mod procfs;
mod scripted;

pub use procfs::{CpuTimes, ProcfsSource};
pub use scripted::StaticSource;

use crate::error::SourceError;
use crate::models::{Sample, Target};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

/// Outcome of sampling one target
pub type SampleOutcome = Result<Sample, SourceError>;

/// Adapter that reads samples for monitored targets
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Read the current value for a target
    async fn sample(&self, target: &Target) -> Result<Sample, SourceError>;

    /// Adapter name, used for logging
    fn name(&self) -> &str;
}

/// Samples all targets concurrently through a [`MetricSource`]
pub struct SourceSampler {
    source: Arc<dyn MetricSource>,
    timeout: Duration,
    parallelism: usize,
}

impl SourceSampler {
    pub fn new(source: Arc<dyn MetricSource>, timeout: Duration, parallelism: usize) -> Self {
        Self {
            source,
            timeout,
            parallelism: parallelism.max(1),
        }
    }

    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Sample every target, returning one outcome per target in input order
    ///
    /// Reads are owned by this call: dropping the returned future aborts any
    /// read still in flight.
    pub async fn sample(&self, targets: &[Target]) -> Vec<SampleOutcome> {
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut reads = JoinSet::new();

        for (index, target) in targets.iter().cloned().enumerate() {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&permits);
            let timeout = self.timeout;

            reads.spawn(async move {
                let outcome = match permits.acquire_owned().await {
                    Ok(_permit) => sample_one(source.as_ref(), &target, timeout).await,
                    Err(_) => Err(SourceError::unavailable(&target.id, "sampler shut down")),
                };
                (index, outcome)
            });
        }

        // Reads that panic keep this placeholder
        let mut outcomes: Vec<SampleOutcome> = targets
            .iter()
            .map(|t| Err(SourceError::unavailable(&t.id, "source task failed")))
            .collect();

        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((index, outcome)) => outcomes[index] = outcome,
                Err(e) => debug!(error = %e, "Source read task failed"),
            }
        }

        outcomes
    }
}

async fn sample_one(
    source: &dyn MetricSource,
    target: &Target,
    timeout: Duration,
) -> SampleOutcome {
    let sample = match tokio::time::timeout(timeout, source.sample(target)).await {
        Ok(result) => result?,
        Err(_) => {
            debug!(target_id = %target.id, timeout_ms = timeout.as_millis() as u64, "Source read timed out");
            return Err(SourceError::Timeout {
                target: target.id.clone(),
                timeout,
            });
        }
    };

    if !sample.value.is_finite() {
        return Err(SourceError::unavailable(
            &target.id,
            format!("non-finite value {}", sample.value),
        ));
    }

    Ok(sample)
}
