//! Host utilisation from the proc filesystem
//!
//! Reads:
//! - /proc/stat for CPU utilisation (busy share of jiffies between reads)
//! - /proc/meminfo for memory utilisation (1 - MemAvailable / MemTotal)

use super::MetricSource;
use crate::error::SourceError;
use crate::models::{Sample, Target, TargetKind, Unit};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::fs;
use tokio::sync::Mutex;

/// Aggregate CPU counters from the first line of /proc/stat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CpuTimes {
    pub total: u64,
    pub idle: u64,
}

impl CpuTimes {
    /// Busy percentage between two readings
    pub fn utilisation_since(&self, previous: &CpuTimes) -> f64 {
        let total = self.total.saturating_sub(previous.total);
        let idle = self.idle.saturating_sub(previous.idle);
        if total == 0 {
            return 0.0;
        }
        (total - idle.min(total)) as f64 / total as f64 * 100.0
    }
}

/// Source backed by /proc; supports cpu and memory targets
pub struct ProcfsSource {
    proc_root: PathBuf,
    previous_cpu: Mutex<HashMap<String, CpuTimes>>,
}

impl ProcfsSource {
    pub fn new() -> Self {
        Self::with_proc_root("/proc")
    }

    /// Create source with custom proc path (for testing)
    pub fn with_proc_root(proc_root: impl Into<PathBuf>) -> Self {
        Self {
            proc_root: proc_root.into(),
            previous_cpu: Mutex::new(HashMap::new()),
        }
    }

    /// Parse the aggregate `cpu` line of /proc/stat
    pub fn parse_cpu_stat(content: &str) -> Option<CpuTimes> {
        let line = content
            .lines()
            .find(|l| l.split_whitespace().next() == Some("cpu"))?;

        let fields: Vec<u64> = line
            .split_whitespace()
            .skip(1)
            .map(|v| v.parse().unwrap_or(0))
            .collect();
        if fields.len() < 4 {
            return None;
        }

        // user nice system idle iowait irq softirq steal; guest time is
        // already included in user/nice
        let total: u64 = fields.iter().take(8).sum();
        let idle = fields[3] + fields.get(4).copied().unwrap_or(0);

        Some(CpuTimes { total, idle })
    }

    /// Parse /proc/meminfo into used percentage
    pub fn parse_meminfo(content: &str) -> Option<f64> {
        let mut total = None;
        let mut available = None;

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 2 {
                continue;
            }
            match parts[0] {
                "MemTotal:" => total = parts[1].parse::<u64>().ok(),
                "MemAvailable:" => available = parts[1].parse::<u64>().ok(),
                _ => {}
            }
        }

        let total = total.filter(|t| *t > 0)? as f64;
        let available = available? as f64;
        Some(((total - available) / total * 100.0).clamp(0.0, 100.0))
    }

    async fn read(&self, target: &Target, file: &str) -> Result<String, SourceError> {
        let path = self.proc_root.join(file);
        fs::read_to_string(&path).await.map_err(|e| {
            SourceError::unavailable(&target.id, format!("failed to read {}: {}", path.display(), e))
        })
    }

    async fn sample_cpu(&self, target: &Target) -> Result<f64, SourceError> {
        let content = self.read(target, "stat").await?;
        let current = Self::parse_cpu_stat(&content)
            .ok_or_else(|| SourceError::unavailable(&target.id, "malformed /proc/stat"))?;

        let mut previous = self.previous_cpu.lock().await;
        let baseline = previous
            .insert(target.id.clone(), current)
            .unwrap_or_default();

        Ok(current.utilisation_since(&baseline))
    }

    async fn sample_memory(&self, target: &Target) -> Result<f64, SourceError> {
        let content = self.read(target, "meminfo").await?;
        Self::parse_meminfo(&content)
            .ok_or_else(|| SourceError::unavailable(&target.id, "malformed /proc/meminfo"))
    }
}

impl Default for ProcfsSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MetricSource for ProcfsSource {
    async fn sample(&self, target: &Target) -> Result<Sample, SourceError> {
        let value = match target.kind {
            TargetKind::Cpu => self.sample_cpu(target).await?,
            TargetKind::Memory => self.sample_memory(target).await?,
            TargetKind::Disk | TargetKind::Custom => {
                return Err(SourceError::unavailable(
                    &target.id,
                    format!("{} targets are not supported by procfs", target.kind),
                ));
            }
        };

        Ok(Sample::new(&target.id, Utc::now(), value, Unit::Percent))
    }

    fn name(&self) -> &str {
        "procfs"
    }
}
