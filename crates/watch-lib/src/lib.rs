//! Core library for the fleet-watch resource monitor
//!
//! This crate provides the core functionality for:
//! - Sampling resource utilisation from metric sources
//! - Linear trend estimation and short-horizon forecasting
//! - Threshold evaluation with active and predictive alerts
//! - Cool-down deduplicated alert dispatch to notification sinks
//! - Periodic scheduling, health checks and observability

pub mod alert;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod monitor;
pub mod observability;
pub mod scheduler;
pub mod source;
pub mod trend;

pub use alert::{
    AlertDispatcher, DispatchOutcome, DispatchReport, FanoutSink, LogSink, NotificationSink,
    ThresholdEvaluator, WebhookSink,
};
pub use config::{MonitorConfig, RuleConfig, ValidatedConfig};
pub use error::{ConfigError, SchedulerError, SinkError, SourceError};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use monitor::{CycleReport, Monitor, MonitorBuilder, SystemStatus};
pub use observability::{MonitorMetrics, StructuredLogger};
pub use scheduler::{CycleRunner, Scheduler, SchedulerState, SchedulerStats, TickOutcome};
pub use source::{MetricSource, ProcfsSource, SourceSampler, StaticSource};
pub use trend::TrendEstimator;
