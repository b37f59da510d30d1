//! Alert evaluation and delivery
//!
//! This module provides:
//! - Threshold evaluation of current and forecast values
//! - Cool-down deduplication of repeated alerts
//! - Notification sinks (structured log, webhook, fan-out)

mod dispatcher;
mod evaluator;
mod sink;
mod webhook;

pub use dispatcher::{AlertDispatcher, DispatchOutcome, DispatchReport};
pub use evaluator::ThresholdEvaluator;
pub use sink::{FanoutSink, LogSink, NotificationSink};
pub use webhook::{AlertmanagerAlert, AlertmanagerPayload, WebhookSink};
