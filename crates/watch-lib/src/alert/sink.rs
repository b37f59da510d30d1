//! Notification sinks
//!
//! A [`NotificationSink`] is the observable boundary of the monitor: every
//! dispatched alert is handed to exactly one sink (which may fan out).

use crate::error::SinkError;
use crate::models::Alert;
use crate::observability::StructuredLogger;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives dispatched alerts
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Deliver one alert
    async fn send(&self, alert: &Alert) -> Result<(), SinkError>;

    /// Sink name, used for logging
    fn name(&self) -> &str;
}

/// Sink that writes each alert as a structured log event
pub struct LogSink {
    logger: StructuredLogger,
}

impl LogSink {
    pub fn new(logger: StructuredLogger) -> Self {
        Self { logger }
    }
}

#[async_trait]
impl NotificationSink for LogSink {
    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        self.logger.log_alert(alert);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Sink that forwards every alert to several sinks
///
/// All sinks are attempted; the first failure is reported.
pub struct FanoutSink {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn NotificationSink>>) -> Self {
        Self { sinks }
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

#[async_trait]
impl NotificationSink for FanoutSink {
    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        let mut first_error = None;

        for sink in &self.sinks {
            if let Err(e) = sink.send(alert).await {
                tracing::debug!(sink = sink.name(), error = %e, "Fan-out sink failed");
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "fanout"
    }
}
