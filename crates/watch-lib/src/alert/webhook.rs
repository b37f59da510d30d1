//! Webhook notification sink
//!
//! Posts alerts in the Alertmanager webhook format so existing routing
//! (Alertmanager, chat bridges, incident tools) can consume them.

use super::NotificationSink;
use crate::error::SinkError;
use crate::models::{Alert, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Alertmanager webhook alert format
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertmanagerAlert {
    /// Alert status (always firing; the monitor does not emit resolutions)
    pub status: String,
    /// Alert labels for routing and grouping
    pub labels: HashMap<String, String>,
    /// Alert annotations with details
    pub annotations: HashMap<String, String>,
    /// Start time in RFC3339 format
    pub starts_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_url: Option<String>,
}

/// Alertmanager webhook payload (array of alerts)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertmanagerPayload {
    pub alerts: Vec<AlertmanagerAlert>,
}

impl AlertmanagerAlert {
    pub fn from_alert(alert: &Alert, node_name: &str) -> Self {
        let alertname = match alert.severity {
            Severity::Active => "ResourceThresholdBreached",
            Severity::Predictive => "ResourceThresholdPredicted",
        };

        let mut labels = HashMap::new();
        labels.insert("alertname".to_string(), alertname.to_string());
        labels.insert("severity".to_string(), alert.severity.to_string());
        labels.insert("rule".to_string(), alert.rule_id.clone());
        labels.insert("target".to_string(), alert.target.clone());
        labels.insert("node".to_string(), node_name.to_string());

        let mut annotations = HashMap::new();
        annotations.insert("summary".to_string(), alert.summary());
        annotations.insert(
            "observed_value".to_string(),
            format!("{:.2}", alert.observed_value),
        );
        annotations.insert(
            "threshold".to_string(),
            format!("{} {:.2}", alert.comparator, alert.threshold),
        );
        if let Some(predicted) = alert.predicted_value {
            annotations.insert("predicted_value".to_string(), format!("{:.2}", predicted));
        }
        if let Some(confidence) = alert.confidence {
            annotations.insert(
                "confidence".to_string(),
                format!("{:.0}%", confidence * 100.0),
            );
        }

        Self {
            status: "firing".to_string(),
            labels,
            annotations,
            starts_at: alert.triggered_at.to_rfc3339(),
            generator_url: None,
        }
    }
}

/// Sink that POSTs each alert to an HTTP endpoint
pub struct WebhookSink {
    url: String,
    node_name: String,
    client: reqwest::Client,
}

impl WebhookSink {
    pub fn new(
        url: impl Into<String>,
        node_name: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SinkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: url.into(),
            node_name: node_name.into(),
            client,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Build the request body for one alert
    pub fn payload(&self, alert: &Alert) -> AlertmanagerPayload {
        AlertmanagerPayload {
            alerts: vec![AlertmanagerAlert::from_alert(alert, &self.node_name)],
        }
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn send(&self, alert: &Alert) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&self.payload(alert))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SinkError::failure(
                "webhook",
                format!("status={} body={}", status.as_u16(), body),
            ));
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
