//! Agent configuration

use anyhow::Result;
use serde::Deserialize;
use watch_lib::{Comparator, MonitorConfig, RuleConfig, Target, TargetKind};

/// Config file read when `WATCH_CONFIG` is unset
const DEFAULT_CONFIG_FILE: &str = "fleet-watch.toml";

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Node name reported in logs and webhook labels
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// API server port for health/metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Alertmanager-compatible webhook; alerts are only logged when unset
    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_ms: u64,

    /// Root of the proc filesystem
    #[serde(default = "default_proc_root")]
    pub proc_root: String,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_webhook_timeout() -> u64 {
    5_000
}

fn default_proc_root() -> String {
    "/proc".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            node_name: default_node_name(),
            api_port: default_api_port(),
            webhook_url: None,
            webhook_timeout_ms: default_webhook_timeout(),
            proc_root: default_proc_root(),
            monitor: MonitorConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from an optional config file and the environment
    pub fn load() -> Result<Self> {
        let path =
            std::env::var("WATCH_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(
                config::Environment::with_prefix("WATCH")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Monitor configuration with host defaults for missing targets and rules
    pub fn monitor_config(&self) -> MonitorConfig {
        let mut monitor = self.monitor.clone();

        if monitor.targets.is_empty() {
            monitor.targets = vec![
                Target::new("cpu", TargetKind::Cpu),
                Target::new("memory", TargetKind::Memory),
            ];
        }

        if monitor.rules.is_empty() {
            monitor.rules = vec![RuleConfig {
                id: "resource-high".to_string(),
                target: "*".to_string(),
                kind: None,
                threshold: 90.0,
                comparator: Comparator::GreaterThan,
                cool_down_secs: None,
                use_forecast: true,
                min_confidence: 0.0,
                escalate: true,
            }];
        }

        monitor
    }
}
