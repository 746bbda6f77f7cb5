//! Collector configuration
//!
//! Read from unprefixed environment variables. NAMESPACE, POD_NAME, SERVICES
//! and DEPLOYMENT_NAME are required; everything else has a default.

use anyhow::{bail, Context, Result};
use collector_lib::monitor::{MonitorConfig, MonitorTarget};
use collector_lib::traces::ZipkinConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Variables as read from the environment, before validation
#[derive(Debug, Deserialize)]
struct RawConfig {
    namespace: Option<String>,
    pod_name: Option<String>,
    services: Option<String>,
    deployment_name: Option<String>,

    trace_backend_url: Option<String>,
    /// Older name of TRACE_BACKEND_URL
    zipkin_url: Option<String>,
    span_name: Option<String>,

    #[serde(default = "default_trace_lookback_ms")]
    trace_lookback_ms: u64,
    #[serde(default = "default_trace_drift_ms")]
    trace_drift_ms: u64,
    #[serde(default = "default_trace_limit")]
    trace_limit: u32,
    #[serde(default = "default_trace_timeout_secs")]
    trace_timeout_secs: u64,
    #[serde(default = "default_sample_window_ms")]
    sample_window_ms: u64,
    #[serde(default = "default_watch_interval_secs")]
    watch_interval_secs: u64,
    #[serde(default = "default_settle_interval_secs")]
    settle_interval_secs: u64,

    record_dir: Option<String>,

    #[serde(default = "default_api_port")]
    api_port: u16,
}

fn default_trace_backend_url() -> String {
    "http://10.10.0.68:30200".to_string()
}

fn default_trace_lookback_ms() -> u64 {
    3_600_000
}

fn default_trace_drift_ms() -> u64 {
    120_000
}

fn default_trace_limit() -> u32 {
    1000
}

fn default_trace_timeout_secs() -> u64 {
    7
}

fn default_sample_window_ms() -> u64 {
    2000
}

fn default_watch_interval_secs() -> u64 {
    60
}

fn default_settle_interval_secs() -> u64 {
    900
}

fn default_api_port() -> u16 {
    8080
}

/// Collector configuration
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub namespace: String,
    /// Substring of the monitored pod's name
    pub pod_name: String,
    /// Services to sample, in traversal order
    pub services: Vec<String>,
    pub deployment_name: String,

    pub trace_backend_url: String,
    pub span_name: Option<String>,
    pub trace_lookback: Duration,
    pub trace_drift: Duration,
    pub trace_limit: u32,
    pub trace_timeout: Duration,

    pub sample_window: Duration,
    pub watch_interval: Duration,
    pub settle_interval: Duration,

    /// Directory holding the `<deployment>.csv` records
    pub record_dir: PathBuf,

    /// API server port for health/metrics
    pub api_port: u16,
}

impl CollectorConfig {
    /// Load configuration from the process environment
    pub fn load() -> Result<Self> {
        Self::from_env(config::Environment::default())
    }

    /// Load configuration from an environment source
    pub fn from_env(env: config::Environment) -> Result<Self> {
        let raw: RawConfig = config::Config::builder()
            .add_source(env.try_parsing(true))
            .build()
            .context("Failed to read environment")?
            .try_deserialize()
            .context("Invalid collector configuration")?;

        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self> {
        let namespace = non_empty(raw.namespace);
        let pod_name = non_empty(raw.pod_name);
        let deployment_name = non_empty(raw.deployment_name);
        let services = raw.services.as_deref().map(parse_services).unwrap_or_default();

        let mut missing = Vec::new();
        if namespace.is_none() {
            missing.push("NAMESPACE");
        }
        if pod_name.is_none() {
            missing.push("POD_NAME");
        }
        if services.is_empty() {
            missing.push("SERVICES");
        }
        if deployment_name.is_none() {
            missing.push("DEPLOYMENT_NAME");
        }

        let (Some(namespace), Some(pod_name), Some(deployment_name), false) =
            (namespace, pod_name, deployment_name, services.is_empty())
        else {
            bail!(
                "Missing required environment variables: {}",
                missing.join(", ")
            );
        };

        let trace_backend_url = non_empty(raw.trace_backend_url)
            .or_else(|| non_empty(raw.zipkin_url))
            .unwrap_or_else(default_trace_backend_url);

        Ok(Self {
            namespace,
            pod_name,
            services,
            deployment_name,
            trace_backend_url,
            span_name: non_empty(raw.span_name),
            trace_lookback: Duration::from_millis(raw.trace_lookback_ms),
            trace_drift: Duration::from_millis(raw.trace_drift_ms),
            trace_limit: raw.trace_limit,
            trace_timeout: Duration::from_secs(raw.trace_timeout_secs),
            sample_window: Duration::from_millis(raw.sample_window_ms),
            watch_interval: Duration::from_secs(raw.watch_interval_secs),
            settle_interval: Duration::from_secs(raw.settle_interval_secs),
            record_dir: non_empty(raw.record_dir)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".")),
            api_port: raw.api_port,
        })
    }

    pub fn zipkin_config(&self) -> ZipkinConfig {
        ZipkinConfig {
            base_url: self.trace_backend_url.clone(),
            lookback: self.trace_lookback,
            drift: self.trace_drift,
            limit: self.trace_limit,
            timeout: self.trace_timeout,
            span_name: self.span_name.clone(),
        }
    }

    pub fn monitor_target(&self) -> MonitorTarget {
        MonitorTarget {
            namespace: self.namespace.clone(),
            pod_pattern: self.pod_name.clone(),
            deployment: self.deployment_name.clone(),
        }
    }

    pub fn monitor_config(&self) -> MonitorConfig {
        MonitorConfig {
            watch_interval: self.watch_interval,
            settle_interval: self.settle_interval,
            window_duration: self.sample_window,
        }
    }
}

/// Trimmed value, or `None` if absent or blank
fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Split a comma-separated service list, dropping blank entries
fn parse_services(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config::Environment::default().source(Some(map))
    }

    fn required() -> Vec<(&'static str, &'static str)> {
        vec![
            ("NAMESPACE", "games"),
            ("POD_NAME", "game-7d9f"),
            ("SERVICES", "render, audio,,physics"),
            ("DEPLOYMENT_NAME", "game"),
        ]
    }

    #[test]
    fn test_defaults() {
        let config = CollectorConfig::from_env(env(&required())).unwrap();

        assert_eq!(config.namespace, "games");
        assert_eq!(config.services, vec!["render", "audio", "physics"]);
        assert_eq!(config.trace_backend_url, "http://10.10.0.68:30200");
        assert_eq!(config.span_name, None);
        assert_eq!(config.trace_lookback, Duration::from_secs(3600));
        assert_eq!(config.trace_drift, Duration::from_secs(120));
        assert_eq!(config.trace_limit, 1000);
        assert_eq!(config.trace_timeout, Duration::from_secs(7));
        assert_eq!(config.sample_window, Duration::from_millis(2000));
        assert_eq!(config.watch_interval, Duration::from_secs(60));
        assert_eq!(config.settle_interval, Duration::from_secs(900));
        assert_eq!(config.record_dir, PathBuf::from("."));
        assert_eq!(config.api_port, 8080);
    }

    #[test]
    fn test_missing_variables_are_all_named() {
        let err = CollectorConfig::from_env(env(&[("NAMESPACE", "games"), ("SERVICES", " , ")]))
            .unwrap_err()
            .to_string();

        assert!(err.contains("POD_NAME"));
        assert!(err.contains("SERVICES"));
        assert!(err.contains("DEPLOYMENT_NAME"));
        assert!(!err.contains("NAMESPACE"));
    }

    #[test]
    fn test_blank_required_variable_is_missing() {
        let vars = [
            ("NAMESPACE", "games"),
            ("POD_NAME", "game-7d9f"),
            ("SERVICES", "render"),
            ("DEPLOYMENT_NAME", "  "),
        ];

        let err = CollectorConfig::from_env(env(&vars)).unwrap_err();
        assert!(err.to_string().contains("DEPLOYMENT_NAME"));
    }

    #[test]
    fn test_overrides() {
        let mut vars = required();
        vars.extend([
            ("TRACE_BACKEND_URL", "http://zipkin:9411"),
            ("SPAN_NAME", "frame"),
            ("TRACE_LIMIT", "50"),
            ("WATCH_INTERVAL_SECS", "5"),
            ("RECORD_DIR", "/data/records"),
            ("API_PORT", "9100"),
        ]);

        let config = CollectorConfig::from_env(env(&vars)).unwrap();

        assert_eq!(config.trace_backend_url, "http://zipkin:9411");
        assert_eq!(config.span_name.as_deref(), Some("frame"));
        assert_eq!(config.trace_limit, 50);
        assert_eq!(config.watch_interval, Duration::from_secs(5));
        assert_eq!(config.record_dir, PathBuf::from("/data/records"));
        assert_eq!(config.api_port, 9100);

        let zipkin = config.zipkin_config();
        assert_eq!(zipkin.base_url, "http://zipkin:9411");
        assert_eq!(zipkin.limit, 50);

        let target = config.monitor_target();
        assert_eq!(target.pod_pattern, "game-7d9f");
        assert_eq!(target.deployment, "game");
        let monitor = config.monitor_config();
        assert_eq!(monitor.watch_interval, Duration::from_secs(5));
        assert_eq!(monitor.settle_interval, Duration::from_secs(900));
        assert_eq!(monitor.window_duration, Duration::from_millis(2000));
    }

    #[test]
    fn test_zipkin_url_alias() {
        let mut vars = required();
        vars.push(("ZIPKIN_URL", "http://legacy:30200"));
        let config = CollectorConfig::from_env(env(&vars)).unwrap();
        assert_eq!(config.trace_backend_url, "http://legacy:30200");

        vars.push(("TRACE_BACKEND_URL", "http://zipkin:9411"));
        let config = CollectorConfig::from_env(env(&vars)).unwrap();
        assert_eq!(config.trace_backend_url, "http://zipkin:9411");
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let mut vars = required();
        vars.push(("SETTLE_INTERVAL_SECS", "fifteen minutes"));

        assert!(CollectorConfig::from_env(env(&vars)).is_err());
    }

    #[test]
    fn test_parse_services() {
        assert_eq!(parse_services("render"), vec!["render"]);
        assert_eq!(parse_services(" a ,b, "), vec!["a", "b"]);
        assert!(parse_services(",,").is_empty());
    }
}
