use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use tracing::warn;

/// Services whose calls are evaluated on every health-check tick.
pub const DEFAULT_MONITORED_SERVICES: &[&str] = &[
    "conversation",
    "document",
    "speech_to_text",
    "text_to_speech",
    "export",
];

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server_host: String,
    pub server_port: u16,
    pub monitoring: MonitoringConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AlertThresholds {
    pub response_time_ms: f64,
    /// Fraction of failed calls, 0.0 - 1.0
    pub error_rate: f64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            response_time_ms: 5000.0,
            error_rate: 0.1,
            memory_usage_percent: 85.0,
            cpu_usage_percent: 80.0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub health_check_interval: Duration,
    pub dashboard_refresh_interval: Duration,
    pub service_poll_interval: Duration,
    pub metrics_retention_period: Duration,
    pub alert_thresholds: AlertThresholds,
    pub info_alert_auto_resolve: Duration,
    pub call_history_limit: usize,
    pub component_check_timeout: Duration,
    pub services: Vec<String>,
    pub enable_metrics_collection: bool,
    pub enable_alerting: bool,
    pub enable_dashboard: bool,
    pub alert_webhook_url: Option<String>,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            health_check_interval: Duration::from_secs(30),
            dashboard_refresh_interval: Duration::from_secs(10),
            service_poll_interval: Duration::from_secs(60),
            metrics_retention_period: Duration::from_secs(24 * 3600),
            alert_thresholds: AlertThresholds::default(),
            info_alert_auto_resolve: Duration::from_secs(300),
            call_history_limit: 1000,
            component_check_timeout: Duration::from_secs(5),
            services: DEFAULT_MONITORED_SERVICES.iter().map(|s| s.to_string()).collect(),
            enable_metrics_collection: true,
            enable_alerting: true,
            enable_dashboard: true,
            alert_webhook_url: None,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = MonitoringConfig::default();
        let thresholds = AlertThresholds {
            response_time_ms: parse_env(
                "MONITORING_RESPONSE_TIME_THRESHOLD_MS",
                defaults.alert_thresholds.response_time_ms,
            ),
            error_rate: parse_env(
                "MONITORING_ERROR_RATE_THRESHOLD",
                defaults.alert_thresholds.error_rate,
            ),
            memory_usage_percent: parse_env(
                "MONITORING_MEMORY_THRESHOLD_PERCENT",
                defaults.alert_thresholds.memory_usage_percent,
            ),
            cpu_usage_percent: parse_env(
                "MONITORING_CPU_THRESHOLD_PERCENT",
                defaults.alert_thresholds.cpu_usage_percent,
            ),
        };

        let services = env::var("MONITORING_SERVICES")
            .ok()
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|list| !list.is_empty())
            .unwrap_or(defaults.services);

        let alert_webhook_url = env::var("ALERT_WEBHOOK_URL")
            .ok()
            .filter(|url| !url.trim().is_empty());

        let monitoring = MonitoringConfig {
            health_check_interval: secs_env(
                "MONITORING_HEALTH_CHECK_INTERVAL_SECS",
                defaults.health_check_interval,
            ),
            dashboard_refresh_interval: secs_env(
                "MONITORING_DASHBOARD_REFRESH_SECS",
                defaults.dashboard_refresh_interval,
            ),
            service_poll_interval: secs_env(
                "MONITORING_SERVICE_POLL_SECS",
                defaults.service_poll_interval,
            ),
            metrics_retention_period: hours_env(
                "MONITORING_RETENTION_HOURS",
                defaults.metrics_retention_period,
            ),
            alert_thresholds: thresholds,
            info_alert_auto_resolve: secs_env(
                "MONITORING_INFO_ALERT_AUTO_RESOLVE_SECS",
                defaults.info_alert_auto_resolve,
            ),
            call_history_limit: parse_env(
                "MONITORING_CALL_HISTORY_LIMIT",
                defaults.call_history_limit,
            ),
            component_check_timeout: defaults.component_check_timeout,
            services,
            enable_metrics_collection: parse_env("MONITORING_ENABLE_METRICS", true),
            enable_alerting: parse_env("MONITORING_ENABLE_ALERTING", true),
            enable_dashboard: parse_env("MONITORING_ENABLE_DASHBOARD", true),
            alert_webhook_url,
        };

        let config = Self {
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| {
                warn!("SERVER_HOST not set, using 0.0.0.0");
                "0.0.0.0".to_string()
            }),
            server_port: parse_env("SERVER_PORT", 3000),
            monitoring,
        };

        if !config.is_alert_delivery_configured() {
            warn!("ALERT_WEBHOOK_URL not set - alerts will only be logged");
        }

        config
    }

    pub fn is_alert_delivery_configured(&self) -> bool {
        self.monitoring.alert_webhook_url.is_some()
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}

fn secs_env(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_env(key, default.as_secs()))
}

fn hours_env(key: &str, default: Duration) -> Duration {
    let hours = parse_env(key, default.as_secs() / 3600);
    match hours.checked_mul(3600) {
        Some(secs) => Duration::from_secs(secs),
        None => {
            warn!("{} value {} hours is out of range, using default {:?}", key, hours, default);
            default
        }
    }
}
