// =====================================================================================
// MONITORING CELL MODELS
// =====================================================================================

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shared_config::AlertThresholds;

// =====================================================================================
// SERVICE CALLS
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(String);

impl CallId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CallId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CallId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CallMetadata {
    pub request_id: Option<String>,
    pub session_id: Option<String>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

impl CallMetadata {
    pub fn with_request(request_id: impl Into<String>) -> Self {
        Self {
            request_id: Some(request_id.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceCall {
    pub id: CallId,
    pub service_name: String,
    pub method_name: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_ms: Option<f64>,
    pub success: Option<bool>,
    pub error: Option<String>,
    pub metadata: Option<CallMetadata>,
}

impl ServiceCall {
    pub fn is_active(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    Start,
    End,
}

// =====================================================================================
// AGGREGATED METRICS
// =====================================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceMetrics {
    pub service_name: String,
    pub method_name: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub average_response_time_ms: f64,
    pub last_call: Option<DateTime<Utc>>,
    pub error_rate: f64,
}

impl ServiceMetrics {
    pub fn empty(service_name: &str, method_name: &str) -> Self {
        Self {
            service_name: service_name.to_string(),
            method_name: method_name.to_string(),
            total_calls: 0,
            successful_calls: 0,
            failed_calls: 0,
            average_response_time_ms: 0.0,
            last_call: None,
            error_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ServiceMetricsView {
    Single(ServiceMetrics),
    ByMethod(BTreeMap<String, ServiceMetrics>),
}

// =====================================================================================
// HEALTH
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
    Unknown,
}

impl HealthStatus {
    /// Ordering used when folding statuses into a worst-of result.
    pub fn severity(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 0,
            HealthStatus::Unknown => 1,
            HealthStatus::Degraded => 2,
            HealthStatus::Unhealthy => 3,
        }
    }

    pub fn worst<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        statuses
            .into_iter()
            .max_by_key(|status| status.severity())
            .unwrap_or(HealthStatus::Healthy)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HealthStatus::Healthy => write!(f, "healthy"),
            HealthStatus::Degraded => write!(f, "degraded"),
            HealthStatus::Unhealthy => write!(f, "unhealthy"),
            HealthStatus::Unknown => write!(f, "unknown"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthDetails {
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub method_count: usize,
    pub last_call: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub service: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: f64,
    pub error_rate: f64,
    pub availability: f64,
    pub details: ServiceHealthDetails,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceUsage {
    pub memory_used_bytes: u64,
    pub memory_total_bytes: u64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
}

impl ResourceUsage {
    pub fn new(memory_used_bytes: u64, memory_total_bytes: u64, cpu_usage_percent: f64) -> Self {
        let memory_usage_percent = if memory_total_bytes > 0 {
            memory_used_bytes as f64 / memory_total_bytes as f64 * 100.0
        } else {
            0.0
        };

        Self {
            memory_used_bytes,
            memory_total_bytes,
            memory_usage_percent,
            cpu_usage_percent,
        }
    }
}

/// Point-in-time view of the whole system; this is what the history store retains.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub resources: ResourceUsage,
    pub active_calls: usize,
    pub active_sessions: usize,
    pub total_sessions: u64,
    pub total_requests: u64,
    pub total_calls: u64,
    pub failed_calls: u64,
    pub error_rate: f64,
    pub average_response_time_ms: f64,
    pub service_statuses: BTreeMap<String, HealthStatus>,
}

impl SystemMetrics {
    pub fn unhealthy_services(&self) -> Vec<String> {
        self.service_statuses
            .iter()
            .filter(|(_, status)| **status == HealthStatus::Unhealthy)
            .map(|(name, _)| name.clone())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemHealth {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub version: String,
    pub services: BTreeMap<String, ServiceHealth>,
    pub metrics: SystemMetrics,
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    pub issues: Vec<String>,
    pub metrics: BTreeMap<String, f64>,
    pub last_check: DateTime<Utc>,
    pub response_time_ms: u64,
}

impl ComponentHealth {
    pub fn new(status: HealthStatus) -> Self {
        Self {
            status,
            issues: Vec::new(),
            metrics: BTreeMap::new(),
            last_check: Utc::now(),
            response_time_ms: 0,
        }
    }

    pub fn healthy() -> Self {
        Self::new(HealthStatus::Healthy)
    }

    pub fn degraded(issue: impl Into<String>) -> Self {
        Self::new(HealthStatus::Degraded).with_issue(issue)
    }

    pub fn unknown(issue: impl Into<String>) -> Self {
        Self::new(HealthStatus::Unknown).with_issue(issue)
    }

    pub fn with_issue(mut self, issue: impl Into<String>) -> Self {
        self.issues.push(issue.into());
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSummary {
    pub healthy: u32,
    pub degraded: u32,
    pub unhealthy: u32,
    pub unknown: u32,
}

impl StatusSummary {
    pub fn record(&mut self, status: HealthStatus) {
        match status {
            HealthStatus::Healthy => self.healthy += 1,
            HealthStatus::Degraded => self.degraded += 1,
            HealthStatus::Unhealthy => self.unhealthy += 1,
            HealthStatus::Unknown => self.unknown += 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemOverview {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub system: SystemHealth,
    pub components: BTreeMap<String, ComponentHealth>,
    pub summary: StatusSummary,
}

// =====================================================================================
// ALERTS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertLevel::Info => write!(f, "info"),
            AlertLevel::Warning => write!(f, "warning"),
            AlertLevel::Error => write!(f, "error"),
            AlertLevel::Critical => write!(f, "critical"),
        }
    }
}

/// Structured payload attached to an alert, one variant per kind of condition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertContext {
    Resource {
        metric: String,
        value: f64,
        threshold: f64,
    },
    Service {
        status: HealthStatus,
        error_rate: f64,
        response_time_ms: f64,
    },
    SystemErrorRate {
        error_rate: f64,
        threshold: f64,
    },
    Failure {
        error: String,
    },
    Custom {
        tags: BTreeMap<String, String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    pub service: Option<String>,
    pub resolved: bool,
    pub resolved_at: Option<DateTime<Utc>>,
    pub metadata: Option<AlertContext>,
}

// =====================================================================================
// HISTORY, TRENDS & CRITICAL FAILURES
// =====================================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthTrendPoint {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub error_rate: f64,
    pub average_response_time_ms: f64,
    pub memory_usage_percent: f64,
    pub cpu_usage_percent: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CascadingFailures,
    MemoryExhaustion,
    CpuOverload,
    HighErrorRate,
    ServiceUnavailability,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSeverity {
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticalFailureIndicator {
    pub kind: FailureKind,
    pub severity: FailureSeverity,
    pub message: String,
    pub affected_services: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CriticalFailureIndicators {
    pub cascading_failures: bool,
    pub indicators: Vec<CriticalFailureIndicator>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl CriticalFailureIndicators {
    pub fn has(&self, kind: FailureKind) -> bool {
        self.indicators.iter().any(|i| i.kind == kind)
    }
}

// =====================================================================================
// INSIGHTS
// =====================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BottleneckKind {
    SlowService,
    ErrorProneService,
    SlowMethod,
    MemoryPressure,
    CpuPressure,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bottleneck {
    pub kind: BottleneckKind,
    pub target: String,
    pub value: f64,
    pub threshold: f64,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Stable,
    Degrading,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricTrend {
    pub metric: String,
    pub recent_average: f64,
    pub previous_average: f64,
    pub change_percent: f64,
    pub direction: TrendDirection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerformanceInsights {
    pub bottlenecks: Vec<Bottleneck>,
    pub recommendations: Vec<String>,
    pub trends: Vec<MetricTrend>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComprehensiveMonitoringData {
    pub overview: SystemOverview,
    pub metrics: Vec<ServiceMetrics>,
    pub active_alerts: Vec<Alert>,
    pub alert_summary: HashMap<AlertLevel, u32>,
    pub critical_failures: CriticalFailureIndicators,
    pub insights: PerformanceInsights,
    pub thresholds: AlertThresholds,
    pub history_samples: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RealTimeMetrics {
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    pub uptime_seconds: u64,
    pub resources: ResourceUsage,
    pub active_calls: usize,
    pub active_sessions: usize,
    pub total_requests: u64,
    pub error_rate: f64,
    pub average_response_time_ms: f64,
    pub active_alerts: usize,
    pub components: BTreeMap<String, ComponentHealth>,
    pub critical_failures: CriticalFailureIndicators,
}

// =====================================================================================
// EVENTS
// =====================================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum MonitoringEvent {
    Health(Box<SystemHealth>),
    Alert(Alert),
    AlertResolved(Alert),
    Dashboard(Box<SystemOverview>),
}

// =====================================================================================
// REQUEST / RESPONSE MODELS
// =====================================================================================

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ServiceMetricsQuery {
    pub method: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AlertsQuery {
    pub active_only: Option<bool>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct HoursQuery {
    pub hours: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ResolveAlertResponse {
    pub alert_id: String,
    pub resolved: bool,
}

// =====================================================================================
// ERRORS
// =====================================================================================

#[derive(Debug, thiserror::Error)]
pub enum MonitoringError {
    #[error("Health check failed: {0}")]
    HealthCheckFailed(String),
    #[error("Alert not found or already resolved: {0}")]
    AlertNotFound(String),
    #[error("Resource sampling failed: {0}")]
    ResourceSampling(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worst_status_ranking() {
        use HealthStatus::*;
        assert_eq!(HealthStatus::worst([Healthy, Degraded, Unknown]), Degraded);
        assert_eq!(HealthStatus::worst([Healthy, Unknown]), Unknown);
        assert_eq!(HealthStatus::worst([Degraded, Unhealthy, Healthy]), Unhealthy);
        assert_eq!(HealthStatus::worst(Vec::new()), Healthy);
    }

    #[test]
    fn test_resource_usage_percent() {
        let usage = ResourceUsage::new(512, 1024, 12.5);
        assert_eq!(usage.memory_usage_percent, 50.0);

        let empty = ResourceUsage::new(0, 0, 0.0);
        assert_eq!(empty.memory_usage_percent, 0.0);
    }

    #[test]
    fn test_alert_context_serialization() {
        let context = AlertContext::Resource {
            metric: "cpu_usage_percent".to_string(),
            value: 91.0,
            threshold: 80.0,
        };
        let json = serde_json::to_value(&context).unwrap();
        assert_eq!(json["kind"], "resource");
        assert_eq!(json["metric"], "cpu_usage_percent");
    }

    #[test]
    fn test_error_messages() {
        let failed = MonitoringError::HealthCheckFailed("sampler exploded".to_string());
        assert_eq!(failed.to_string(), "Health check failed: sampler exploded");

        let missing = MonitoringError::AlertNotFound("a-1".to_string());
        assert_eq!(missing.to_string(), "Alert not found or already resolved: a-1");
    }

    #[test]
    fn test_alert_level_ordering() {
        assert!(AlertLevel::Critical > AlertLevel::Error);
        assert!(AlertLevel::Warning > AlertLevel::Info);
        assert_eq!(AlertLevel::Error.to_string(), "error");
    }
}
