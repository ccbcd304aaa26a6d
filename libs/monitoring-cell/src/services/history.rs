// =====================================================================================
// METRICS HISTORY SERVICE
// =====================================================================================

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::models::{
    CriticalFailureIndicator, CriticalFailureIndicators, FailureKind, FailureSeverity,
    HealthStatus, HealthTrendPoint, SystemMetrics,
};
use shared_config::AlertThresholds;

const MEMORY_EXHAUSTION_RATIO: f64 = 0.9;
const CPU_OVERLOAD_PERCENT: f64 = 95.0;
const CRITICAL_ERROR_RATE: f64 = 0.2;
const DEGRADED_ERROR_RATE_FACTOR: f64 = 0.5;
const DEGRADED_RESPONSE_TIME_FACTOR: f64 = 0.7;

/// Time-ordered store of `SystemMetrics` snapshots bounded by the retention period.
pub struct HistoryStore {
    entries: RwLock<VecDeque<SystemMetrics>>,
    retention: chrono::Duration,
    thresholds: AlertThresholds,
}

impl HistoryStore {
    pub fn new(retention: Duration, thresholds: AlertThresholds) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
            thresholds,
        }
    }

    pub async fn record(&self, snapshot: SystemMetrics) {
        self.record_at(snapshot, Utc::now()).await;
    }

    pub(crate) async fn record_at(&self, snapshot: SystemMetrics, now: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.push_back(snapshot);

        let cutoff = cutoff(now, self.retention);
        let before = entries.len();
        entries.retain(|entry| entry.timestamp >= cutoff);

        let pruned = before - entries.len();
        if pruned > 0 {
            debug!(pruned, retained = entries.len(), "Pruned expired metrics history");
        }
    }

    /// Snapshots from the last `hours` (all retained ones when `None`), oldest first.
    pub async fn get_metrics_history(&self, hours: Option<f64>) -> Vec<SystemMetrics> {
        self.get_metrics_history_at(Utc::now(), hours).await
    }

    pub(crate) async fn get_metrics_history_at(
        &self,
        now: DateTime<Utc>,
        hours: Option<f64>,
    ) -> Vec<SystemMetrics> {
        let window = hours
            .filter(|h| h.is_finite() && *h >= 0.0)
            .map(|h| chrono::Duration::milliseconds((h * 3_600_000.0) as i64))
            .map_or(self.retention, |requested| requested.min(self.retention));
        let cutoff = cutoff(now, window);

        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|entry| entry.timestamp >= cutoff)
            .cloned()
            .collect()
    }

    #[instrument(skip(self))]
    pub async fn get_health_trends(&self, hours: f64) -> Vec<HealthTrendPoint> {
        self.get_metrics_history(Some(hours))
            .await
            .iter()
            .map(|snapshot| HealthTrendPoint {
                timestamp: snapshot.timestamp,
                status: trend_status(snapshot, &self.thresholds),
                error_rate: snapshot.error_rate,
                average_response_time_ms: snapshot.average_response_time_ms,
                memory_usage_percent: snapshot.resources.memory_usage_percent,
                cpu_usage_percent: snapshot.resources.cpu_usage_percent,
            })
            .collect()
    }

    pub async fn get_critical_failure_indicators(&self) -> CriticalFailureIndicators {
        let entries = self.entries.read().await;
        critical_failure_indicators(entries.back())
    }

    /// The most recent `count` snapshots, oldest first.
    pub async fn latest(&self, count: usize) -> Vec<SystemMetrics> {
        let entries = self.entries.read().await;
        let skip = entries.len().saturating_sub(count);
        entries.iter().skip(skip).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    pub async fn reset(&self) {
        self.entries.write().await.clear();
    }
}

fn cutoff(now: DateTime<Utc>, window: chrono::Duration) -> DateTime<Utc> {
    now.checked_sub_signed(window).unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Coarse status of a stored snapshot, judged against the current thresholds.
pub fn trend_status(snapshot: &SystemMetrics, thresholds: &AlertThresholds) -> HealthStatus {
    let any_service = |wanted: HealthStatus| snapshot.service_statuses.values().any(|s| *s == wanted);

    if snapshot.error_rate > thresholds.error_rate
        || snapshot.average_response_time_ms > thresholds.response_time_ms
        || any_service(HealthStatus::Unhealthy)
    {
        return HealthStatus::Unhealthy;
    }

    if snapshot.error_rate > thresholds.error_rate * DEGRADED_ERROR_RATE_FACTOR
        || snapshot.average_response_time_ms > thresholds.response_time_ms * DEGRADED_RESPONSE_TIME_FACTOR
        || any_service(HealthStatus::Degraded)
        || snapshot.resources.memory_usage_percent > thresholds.memory_usage_percent
        || snapshot.resources.cpu_usage_percent > thresholds.cpu_usage_percent
    {
        return HealthStatus::Degraded;
    }

    HealthStatus::Healthy
}

/// Failure patterns visible in a single snapshot. `None` yields no indicators.
pub fn critical_failure_indicators(latest: Option<&SystemMetrics>) -> CriticalFailureIndicators {
    let Some(snapshot) = latest else {
        return CriticalFailureIndicators::default();
    };

    let unhealthy = snapshot.unhealthy_services();
    let cascading = unhealthy.len() >= 2;
    let mut indicators = Vec::new();

    if cascading {
        indicators.push(CriticalFailureIndicator {
            kind: FailureKind::CascadingFailures,
            severity: FailureSeverity::Critical,
            message: format!("{} services are unhealthy at the same time", unhealthy.len()),
            affected_services: unhealthy.clone(),
        });
    }

    let resources = &snapshot.resources;
    if resources.memory_total_bytes > 0
        && resources.memory_used_bytes as f64 / resources.memory_total_bytes as f64 > MEMORY_EXHAUSTION_RATIO
    {
        indicators.push(CriticalFailureIndicator {
            kind: FailureKind::MemoryExhaustion,
            severity: FailureSeverity::Critical,
            message: format!("Memory usage at {:.1}%", resources.memory_usage_percent),
            affected_services: Vec::new(),
        });
    }

    if resources.cpu_usage_percent > CPU_OVERLOAD_PERCENT {
        indicators.push(CriticalFailureIndicator {
            kind: FailureKind::CpuOverload,
            severity: FailureSeverity::High,
            message: format!("CPU usage at {:.1}%", resources.cpu_usage_percent),
            affected_services: Vec::new(),
        });
    }

    if snapshot.error_rate > CRITICAL_ERROR_RATE {
        indicators.push(CriticalFailureIndicator {
            kind: FailureKind::HighErrorRate,
            severity: FailureSeverity::High,
            message: format!("System error rate at {:.1}%", snapshot.error_rate * 100.0),
            affected_services: Vec::new(),
        });
    }

    if !cascading && !unhealthy.is_empty() {
        indicators.push(CriticalFailureIndicator {
            kind: FailureKind::ServiceUnavailability,
            severity: FailureSeverity::Medium,
            message: format!("Service {} is unhealthy", unhealthy.join(", ")),
            affected_services: unhealthy,
        });
    }

    CriticalFailureIndicators {
        cascading_failures: cascading,
        indicators,
        timestamp: Some(snapshot.timestamp),
    }
}
