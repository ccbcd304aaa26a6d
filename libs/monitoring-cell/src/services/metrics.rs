// =====================================================================================
// METRICS AGGREGATOR SERVICE
// =====================================================================================

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockWriteGuard};
use tracing::debug;

use crate::models::{ServiceMetrics, ServiceMetricsView};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct MetricsKey {
    service: String,
    method: String,
}

/// Running per-(service, method) statistics. Durations are folded into an online
/// mean so no per-call history is kept here.
#[derive(Debug, Default)]
pub struct MetricsAggregator {
    metrics: RwLock<HashMap<MetricsKey, ServiceMetrics>>,
}

impl MetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) async fn record(
        &self,
        service: &str,
        method: &str,
        duration_ms: f64,
        success: bool,
        completed_at: DateTime<Utc>,
    ) {
        let mut metrics = self.metrics.write().await;
        fold_call(&mut metrics, service, method, duration_ms, success, completed_at);
    }

    pub async fn get_service_metrics(&self, service: &str, method: Option<&str>) -> ServiceMetricsView {
        let metrics = self.metrics.read().await;

        match method {
            Some(method) => {
                let key = MetricsKey {
                    service: service.to_string(),
                    method: method.to_string(),
                };
                ServiceMetricsView::Single(
                    metrics
                        .get(&key)
                        .cloned()
                        .unwrap_or_else(|| ServiceMetrics::empty(service, method)),
                )
            }
            None => ServiceMetricsView::ByMethod(
                metrics
                    .iter()
                    .filter(|(key, _)| key.service == service)
                    .map(|(key, value)| (key.method.clone(), value.clone()))
                    .collect(),
            ),
        }
    }

    /// All methods recorded for one service, keyed by method name.
    pub async fn methods_for(&self, service: &str) -> BTreeMap<String, ServiceMetrics> {
        match self.get_service_metrics(service, None).await {
            ServiceMetricsView::ByMethod(methods) => methods,
            ServiceMetricsView::Single(single) => BTreeMap::from([(single.method_name.clone(), single)]),
        }
    }

    /// Owned copy of every metric, ordered by service then method.
    pub async fn get_all_metrics(&self) -> Vec<ServiceMetrics> {
        let metrics = self.metrics.read().await;
        let mut all: Vec<(MetricsKey, ServiceMetrics)> = metrics
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all.into_iter().map(|(_, value)| value).collect()
    }

    pub(crate) async fn write(&self) -> MetricsWriteGuard<'_> {
        MetricsWriteGuard {
            guard: self.metrics.write().await,
        }
    }

    pub(crate) async fn reset(&self) {
        self.metrics.write().await.clear();
        debug!("Service metrics cleared");
    }
}

/// Write access held by the call tracker so that ending a call or resetting
/// updates metrics under the same critical section as the in-flight map.
pub(crate) struct MetricsWriteGuard<'a> {
    guard: RwLockWriteGuard<'a, HashMap<MetricsKey, ServiceMetrics>>,
}

impl MetricsWriteGuard<'_> {
    pub(crate) fn record(
        &mut self,
        service: &str,
        method: &str,
        duration_ms: f64,
        success: bool,
        completed_at: DateTime<Utc>,
    ) {
        fold_call(&mut self.guard, service, method, duration_ms, success, completed_at);
    }

    pub(crate) fn clear(&mut self) {
        self.guard.clear();
    }
}

fn fold_call(
    metrics: &mut HashMap<MetricsKey, ServiceMetrics>,
    service: &str,
    method: &str,
    duration_ms: f64,
    success: bool,
    completed_at: DateTime<Utc>,
) {
    let key = MetricsKey {
        service: service.to_string(),
        method: method.to_string(),
    };
    let entry = metrics
        .entry(key)
        .or_insert_with(|| ServiceMetrics::empty(service, method));

    entry.total_calls += 1;
    if success {
        entry.successful_calls += 1;
    } else {
        entry.failed_calls += 1;
    }

    entry.average_response_time_ms +=
        (duration_ms - entry.average_response_time_ms) / entry.total_calls as f64;
    entry.error_rate = entry.failed_calls as f64 / entry.total_calls as f64;
    entry.last_call = Some(completed_at);
}
