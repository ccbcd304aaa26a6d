// =====================================================================================
// HEALTH EVALUATOR SERVICE
// =====================================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use sysinfo::System;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, instrument, warn};

use crate::models::{
    HealthStatus, MonitoringError, ResourceUsage, ServiceHealth, ServiceHealthDetails,
    SystemHealth, SystemMetrics,
};
use crate::services::CallTracker;
use shared_config::{AlertThresholds, MonitoringConfig};

/// Source of host memory / CPU readings.
#[async_trait]
pub trait ResourceSampler: Send + Sync {
    async fn sample(&self) -> Result<ResourceUsage>;
}

/// Default period between host readings taken by [`SysinfoSampler`].
pub const HOST_SAMPLE_PERIOD: Duration = Duration::from_secs(5);

type HostReading = std::result::Result<ResourceUsage, String>;

/// Samples the host through `sysinfo` on one background task and hands out the
/// latest reading. Callers never wait on the CPU refresh window except for the
/// very first reading.
pub struct SysinfoSampler {
    latest: watch::Receiver<Option<HostReading>>,
    task: JoinHandle<()>,
}

impl SysinfoSampler {
    /// Starts the sampling task. Must be called from within a Tokio runtime.
    pub fn spawn(period: Duration) -> Self {
        let (publisher, latest) = watch::channel(None);
        let period = period.max(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);

        let task = tokio::spawn(async move {
            let mut system = System::new();
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let reading = read_host(&mut system).await;
                if let Err(e) = &reading {
                    warn!(error = %e, "Host resource sampling failed");
                }
                if publisher.send(Some(reading)).is_err() {
                    break;
                }
            }
        });

        Self { latest, task }
    }
}

impl Drop for SysinfoSampler {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// CPU usage needs two refreshes separated by `MINIMUM_CPU_UPDATE_INTERVAL`.
async fn read_host(system: &mut System) -> HostReading {
    system.refresh_cpu_usage();
    tokio::time::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL).await;
    system.refresh_cpu_usage();
    system.refresh_memory();

    let total = system.total_memory();
    if total == 0 {
        return Err("host reported zero total memory".to_string());
    }

    Ok(ResourceUsage::new(
        system.used_memory(),
        total,
        f64::from(system.global_cpu_usage()),
    ))
}

#[async_trait]
impl ResourceSampler for SysinfoSampler {
    async fn sample(&self) -> Result<ResourceUsage> {
        let mut latest = self.latest.clone();
        let reading = latest
            .wait_for(Option::is_some)
            .await
            .map_err(|_| anyhow::anyhow!("host sampling task has stopped"))?
            .clone();

        match reading {
            Some(Ok(usage)) => Ok(usage),
            Some(Err(e)) => Err(anyhow::anyhow!(e)),
            None => anyhow::bail!("no host reading available"),
        }
    }
}

/// Returns the same reading every time. Useful where the host should not be probed.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedResourceSampler {
    usage: ResourceUsage,
}

impl FixedResourceSampler {
    pub fn new(usage: ResourceUsage) -> Self {
        Self { usage }
    }
}

#[async_trait]
impl ResourceSampler for FixedResourceSampler {
    async fn sample(&self) -> Result<ResourceUsage> {
        Ok(self.usage)
    }
}

/// Classifies a service from its error rate and response time. The most severe
/// matching rule wins.
pub fn classify(error_rate: f64, response_time_ms: f64, thresholds: &AlertThresholds) -> HealthStatus {
    if error_rate > thresholds.error_rate || response_time_ms > thresholds.response_time_ms {
        HealthStatus::Unhealthy
    } else if error_rate > thresholds.error_rate * 0.5
        || response_time_ms > thresholds.response_time_ms * 0.7
    {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

/// Worst-of over service statuses. Services without traffic do not count.
pub fn system_status<'a, I>(statuses: I) -> HealthStatus
where
    I: IntoIterator<Item = &'a HealthStatus>,
{
    let mut degraded = false;
    for status in statuses {
        match status {
            HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
            HealthStatus::Degraded => degraded = true,
            HealthStatus::Healthy | HealthStatus::Unknown => {}
        }
    }

    if degraded {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    }
}

pub struct HealthEvaluator {
    start_time: Instant,
    thresholds: AlertThresholds,
    services: Vec<String>,
    tracker: Arc<CallTracker>,
    sampler: Arc<dyn ResourceSampler>,
}

impl HealthEvaluator {
    pub fn new(
        config: &MonitoringConfig,
        tracker: Arc<CallTracker>,
        sampler: Arc<dyn ResourceSampler>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            thresholds: config.alert_thresholds.clone(),
            services: config.services.clone(),
            tracker,
            sampler,
        }
    }

    pub fn thresholds(&self) -> &AlertThresholds {
        &self.thresholds
    }

    pub fn services(&self) -> &[String] {
        &self.services
    }

    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Response time is the unweighted mean of per-method averages, so a rarely
    /// used slow method counts as much as a hot fast one.
    pub async fn check_service_health(&self, service: &str) -> ServiceHealth {
        let methods = self.tracker.aggregator().methods_for(service).await;
        let now = Utc::now();

        let total: u64 = methods.values().map(|m| m.total_calls).sum();
        if methods.is_empty() || total == 0 {
            return ServiceHealth {
                service: service.to_string(),
                status: HealthStatus::Unknown,
                last_check: now,
                response_time_ms: 0.0,
                error_rate: 0.0,
                availability: 0.0,
                details: ServiceHealthDetails::default(),
            };
        }

        let successful: u64 = methods.values().map(|m| m.successful_calls).sum();
        let response_time_ms = methods
            .values()
            .map(|m| m.average_response_time_ms)
            .sum::<f64>()
            / methods.len() as f64;
        let availability = successful as f64 / total as f64;
        let error_rate = (total - successful) as f64 / total as f64;
        let last_call = methods.values().filter_map(|m| m.last_call).max();

        ServiceHealth {
            service: service.to_string(),
            status: classify(error_rate, response_time_ms, &self.thresholds),
            last_check: now,
            response_time_ms,
            error_rate,
            availability,
            details: ServiceHealthDetails {
                total_calls: total,
                successful_calls: successful,
                failed_calls: total - successful,
                method_count: methods.len(),
                last_call,
            },
        }
    }

    pub async fn check_all_services(&self) -> BTreeMap<String, ServiceHealth> {
        let mut results = BTreeMap::new();
        for service in &self.services {
            results.insert(service.clone(), self.check_service_health(service).await);
        }
        results
    }

    /// Full evaluation; fails when host resources cannot be sampled.
    #[instrument(skip(self))]
    pub async fn evaluate(&self) -> Result<SystemHealth, MonitoringError> {
        let resources = self
            .sampler
            .sample()
            .await
            .map_err(|e| MonitoringError::ResourceSampling(e.to_string()))?;
        Ok(self.compose(resources).await)
    }

    /// Evaluation for ad-hoc queries: a failed resource sample degrades to zeros.
    pub async fn snapshot(&self) -> SystemHealth {
        let resources = match self.sampler.sample().await {
            Ok(resources) => resources,
            Err(e) => {
                warn!(error = %e, "Resource sampling failed, reporting zeroed resources");
                ResourceUsage::default()
            }
        };
        self.compose(resources).await
    }

    async fn compose(&self, resources: ResourceUsage) -> SystemHealth {
        let services = self.check_all_services().await;
        let all_metrics = self.tracker.aggregator().get_all_metrics().await;

        let total_calls: u64 = all_metrics.iter().map(|m| m.total_calls).sum();
        let failed_calls: u64 = all_metrics.iter().map(|m| m.failed_calls).sum();
        let (error_rate, average_response_time_ms) = if total_calls > 0 {
            let weighted: f64 = all_metrics
                .iter()
                .map(|m| m.average_response_time_ms * m.total_calls as f64)
                .sum();
            (
                failed_calls as f64 / total_calls as f64,
                weighted / total_calls as f64,
            )
        } else {
            (0.0, 0.0)
        };

        let service_statuses: BTreeMap<String, HealthStatus> = services
            .iter()
            .map(|(name, health)| (name.clone(), health.status))
            .collect();
        let status = system_status(service_statuses.values());
        let timestamp = Utc::now();
        let uptime_seconds = self.uptime_seconds();

        let metrics = SystemMetrics {
            timestamp,
            uptime_seconds,
            resources,
            active_calls: self.tracker.active_call_count().await,
            active_sessions: self.tracker.active_session_count().await,
            total_sessions: self.tracker.total_sessions(),
            total_requests: self.tracker.total_requests(),
            total_calls,
            failed_calls,
            error_rate,
            average_response_time_ms,
            service_statuses,
        };

        debug!(status = %status, total_calls, error_rate, "System health evaluated");

        SystemHealth {
            status,
            timestamp,
            uptime_seconds,
            version: env!("CARGO_PKG_VERSION").to_string(),
            services,
            metrics,
            alerts: Vec::new(),
        }
    }
}
