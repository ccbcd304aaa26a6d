// =====================================================================================
// ALERT MANAGER SERVICE
// =====================================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::models::{
    Alert, AlertContext, AlertLevel, HealthStatus, MonitoringEvent, SystemHealth,
};
use crate::services::AlertNotifier;
use shared_config::AlertThresholds;

type AlertTimers = Arc<Mutex<HashMap<String, JoinHandle<()>>>>;

/// Append-only alert log. Alerts only ever move from unresolved to resolved.
///
/// Every breach found by [`AlertManager::evaluate_health`] raises a fresh alert,
/// even when the same condition was already reported on the previous tick.
pub struct AlertManager {
    alerts: Arc<RwLock<Vec<Alert>>>,
    timers: AlertTimers,
    thresholds: AlertThresholds,
    info_auto_resolve: Duration,
    notifier: Arc<dyn AlertNotifier>,
    events: broadcast::Sender<MonitoringEvent>,
}

impl AlertManager {
    pub fn new(
        thresholds: AlertThresholds,
        info_auto_resolve: Duration,
        notifier: Arc<dyn AlertNotifier>,
        events: broadcast::Sender<MonitoringEvent>,
    ) -> Self {
        Self {
            alerts: Arc::new(RwLock::new(Vec::new())),
            timers: Arc::new(Mutex::new(HashMap::new())),
            thresholds,
            info_auto_resolve,
            notifier,
            events,
        }
    }

    pub async fn create_alert(
        &self,
        level: AlertLevel,
        message: impl Into<String>,
        service: Option<&str>,
        metadata: Option<AlertContext>,
    ) -> Alert {
        let alert = Alert {
            id: Uuid::new_v4().to_string(),
            level,
            message: message.into(),
            timestamp: Utc::now(),
            service: service.map(str::to_string),
            resolved: false,
            resolved_at: None,
            metadata,
        };

        self.alerts.write().await.push(alert.clone());

        match alert.level {
            AlertLevel::Critical => error!(
                alert_id = %alert.id,
                service = ?alert.service,
                "CRITICAL ALERT TRIGGERED: {}", alert.message
            ),
            AlertLevel::Error => error!(
                alert_id = %alert.id,
                service = ?alert.service,
                "ERROR ALERT: {}", alert.message
            ),
            AlertLevel::Warning => warn!(
                alert_id = %alert.id,
                service = ?alert.service,
                "WARNING ALERT: {}", alert.message
            ),
            AlertLevel::Info => info!(alert_id = %alert.id, "INFO ALERT: {}", alert.message),
        }

        if alert.level == AlertLevel::Info {
            self.schedule_auto_resolve(&alert.id).await;
        }

        let _ = self.events.send(MonitoringEvent::Alert(alert.clone()));

        let notifier = Arc::clone(&self.notifier);
        let delivered = alert.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier.deliver(&delivered).await {
                warn!(alert_id = %delivered.id, error = %e, "Alert delivery failed");
            }
        });

        alert
    }

    async fn schedule_auto_resolve(&self, alert_id: &str) {
        let alerts = Arc::clone(&self.alerts);
        let timers = Arc::clone(&self.timers);
        let events = self.events.clone();
        let delay = self.info_auto_resolve;
        let id = alert_id.to_string();

        // Hold the timer map while spawning so the task cannot remove its own
        // entry before it has been inserted.
        let mut pending = self.timers.lock().await;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(resolved) = mark_resolved(&alerts, &id).await {
                debug!(alert_id = %id, "Info alert auto-resolved");
                let _ = events.send(MonitoringEvent::AlertResolved(resolved));
            }
            timers.lock().await.remove(&id);
        });
        pending.insert(alert_id.to_string(), handle);
    }

    /// Returns `true` only when the alert existed and was still unresolved.
    #[instrument(skip(self))]
    pub async fn resolve_alert(&self, alert_id: &str) -> bool {
        let Some(resolved) = mark_resolved(&self.alerts, alert_id).await else {
            warn!(alert_id, "Attempted to resolve unknown or already resolved alert");
            return false;
        };

        if let Some(timer) = self.timers.lock().await.remove(alert_id) {
            timer.abort();
        }

        info!(alert_id, "Alert resolved");
        let _ = self.events.send(MonitoringEvent::AlertResolved(resolved));
        true
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts.iter().rev().filter(|a| !a.resolved).cloned().collect()
    }

    /// Most recent first.
    pub async fn get_all_alerts(&self, limit: Option<usize>) -> Vec<Alert> {
        let alerts = self.alerts.read().await;
        alerts
            .iter()
            .rev()
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect()
    }

    pub async fn get_alert_summary(&self) -> HashMap<AlertLevel, u32> {
        let alerts = self.alerts.read().await;
        let mut summary = HashMap::new();

        for alert in alerts.iter().filter(|a| !a.resolved) {
            *summary.entry(alert.level).or_insert(0) += 1;
        }

        summary
    }

    pub async fn pending_auto_resolutions(&self) -> usize {
        self.timers.lock().await.len()
    }

    /// Raises one alert per threshold breach found in `health`.
    #[instrument(skip(self, health))]
    pub async fn evaluate_health(&self, health: &SystemHealth) -> Vec<Alert> {
        let mut raised = Vec::new();
        let resources = &health.metrics.resources;

        if resources.memory_usage_percent > self.thresholds.memory_usage_percent {
            raised.push(
                self.create_alert(
                    AlertLevel::Warning,
                    format!(
                        "High memory usage: {:.1}% (threshold {:.1}%)",
                        resources.memory_usage_percent, self.thresholds.memory_usage_percent
                    ),
                    None,
                    Some(AlertContext::Resource {
                        metric: "memory_usage_percent".to_string(),
                        value: resources.memory_usage_percent,
                        threshold: self.thresholds.memory_usage_percent,
                    }),
                )
                .await,
            );
        }

        if resources.cpu_usage_percent > self.thresholds.cpu_usage_percent {
            raised.push(
                self.create_alert(
                    AlertLevel::Warning,
                    format!(
                        "High CPU usage: {:.1}% (threshold {:.1}%)",
                        resources.cpu_usage_percent, self.thresholds.cpu_usage_percent
                    ),
                    None,
                    Some(AlertContext::Resource {
                        metric: "cpu_usage_percent".to_string(),
                        value: resources.cpu_usage_percent,
                        threshold: self.thresholds.cpu_usage_percent,
                    }),
                )
                .await,
            );
        }

        for (name, service) in &health.services {
            let level = match service.status {
                HealthStatus::Unhealthy => AlertLevel::Error,
                HealthStatus::Degraded => AlertLevel::Warning,
                HealthStatus::Healthy | HealthStatus::Unknown => continue,
            };

            raised.push(
                self.create_alert(
                    level,
                    format!(
                        "Service {} is {} (error rate {:.1}%, response time {:.0}ms)",
                        name,
                        service.status,
                        service.error_rate * 100.0,
                        service.response_time_ms
                    ),
                    Some(name),
                    Some(AlertContext::Service {
                        status: service.status,
                        error_rate: service.error_rate,
                        response_time_ms: service.response_time_ms,
                    }),
                )
                .await,
            );
        }

        if health.metrics.error_rate > self.thresholds.error_rate {
            raised.push(
                self.create_alert(
                    AlertLevel::Error,
                    format!(
                        "High system error rate: {:.1}% (threshold {:.1}%)",
                        health.metrics.error_rate * 100.0,
                        self.thresholds.error_rate * 100.0
                    ),
                    None,
                    Some(AlertContext::SystemErrorRate {
                        error_rate: health.metrics.error_rate,
                        threshold: self.thresholds.error_rate,
                    }),
                )
                .await,
            );
        }

        if !raised.is_empty() {
            debug!(count = raised.len(), "Health evaluation raised alerts");
        }

        raised
    }

    pub async fn reset(&self) {
        let mut timers = self.timers.lock().await;
        for (_, timer) in timers.drain() {
            timer.abort();
        }
        self.alerts.write().await.clear();
        info!("All alerts cleared");
    }
}

async fn mark_resolved(alerts: &RwLock<Vec<Alert>>, alert_id: &str) -> Option<Alert> {
    let mut alerts = alerts.write().await;
    let alert = alerts.iter_mut().find(|a| a.id == alert_id && !a.resolved)?;
    alert.resolved = true;
    alert.resolved_at = Some(Utc::now());
    Some(alert.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    use assert_matches::assert_matches;

    use crate::models::{ResourceUsage, ServiceHealth, ServiceHealthDetails, SystemMetrics};
    use crate::services::LogNotifier;

    fn manager() -> (AlertManager, broadcast::Receiver<MonitoringEvent>) {
        let (tx, rx) = broadcast::channel(64);
        let manager = AlertManager::new(
            AlertThresholds::default(),
            Duration::from_secs(300),
            Arc::new(LogNotifier),
            tx,
        );
        (manager, rx)
    }

    fn service(name: &str, status: HealthStatus, error_rate: f64) -> ServiceHealth {
        ServiceHealth {
            service: name.to_string(),
            status,
            last_check: Utc::now(),
            response_time_ms: 120.0,
            error_rate,
            availability: 1.0 - error_rate,
            details: ServiceHealthDetails::default(),
        }
    }

    fn health(resources: ResourceUsage, services: Vec<ServiceHealth>, error_rate: f64) -> SystemHealth {
        let services: BTreeMap<String, ServiceHealth> =
            services.into_iter().map(|s| (s.service.clone(), s)).collect();
        SystemHealth {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            uptime_seconds: 1,
            version: "test".to_string(),
            metrics: SystemMetrics {
                timestamp: Utc::now(),
                uptime_seconds: 1,
                resources,
                active_calls: 0,
                active_sessions: 0,
                total_sessions: 0,
                total_requests: 0,
                total_calls: 0,
                failed_calls: 0,
                error_rate,
                average_response_time_ms: 0.0,
                service_statuses: services.iter().map(|(k, v)| (k.clone(), v.status)).collect(),
            },
            services,
            alerts: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_create_and_list_alerts() {
        let (manager, mut rx) = manager();
        let first = manager.create_alert(AlertLevel::Warning, "first", None, None).await;
        let second = manager
            .create_alert(AlertLevel::Error, "second", Some("export"), None)
            .await;

        assert_ne!(first.id, second.id);
        assert!(!first.resolved);

        let all = manager.get_all_alerts(None).await;
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, second.id);
        assert_eq!(manager.get_all_alerts(Some(1)).await.len(), 1);
        assert_eq!(manager.get_active_alerts().await.len(), 2);

        assert_matches!(rx.recv().await, Ok(MonitoringEvent::Alert(a)) if a.id == first.id);
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let (manager, _rx) = manager();
        let alert = manager.create_alert(AlertLevel::Error, "boom", None, None).await;

        assert!(manager.resolve_alert(&alert.id).await);
        assert!(!manager.resolve_alert(&alert.id).await);
        assert!(!manager.resolve_alert("does-not-exist").await);

        let all = manager.get_all_alerts(None).await;
        assert_eq!(all.len(), 1);
        assert!(all[0].resolved);
        assert!(all[0].resolved_at.is_some());
        assert!(manager.get_active_alerts().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_info_alert_auto_resolves() {
        let (manager, _rx) = manager();
        let info_alert = manager.create_alert(AlertLevel::Info, "deploy finished", None, None).await;
        let warning = manager.create_alert(AlertLevel::Warning, "slow disk", None, None).await;
        assert_eq!(manager.pending_auto_resolutions().await, 1);

        tokio::time::sleep(Duration::from_secs(299)).await;
        assert_eq!(manager.get_active_alerts().await.len(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        let active = manager.get_active_alerts().await;
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, warning.id);

        let all = manager.get_all_alerts(None).await;
        let resolved = all.iter().find(|a| a.id == info_alert.id).unwrap();
        assert!(resolved.resolved);
        assert_eq!(manager.pending_auto_resolutions().await, 0);

        tokio::time::sleep(Duration::from_secs(3600)).await;
        assert_eq!(manager.get_active_alerts().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_manual_resolution_cancels_timer() {
        let (manager, mut rx) = manager();
        let alert = manager.create_alert(AlertLevel::Info, "note", None, None).await;
        let _ = rx.recv().await;

        assert!(manager.resolve_alert(&alert.id).await);
        assert_eq!(manager.pending_auto_resolutions().await, 0);
        assert_matches!(rx.recv().await, Ok(MonitoringEvent::AlertResolved(a)) if a.id == alert.id);

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_evaluation_raises_one_alert_per_breach() {
        let (manager, _rx) = manager();
        let snapshot = health(
            ResourceUsage::new(90, 100, 95.0),
            vec![
                service("export", HealthStatus::Unhealthy, 0.3),
                service("document", HealthStatus::Degraded, 0.06),
                service("conversation", HealthStatus::Healthy, 0.0),
                service("speech_to_text", HealthStatus::Unknown, 0.0),
            ],
            0.15,
        );

        let raised = manager.evaluate_health(&snapshot).await;
        assert_eq!(raised.len(), 5);

        let export = raised.iter().find(|a| a.service.as_deref() == Some("export")).unwrap();
        assert_eq!(export.level, AlertLevel::Error);
        let document = raised.iter().find(|a| a.service.as_deref() == Some("document")).unwrap();
        assert_eq!(document.level, AlertLevel::Warning);
        assert!(raised
            .iter()
            .any(|a| matches!(a.metadata, Some(AlertContext::SystemErrorRate { .. }))));
    }

    #[tokio::test]
    async fn test_persisting_breach_alerts_every_evaluation() {
        let (manager, _rx) = manager();
        let snapshot = health(
            ResourceUsage::new(10, 100, 5.0),
            vec![service("export", HealthStatus::Unhealthy, 0.5)],
            0.0,
        );

        manager.evaluate_health(&snapshot).await;
        manager.evaluate_health(&snapshot).await;
        assert_eq!(manager.get_active_alerts().await.len(), 2);
    }

    #[tokio::test]
    async fn test_summary_counts_active_by_level() {
        let (manager, _rx) = manager();
        manager.create_alert(AlertLevel::Warning, "a", None, None).await;
        manager.create_alert(AlertLevel::Warning, "b", None, None).await;
        let critical = manager.create_alert(AlertLevel::Critical, "c", None, None).await;
        manager.resolve_alert(&critical.id).await;

        let summary = manager.get_alert_summary().await;
        assert_eq!(summary.get(&AlertLevel::Warning), Some(&2));
        assert_eq!(summary.get(&AlertLevel::Critical), None);
    }
}
