// =====================================================================================
// MONITORING COORDINATOR
// =====================================================================================

use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, instrument, warn};

use crate::models::{
    Alert, AlertContext, AlertLevel, CallId, CallMetadata, ComponentHealth,
    ComprehensiveMonitoringData, CriticalFailureIndicators, HealthStatus, HealthTrendPoint,
    MonitoringError, MonitoringEvent, RealTimeMetrics, ServiceCall, ServiceMetrics,
    ServiceMetricsView, SessionEvent, StatusSummary, SystemHealth, SystemMetrics, SystemOverview,
};
use crate::services::components::panic_message;
use crate::services::{
    critical_failure_indicators, insights, AlertManager, AlertNotifier, CallTracker,
    ComponentHealthCheck, ComponentRegistry, HealthEvaluator, HistoryStore, LogNotifier,
    MetricsAggregator, ResourceSampler, SysinfoSampler, WebhookNotifier, HOST_SAMPLE_PERIOD,
};
use shared_config::MonitoringConfig;

const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy)]
enum Tick {
    HealthCheck,
    Dashboard,
    ServicePoll,
}

impl Tick {
    fn name(self) -> &'static str {
        match self {
            Tick::HealthCheck => "health_check",
            Tick::Dashboard => "dashboard_refresh",
            Tick::ServicePoll => "service_poll",
        }
    }
}

/// Owns every monitoring component and drives the periodic work.
///
/// Create one per process with [`MonitoringService::new`], share the returned
/// `Arc`, call [`start`](Self::start) once and [`stop`](Self::stop) on shutdown.
pub struct MonitoringService {
    config: MonitoringConfig,
    tracker: Arc<CallTracker>,
    evaluator: HealthEvaluator,
    alerts: AlertManager,
    history: HistoryStore,
    components: ComponentRegistry,
    events: broadcast::Sender<MonitoringEvent>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    // Shared by health checks, exclusive for reset.
    epoch: RwLock<()>,
}

impl MonitoringService {
    /// Samples the host with [`SysinfoSampler`]; call from within a Tokio runtime.
    pub fn new(config: MonitoringConfig) -> Arc<Self> {
        Self::with_sampler(config, Arc::new(SysinfoSampler::spawn(HOST_SAMPLE_PERIOD)))
    }

    pub fn with_sampler(config: MonitoringConfig, sampler: Arc<dyn ResourceSampler>) -> Arc<Self> {
        let notifier: Arc<dyn AlertNotifier> = match config.alert_webhook_url.as_deref() {
            Some(url) => match WebhookNotifier::new(url) {
                Ok(webhook) => {
                    info!(url, "Alert webhook delivery enabled");
                    Arc::new(webhook)
                }
                Err(e) => {
                    warn!(url, error = %e, "Invalid alert webhook, falling back to log delivery");
                    Arc::new(LogNotifier)
                }
            },
            None => Arc::new(LogNotifier),
        };

        Self::with_collaborators(config, sampler, notifier)
    }

    pub fn with_collaborators(
        config: MonitoringConfig,
        sampler: Arc<dyn ResourceSampler>,
        notifier: Arc<dyn AlertNotifier>,
    ) -> Arc<Self> {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let aggregator = Arc::new(MetricsAggregator::new());
        let tracker = Arc::new(CallTracker::new(aggregator, config.call_history_limit));

        Arc::new(Self {
            evaluator: HealthEvaluator::new(&config, Arc::clone(&tracker), sampler),
            alerts: AlertManager::new(
                config.alert_thresholds.clone(),
                config.info_alert_auto_resolve,
                notifier,
                events.clone(),
            ),
            history: HistoryStore::new(
                config.metrics_retention_period,
                config.alert_thresholds.clone(),
            ),
            components: ComponentRegistry::new(config.component_check_timeout),
            tracker,
            events,
            tasks: Mutex::new(Vec::new()),
            epoch: RwLock::new(()),
            config,
        })
    }

    pub fn config(&self) -> &MonitoringConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<CallTracker> {
        &self.tracker
    }

    // =====================================================================================
    // LIFECYCLE
    // =====================================================================================

    /// Spawns the periodic ticks. Calling it while already running does nothing.
    pub async fn start(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            debug!("Monitoring already running");
            return;
        }

        tasks.push(self.spawn_periodic(Tick::HealthCheck, self.config.health_check_interval));
        if self.config.enable_dashboard {
            tasks.push(self.spawn_periodic(Tick::Dashboard, self.config.dashboard_refresh_interval));
        }
        tasks.push(self.spawn_periodic(Tick::ServicePoll, self.config.service_poll_interval));

        info!(
            health_check_secs = self.config.health_check_interval.as_secs(),
            services = ?self.config.services,
            "Monitoring started"
        );
    }

    pub async fn stop(&self) {
        let mut tasks = self.tasks.lock().await;
        if tasks.is_empty() {
            return;
        }

        for task in tasks.drain(..) {
            task.abort();
        }
        info!("Monitoring stopped");
    }

    pub async fn is_running(&self) -> bool {
        !self.tasks.lock().await.is_empty()
    }

    fn spawn_periodic(self: &Arc<Self>, tick: Tick, period: Duration) -> JoinHandle<()> {
        let monitor: Weak<Self> = Arc::downgrade(self);
        let period = period.max(Duration::from_millis(1));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                let Some(monitor) = monitor.upgrade() else {
                    debug!(tick = tick.name(), "Monitoring service dropped, ending tick");
                    break;
                };

                match tick {
                    Tick::HealthCheck => {
                        let _ = monitor.run_health_check_tick().await;
                    }
                    Tick::Dashboard => monitor.refresh_dashboard().await,
                    Tick::ServicePoll => {
                        let components = monitor.components.run_all().await;
                        debug!(count = components.len(), "Component health refreshed");
                    }
                }
            }
        })
    }

    /// Runs one health check on its own task. Any error or panic is logged and
    /// raised as a critical alert; the caller's schedule is unaffected.
    pub async fn run_health_check_tick(self: &Arc<Self>) -> Result<SystemHealth, MonitoringError> {
        let monitor = Arc::clone(self);
        let outcome = tokio::spawn(async move { monitor.perform_health_check().await }).await;

        let reason = match outcome {
            Ok(Ok(health)) => return Ok(health),
            Ok(Err(e)) => e.to_string(),
            Err(join_error) if join_error.is_panic() => {
                format!("health check panicked: {}", panic_message(join_error.into_panic().as_ref()))
            }
            Err(join_error) => join_error.to_string(),
        };

        error!(error = %reason, "Health check failed");
        let _epoch = self.epoch.read().await;
        self.alerts
            .create_alert(
                AlertLevel::Critical,
                format!("Critical system failure: {reason}"),
                None,
                Some(AlertContext::Failure {
                    error: reason.clone(),
                }),
            )
            .await;

        Err(MonitoringError::HealthCheckFailed(reason))
    }

    #[instrument(skip(self))]
    async fn perform_health_check(&self) -> Result<SystemHealth, MonitoringError> {
        let _epoch = self.epoch.read().await;
        let mut health = self.evaluator.evaluate().await?;

        if self.config.enable_alerting {
            self.alerts.evaluate_health(&health).await;
        }
        health.alerts = self.alerts.get_active_alerts().await;

        if self.config.enable_metrics_collection {
            self.history.record(health.metrics.clone()).await;
        }

        let _ = self.events.send(MonitoringEvent::Health(Box::new(health.clone())));

        info!(
            status = %health.status,
            active_alerts = health.alerts.len(),
            "Health check completed"
        );
        Ok(health)
    }

    async fn refresh_dashboard(&self) {
        let overview = self.get_system_overview().await;
        let _ = self.events.send(MonitoringEvent::Dashboard(Box::new(overview)));
    }

    pub fn subscribe(&self) -> broadcast::Receiver<MonitoringEvent> {
        self.events.subscribe()
    }

    // =====================================================================================
    // INSTRUMENTATION
    // =====================================================================================

    pub async fn start_call(&self, service: &str, method: &str, metadata: Option<CallMetadata>) -> CallId {
        self.tracker.start_call(service, method, metadata).await
    }

    pub async fn end_call(&self, call_id: &CallId) {
        self.tracker.end_call(call_id).await;
    }

    pub async fn end_call_with_error(&self, call_id: &CallId, error: impl Into<String>) {
        self.tracker.end_call_with_error(call_id, error).await;
    }

    pub async fn track<F, T, E>(&self, service: &str, method: &str, operation: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
        E: Display,
    {
        self.tracker.track(service, method, operation).await
    }

    pub async fn track_session(&self, session_id: &str, event: SessionEvent) {
        self.tracker.track_session(session_id, event).await;
    }

    pub fn track_request(&self) {
        self.tracker.track_request();
    }

    pub async fn register_component_health_check(
        &self,
        name: &str,
        check: impl ComponentHealthCheck + 'static,
    ) {
        self.components.register(name, check).await;
    }

    // =====================================================================================
    // QUERIES
    // =====================================================================================

    pub async fn get_system_health(&self) -> SystemHealth {
        let mut health = self.evaluator.snapshot().await;
        health.alerts = self.alerts.get_active_alerts().await;
        health
    }

    pub async fn get_service_metrics(&self, service: &str, method: Option<&str>) -> ServiceMetricsView {
        self.tracker.aggregator().get_service_metrics(service, method).await
    }

    pub async fn get_all_metrics(&self) -> Vec<ServiceMetrics> {
        self.tracker.aggregator().get_all_metrics().await
    }

    pub async fn get_active_calls(&self) -> Vec<ServiceCall> {
        self.tracker.get_active_calls().await
    }

    pub async fn get_call_history(&self, limit: Option<usize>) -> Vec<ServiceCall> {
        self.tracker.get_call_history(limit).await
    }

    pub async fn create_alert(
        &self,
        level: AlertLevel,
        message: impl Into<String>,
        service: Option<&str>,
        metadata: Option<AlertContext>,
    ) -> Alert {
        self.alerts.create_alert(level, message, service, metadata).await
    }

    pub async fn get_active_alerts(&self) -> Vec<Alert> {
        self.alerts.get_active_alerts().await
    }

    pub async fn get_all_alerts(&self, limit: Option<usize>) -> Vec<Alert> {
        self.alerts.get_all_alerts(limit).await
    }

    pub async fn get_alert_summary(&self) -> HashMap<AlertLevel, u32> {
        self.alerts.get_alert_summary().await
    }

    pub async fn resolve_alert(&self, alert_id: &str) -> bool {
        self.alerts.resolve_alert(alert_id).await
    }

    pub async fn get_metrics_history(&self, hours: Option<f64>) -> Vec<SystemMetrics> {
        self.history.get_metrics_history(hours).await
    }

    pub async fn get_health_trends(&self, hours: f64) -> Vec<HealthTrendPoint> {
        self.history.get_health_trends(hours).await
    }

    pub async fn get_critical_failure_indicators(&self) -> CriticalFailureIndicators {
        self.history.get_critical_failure_indicators().await
    }

    /// System health combined with a fresh run of every component probe.
    #[instrument(skip(self))]
    pub async fn get_system_overview(&self) -> SystemOverview {
        let system = self.get_system_health().await;
        let components = self.components.run_all().await;
        overview(system, components)
    }

    pub async fn get_comprehensive_monitoring_data(&self) -> ComprehensiveMonitoringData {
        let overview = self.get_system_overview().await;
        let metrics = self.get_all_metrics().await;
        let history = self.history.latest(insights::TREND_WINDOW * 2).await;

        let insights = insights::analyze(
            &overview.system.services,
            &metrics,
            &overview.system.metrics.resources,
            &history,
            self.evaluator.thresholds(),
        );

        ComprehensiveMonitoringData {
            active_alerts: overview.system.alerts.clone(),
            alert_summary: self.alerts.get_alert_summary().await,
            critical_failures: self.history.get_critical_failure_indicators().await,
            thresholds: self.evaluator.thresholds().clone(),
            history_samples: self.history.len().await,
            overview,
            metrics,
            insights,
        }
    }

    /// Fresh system snapshot with the component results cached by the last poll.
    pub async fn get_real_time_metrics(&self) -> RealTimeMetrics {
        let health = self.get_system_health().await;
        let components = self.components.cached().await;
        let status = HealthStatus::worst(
            std::iter::once(health.status).chain(components.values().map(|c| c.status)),
        );

        RealTimeMetrics {
            timestamp: Utc::now(),
            status,
            uptime_seconds: health.uptime_seconds,
            resources: health.metrics.resources,
            active_calls: health.metrics.active_calls,
            active_sessions: health.metrics.active_sessions,
            total_requests: health.metrics.total_requests,
            error_rate: health.metrics.error_rate,
            average_response_time_ms: health.metrics.average_response_time_ms,
            active_alerts: health.alerts.len(),
            critical_failures: critical_failure_indicators(Some(&health.metrics)),
            components,
        }
    }

    /// Clears calls, metrics, sessions, alerts and history. Registered probes and
    /// the running schedule are kept.
    ///
    /// Waits for any health check in progress, so no check straddles the reset.
    pub async fn reset(&self) {
        let _epoch = self.epoch.write().await;
        self.tracker.reset().await;
        self.alerts.reset().await;
        self.history.reset().await;
        warn!("Monitoring data reset");
    }
}

fn overview(system: SystemHealth, components: BTreeMap<String, ComponentHealth>) -> SystemOverview {
    let mut summary = StatusSummary::default();
    for service in system.services.values() {
        summary.record(service.status);
    }
    for component in components.values() {
        summary.record(component.status);
    }

    let status = HealthStatus::worst(
        std::iter::once(system.status).chain(components.values().map(|c| c.status)),
    );

    SystemOverview {
        status,
        timestamp: Utc::now(),
        system,
        components,
        summary,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use assert_matches::assert_matches;
    use async_trait::async_trait;

    use crate::models::ResourceUsage;
    use crate::services::FixedResourceSampler;

    struct FailingSampler;

    #[async_trait]
    impl ResourceSampler for FailingSampler {
        async fn sample(&self) -> Result<ResourceUsage> {
            anyhow::bail!("sysinfo unavailable")
        }
    }

    struct PanickingSampler;

    #[async_trait]
    impl ResourceSampler for PanickingSampler {
        async fn sample(&self) -> Result<ResourceUsage> {
            panic!("sampler exploded")
        }
    }

    fn config() -> MonitoringConfig {
        MonitoringConfig {
            services: vec!["document".to_string(), "export".to_string()],
            ..MonitoringConfig::default()
        }
    }

    fn monitor() -> Arc<MonitoringService> {
        MonitoringService::with_sampler(
            config(),
            Arc::new(FixedResourceSampler::new(ResourceUsage::new(40, 100, 10.0))),
        )
    }

    async fn record_calls(monitor: &MonitoringService, service: &str, total: usize, failing: usize) {
        for i in 0..total {
            let id = monitor.start_call(service, "run", None).await;
            if i < failing {
                monitor.end_call_with_error(&id, "boom").await;
            } else {
                monitor.end_call(&id).await;
            }
        }
    }

    #[tokio::test]
    async fn test_health_check_tick_records_history_and_publishes() {
        let monitor = monitor();
        let mut events = monitor.subscribe();
        record_calls(&monitor, "document", 4, 0).await;

        let health = monitor.run_health_check_tick().await.unwrap();
        assert_eq!(health.status, HealthStatus::Healthy);
        assert_eq!(monitor.get_metrics_history(None).await.len(), 1);
        assert_matches!(events.recv().await, Ok(MonitoringEvent::Health(_)));
    }

    #[tokio::test]
    async fn test_unhealthy_service_alerts_on_every_tick() {
        let monitor = monitor();
        record_calls(&monitor, "export", 10, 3).await;

        let health = monitor.run_health_check_tick().await.unwrap();
        assert_eq!(health.status, HealthStatus::Unhealthy);
        assert_eq!(health.services["export"].status, HealthStatus::Unhealthy);

        monitor.run_health_check_tick().await.unwrap();
        let export_alerts = monitor
            .get_active_alerts()
            .await
            .into_iter()
            .filter(|a| a.service.as_deref() == Some("export"))
            .count();
        assert_eq!(export_alerts, 2);
    }

    #[tokio::test]
    async fn test_alerting_disabled_skips_evaluation() {
        let monitor = MonitoringService::with_sampler(
            MonitoringConfig {
                enable_alerting: false,
                enable_metrics_collection: false,
                ..config()
            },
            Arc::new(FixedResourceSampler::new(ResourceUsage::new(99, 100, 99.0))),
        );
        record_calls(&monitor, "export", 4, 4).await;

        monitor.run_health_check_tick().await.unwrap();
        assert!(monitor.get_active_alerts().await.is_empty());
        assert!(monitor.get_metrics_history(None).await.is_empty());
    }

    #[tokio::test]
    async fn test_tick_failure_raises_critical_alert() {
        let monitor = MonitoringService::with_sampler(config(), Arc::new(FailingSampler));

        let result = monitor.run_health_check_tick().await;
        assert_matches!(result, Err(MonitoringError::HealthCheckFailed(_)));

        let alerts = monitor.get_active_alerts().await;
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert!(alerts[0].message.starts_with("Critical system failure"));
        assert_matches!(&alerts[0].metadata, Some(AlertContext::Failure { error }) if error.contains("sysinfo unavailable"));

        // Queries still answer with zeroed resources.
        let health = monitor.get_system_health().await;
        assert_eq!(health.metrics.resources, ResourceUsage::default());
    }

    #[tokio::test]
    async fn test_tick_panic_is_contained() {
        let monitor = MonitoringService::with_sampler(config(), Arc::new(PanickingSampler));

        let result = monitor.run_health_check_tick().await;
        assert_matches!(result, Err(MonitoringError::HealthCheckFailed(reason)) if reason.contains("sampler exploded"));
        assert_eq!(monitor.get_active_alerts().await[0].level, AlertLevel::Critical);
    }

    #[tokio::test]
    async fn test_overview_includes_components() {
        let monitor = monitor();
        record_calls(&monitor, "document", 2, 0).await;
        monitor
            .register_component_health_check("database", || async {
                anyhow::Ok(ComponentHealth::degraded("replica lag"))
            })
            .await;
        monitor
            .register_component_health_check("cache", || async {
                Err::<ComponentHealth, _>(anyhow::anyhow!("connection refused"))
            })
            .await;

        let overview = monitor.get_system_overview().await;
        assert_eq!(overview.status, HealthStatus::Degraded);
        assert_eq!(overview.summary.healthy, 1);
        assert_eq!(overview.summary.degraded, 1);
        assert_eq!(overview.summary.unknown, 2);
        assert_eq!(overview.components["cache"].status, HealthStatus::Unknown);
        assert!(overview.components["cache"].issues[0].contains("connection refused"));
    }

    #[tokio::test]
    async fn test_real_time_metrics_use_fresh_snapshot() {
        let monitor = monitor();
        record_calls(&monitor, "document", 5, 5).await;
        record_calls(&monitor, "export", 5, 5).await;
        monitor.track_request();

        let realtime = monitor.get_real_time_metrics().await;
        assert_eq!(realtime.status, HealthStatus::Unhealthy);
        assert_eq!(realtime.total_requests, 1);
        assert!(realtime.critical_failures.cascading_failures);
        assert!(realtime.components.is_empty());
    }

    #[tokio::test]
    async fn test_comprehensive_data_reports_insights() {
        let monitor = monitor();
        record_calls(&monitor, "export", 10, 3).await;
        monitor.run_health_check_tick().await.unwrap();

        let data = monitor.get_comprehensive_monitoring_data().await;
        assert_eq!(data.history_samples, 1);
        assert_eq!(data.metrics.len(), 1);
        assert!(!data.active_alerts.is_empty());
        assert!(data.critical_failures.has(crate::models::FailureKind::ServiceUnavailability));
        assert!(data
            .insights
            .bottlenecks
            .iter()
            .any(|b| b.target == "export"));
    }

    #[tokio::test]
    async fn test_reset_clears_all_state() {
        let monitor = monitor();
        record_calls(&monitor, "export", 10, 3).await;
        monitor.track_session("s-1", SessionEvent::Start).await;
        monitor.run_health_check_tick().await.unwrap();

        monitor.reset().await;

        assert!(monitor.get_all_metrics().await.is_empty());
        assert!(monitor.get_call_history(None).await.is_empty());
        assert!(monitor.get_all_alerts(None).await.is_empty());
        assert!(monitor.get_metrics_history(None).await.is_empty());
        assert_eq!(monitor.get_system_health().await.metrics.active_sessions, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_reset_racing_health_check_leaves_no_stale_state() {
        let monitor = monitor();

        for i in 0..200 {
            record_calls(&monitor, "export", 5, 5).await;

            let ticking = Arc::clone(&monitor);
            let tick = tokio::spawn(async move { ticking.run_health_check_tick().await });
            for _ in 0..(i % 40) {
                tokio::task::yield_now().await;
            }
            monitor.reset().await;
            tick.await.unwrap().unwrap();

            // A check either finished before the reset or saw an empty tracker.
            assert!(monitor.get_all_metrics().await.is_empty());
            assert!(monitor.get_all_alerts(None).await.is_empty(), "stale alert on iteration {i}");
            assert!(monitor
                .get_metrics_history(None)
                .await
                .iter()
                .all(|snapshot| snapshot.failed_calls == 0));

            monitor.reset().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_tick_publishes_overview() {
        let monitor = monitor();
        let mut events = monitor.subscribe();
        record_calls(&monitor, "document", 3, 0).await;

        monitor.start().await;
        tokio::time::sleep(monitor.config().dashboard_refresh_interval + Duration::from_secs(1)).await;
        monitor.stop().await;

        let mut dashboards = 0;
        while let Ok(event) = events.try_recv() {
            if let MonitoringEvent::Dashboard(overview) = event {
                assert_eq!(overview.system.services["document"].status, HealthStatus::Healthy);
                dashboards += 1;
            }
        }
        assert!(dashboards >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dashboard_disabled_spawns_no_refresh() {
        let monitor = MonitoringService::with_sampler(
            MonitoringConfig {
                enable_dashboard: false,
                ..config()
            },
            Arc::new(FixedResourceSampler::new(ResourceUsage::new(40, 100, 10.0))),
        );
        let mut events = monitor.subscribe();

        monitor.start().await;
        assert_eq!(monitor.tasks.lock().await.len(), 2);
        tokio::time::sleep(Duration::from_secs(15)).await;
        monitor.stop().await;

        while let Ok(event) = events.try_recv() {
            assert!(!matches!(event, MonitoringEvent::Dashboard(_)));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_service_poll_fills_component_cache() {
        let monitor = monitor();
        monitor
            .register_component_health_check("queue", || async {
                anyhow::Ok(ComponentHealth::degraded("backlog growing"))
            })
            .await;
        assert!(monitor.get_real_time_metrics().await.components.is_empty());

        monitor.start().await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        let realtime = monitor.get_real_time_metrics().await;
        assert_eq!(realtime.components["queue"].status, HealthStatus::Degraded);
        assert_eq!(realtime.status, HealthStatus::Degraded);
        monitor.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_is_idempotent_and_stop_halts_ticks() {
        let monitor = monitor();
        monitor.start().await;
        monitor.start().await;
        assert!(monitor.is_running().await);
        assert_eq!(monitor.tasks.lock().await.len(), 3);

        tokio::time::sleep(Duration::from_secs(61)).await;
        let recorded = monitor.get_metrics_history(None).await.len();
        assert!(recorded >= 2);

        monitor.stop().await;
        monitor.stop().await;
        assert!(!monitor.is_running().await);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(monitor.get_metrics_history(None).await.len(), recorded);
    }
}
