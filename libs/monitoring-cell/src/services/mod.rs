pub mod alerts;
pub mod components;
pub mod coordinator;
pub mod health;
pub mod history;
pub mod insights;
pub mod metrics;
pub mod notifier;
pub mod tracker;

pub use alerts::AlertManager;
pub use components::{ComponentHealthCheck, ComponentRegistry};
pub use coordinator::MonitoringService;
pub use health::{
    classify, system_status, FixedResourceSampler, HealthEvaluator, ResourceSampler,
    SysinfoSampler, HOST_SAMPLE_PERIOD,
};
pub use history::{critical_failure_indicators, trend_status, HistoryStore};
pub use metrics::MetricsAggregator;
pub use notifier::{AlertNotifier, LogNotifier, WebhookNotifier};
pub use tracker::CallTracker;
