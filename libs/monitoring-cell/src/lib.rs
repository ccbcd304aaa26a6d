// =====================================================================================
// MONITORING CELL - SERVICE TELEMETRY, HEALTH & ALERTING
// =====================================================================================
//
// This cell provides in-process monitoring for the platform services:
// - Call tracking with per-service / per-method metrics
// - Periodic health evaluation against configurable thresholds
// - Alert management with log or webhook delivery
// - Retained metrics history, trends and critical-failure detection
//
// =====================================================================================

pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

// Re-export commonly used types
pub use models::{
    Alert, AlertContext, AlertLevel, CallId, CallMetadata, ComponentHealth, HealthStatus,
    MonitoringError, MonitoringEvent, ServiceMetrics, SessionEvent, SystemHealth, SystemMetrics,
};

pub use services::{
    AlertNotifier, ComponentHealthCheck, MonitoringService, ResourceSampler,
};

pub use handlers::{track_requests, MonitoringHandlers};
pub use router::create_monitoring_router;
