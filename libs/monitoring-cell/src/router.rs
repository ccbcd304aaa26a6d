// =====================================================================================
// MONITORING CELL ROUTER
// =====================================================================================

use axum::{
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use crate::handlers::{
    get_active_calls, get_alert_summary, get_alerts, get_all_metrics, get_call_history,
    get_comprehensive_data, get_critical_failures, get_health_trends, get_metrics_history,
    get_real_time_metrics, get_service_metrics, get_system_health, get_system_overview,
    reset_monitoring, resolve_alert, MonitoringHandlers,
};
use crate::services::MonitoringService;

pub fn create_monitoring_router(monitor: Arc<MonitoringService>) -> Router {
    let handlers = Arc::new(MonitoringHandlers::new(monitor));

    // Read-only dashboards and probes
    let public_routes = Router::new()
        .route("/health", get(get_system_health))
        .route("/overview", get(get_system_overview))
        .route("/metrics", get(get_all_metrics))
        .route("/metrics/{service}", get(get_service_metrics))
        .route("/calls/active", get(get_active_calls))
        .route("/calls/history", get(get_call_history))
        .route("/alerts", get(get_alerts))
        .route("/alerts/summary", get(get_alert_summary))
        .route("/history", get(get_metrics_history))
        .route("/trends", get(get_health_trends))
        .route("/critical", get(get_critical_failures))
        .route("/comprehensive", get(get_comprehensive_data))
        .route("/realtime", get(get_real_time_metrics))
        .layer(CorsLayer::permissive())
        .with_state(handlers.clone());

    // Mutating operations
    let admin_routes = Router::new()
        .route("/alerts/{id}/resolve", patch(resolve_alert))
        .route("/reset", post(reset_monitoring))
        .with_state(handlers);

    Router::new()
        .merge(public_routes)
        .merge(admin_routes)
}
