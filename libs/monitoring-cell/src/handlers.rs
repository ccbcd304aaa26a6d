// =====================================================================================
// MONITORING CELL HANDLERS
// =====================================================================================

use axum::{
    extract::{Path, Query, Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::models::{
    AlertsQuery, HealthStatus, HoursQuery, LimitQuery, MonitoringError, ResolveAlertResponse,
    ServiceMetricsQuery,
};
use crate::services::MonitoringService;

const DEFAULT_TREND_HOURS: f64 = 24.0;

pub struct MonitoringHandlers {
    monitor: Arc<MonitoringService>,
}

impl MonitoringHandlers {
    pub fn new(monitor: Arc<MonitoringService>) -> Self {
        Self { monitor }
    }

    pub fn monitor(&self) -> &Arc<MonitoringService> {
        &self.monitor
    }
}

/// HTTP status reported for an aggregate health status.
pub fn status_code_for(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Degraded | HealthStatus::Unknown => StatusCode::PARTIAL_CONTENT,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}

// =====================================================================================
// HEALTH ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn get_system_health(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    let health = handlers.monitor.get_system_health().await;
    (status_code_for(health.status), Json(health))
}

#[instrument(skip(handlers))]
pub async fn get_system_overview(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    let overview = handlers.monitor.get_system_overview().await;
    (status_code_for(overview.status), Json(overview))
}

pub async fn get_critical_failures(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_critical_failure_indicators().await)
}

pub async fn get_comprehensive_data(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_comprehensive_monitoring_data().await)
}

pub async fn get_real_time_metrics(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_real_time_metrics().await)
}

// =====================================================================================
// METRICS & CALL ENDPOINTS
// =====================================================================================

pub async fn get_all_metrics(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_all_metrics().await)
}

#[instrument(skip(handlers))]
pub async fn get_service_metrics(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(service): Path<String>,
    Query(query): Query<ServiceMetricsQuery>,
) -> impl IntoResponse {
    Json(
        handlers
            .monitor
            .get_service_metrics(&service, query.method.as_deref())
            .await,
    )
}

pub async fn get_active_calls(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_active_calls().await)
}

pub async fn get_call_history(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(handlers.monitor.get_call_history(query.limit).await)
}

pub async fn get_metrics_history(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    Json(handlers.monitor.get_metrics_history(query.hours).await)
}

pub async fn get_health_trends(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<HoursQuery>,
) -> impl IntoResponse {
    let hours = query.hours.unwrap_or(DEFAULT_TREND_HOURS);
    Json(handlers.monitor.get_health_trends(hours).await)
}

// =====================================================================================
// ALERT ENDPOINTS
// =====================================================================================

pub async fn get_alerts(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Query(query): Query<AlertsQuery>,
) -> impl IntoResponse {
    let alerts = if query.active_only.unwrap_or(false) {
        let mut active = handlers.monitor.get_active_alerts().await;
        if let Some(limit) = query.limit {
            active.truncate(limit);
        }
        active
    } else {
        handlers.monitor.get_all_alerts(query.limit).await
    };

    Json(alerts)
}

pub async fn get_alert_summary(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    Json(handlers.monitor.get_alert_summary().await)
}

#[instrument(skip(handlers))]
pub async fn resolve_alert(
    State(handlers): State<Arc<MonitoringHandlers>>,
    Path(alert_id): Path<String>,
) -> Result<Json<ResolveAlertResponse>, MonitoringError> {
    if !handlers.monitor.resolve_alert(&alert_id).await {
        return Err(MonitoringError::AlertNotFound(alert_id));
    }

    Ok(Json(ResolveAlertResponse {
        alert_id,
        resolved: true,
    }))
}

// =====================================================================================
// ADMIN ENDPOINTS
// =====================================================================================

#[instrument(skip(handlers))]
pub async fn reset_monitoring(State(handlers): State<Arc<MonitoringHandlers>>) -> impl IntoResponse {
    handlers.monitor.reset().await;
    info!("Monitoring data reset via API");

    Json(serde_json::json!({
        "reset": true,
        "timestamp": chrono::Utc::now()
    }))
}

/// Counts every request passing through the layer.
pub async fn track_requests(
    State(monitor): State<Arc<MonitoringService>>,
    request: Request,
    next: Next,
) -> Response {
    monitor.track_request();
    next.run(request).await
}

impl IntoResponse for MonitoringError {
    fn into_response(self) -> Response {
        let status = match &self {
            MonitoringError::HealthCheckFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            MonitoringError::AlertNotFound(_) => StatusCode::NOT_FOUND,
            MonitoringError::ResourceSampling(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(serde_json::json!({
            "error": self.to_string(),
            "timestamp": chrono::Utc::now()
        }))).into_response()
    }
}
