use std::sync::Arc;

use axum::{middleware, routing::get, Router};

use monitoring_cell::{create_monitoring_router, track_requests, MonitoringService};

pub fn create_router(monitor: Arc<MonitoringService>) -> Router {
    Router::new()
        .route("/", get(|| async { "VoxDoc API is running!" }))
        .nest("/monitoring", create_monitoring_router(monitor.clone()))
        .layer(middleware::from_fn_with_state(monitor, track_requests))
}
