// =====================================================================================
// COMPONENT HEALTH PROBES
// =====================================================================================

use std::any::Any;
use std::collections::BTreeMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use futures::FutureExt;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::models::ComponentHealth;

/// Probe for one named component (database, cache, an upstream API...).
#[async_trait]
pub trait ComponentHealthCheck: Send + Sync {
    async fn check(&self) -> Result<ComponentHealth>;
}

#[async_trait]
impl<F, Fut> ComponentHealthCheck for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<ComponentHealth>> + Send + 'static,
{
    async fn check(&self) -> Result<ComponentHealth> {
        (self)().await
    }
}

/// Registered probes plus the results of the most recent run.
pub struct ComponentRegistry {
    checks: RwLock<BTreeMap<String, Arc<dyn ComponentHealthCheck>>>,
    cache: RwLock<BTreeMap<String, ComponentHealth>>,
    timeout: Duration,
}

impl ComponentRegistry {
    pub fn new(timeout: Duration) -> Self {
        Self {
            checks: RwLock::new(BTreeMap::new()),
            cache: RwLock::new(BTreeMap::new()),
            timeout,
        }
    }

    /// Registering an existing name replaces its probe.
    pub async fn register(&self, name: &str, check: impl ComponentHealthCheck + 'static) {
        let replaced = self
            .checks
            .write()
            .await
            .insert(name.to_string(), Arc::new(check))
            .is_some();
        debug!(component = name, replaced, "Component health check registered");
    }

    /// Runs every probe concurrently and refreshes the cache with the results.
    pub async fn run_all(&self) -> BTreeMap<String, ComponentHealth> {
        let checks: Vec<(String, Arc<dyn ComponentHealthCheck>)> = self
            .checks
            .read()
            .await
            .iter()
            .map(|(name, check)| (name.clone(), Arc::clone(check)))
            .collect();

        let results: BTreeMap<String, ComponentHealth> =
            join_all(checks.into_iter().map(|(name, check)| probe(name, check, self.timeout)))
                .await
                .into_iter()
                .collect();

        *self.cache.write().await = results.clone();
        results
    }

    pub async fn cached(&self) -> BTreeMap<String, ComponentHealth> {
        self.cache.read().await.clone()
    }
}

async fn probe(
    name: String,
    check: Arc<dyn ComponentHealthCheck>,
    limit: Duration,
) -> (String, ComponentHealth) {
    let started = Instant::now();
    let outcome = tokio::time::timeout(limit, AssertUnwindSafe(check.check()).catch_unwind()).await;

    let mut health = match outcome {
        Ok(Ok(Ok(health))) => health,
        Ok(Ok(Err(e))) => {
            warn!(component = %name, error = %e, "Component health check failed");
            ComponentHealth::unknown(format!("Health check failed: {e}"))
        }
        Ok(Err(panic)) => {
            let reason = panic_message(panic.as_ref());
            warn!(component = %name, reason = %reason, "Component health check panicked");
            ComponentHealth::unknown(format!("Health check panicked: {reason}"))
        }
        Err(_) => {
            warn!(component = %name, timeout_ms = limit.as_millis() as u64, "Component health check timed out");
            ComponentHealth::unknown(format!("Health check timed out after {}ms", limit.as_millis()))
        }
    };

    health.response_time_ms = started.elapsed().as_millis() as u64;
    health.last_check = Utc::now();
    (name, health)
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
