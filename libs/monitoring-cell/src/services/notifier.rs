// =====================================================================================
// ALERT DELIVERY
// =====================================================================================

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::models::{Alert, AlertLevel};

/// Collaborator that forwards alerts out of the process.
#[async_trait]
pub trait AlertNotifier: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the tracing sink only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl AlertNotifier for LogNotifier {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        match alert.level {
            AlertLevel::Critical | AlertLevel::Error => {
                error!(
                    alert_id = %alert.id,
                    level = %alert.level,
                    service = ?alert.service,
                    "ALERT: {}", alert.message
                );
            }
            AlertLevel::Warning => {
                warn!(
                    alert_id = %alert.id,
                    service = ?alert.service,
                    "ALERT: {}", alert.message
                );
            }
            AlertLevel::Info => {
                info!(alert_id = %alert.id, "ALERT: {}", alert.message);
            }
        }
        Ok(())
    }
}

/// POSTs each alert as JSON to a webhook endpoint.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build webhook client")?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl AlertNotifier for WebhookNotifier {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(alert)
            .send()
            .await
            .with_context(|| format!("failed to send alert {} to webhook", alert.id))?;

        if !response.status().is_success() {
            anyhow::bail!(
                "webhook rejected alert {} with status {}",
                alert.id,
                response.status()
            );
        }

        Ok(())
    }
}
