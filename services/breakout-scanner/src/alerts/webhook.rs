//! Webhook delivery for breakout alerts

use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error};

use super::{build_rich_message, AlertSink};
use crate::breakout::BreakoutResult;
use crate::config::AlertSettings;
use crate::types::{Result, ScanError};

/// Alert record posted to the recording endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertRecord {
    pub symbol: String,
    pub price: f64,
    pub percent_change: f64,
    pub band_width: f64,
    pub volume_ratio: f64,
    pub scan_mode: String,
}

impl AlertRecord {
    pub fn from_result(result: &BreakoutResult) -> Option<Self> {
        let details = result.details.as_ref()?;
        Some(Self {
            symbol: result.symbol.clone(),
            price: details.price,
            percent_change: details.percent_change,
            band_width: details.band_width,
            volume_ratio: details.volume_ratio,
            scan_mode: details.scan_mode.clone(),
        })
    }
}

/// Posts breakouts to a Discord webhook and/or a recording endpoint
#[derive(Clone)]
pub struct WebhookAlertSink {
    discord_webhook_url: Option<String>,
    record_url: Option<String>,
    client: Client,
}

impl WebhookAlertSink {
    pub fn new(settings: &AlertSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()
            .map_err(|e| ScanError::ApiError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            discord_webhook_url: settings.discord_webhook_url.clone(),
            record_url: settings.record_url.clone(),
            client,
        })
    }

    /// Whether any destination is configured
    pub fn is_configured(&self) -> bool {
        self.discord_webhook_url.is_some() || self.record_url.is_some()
    }

    async fn send_discord_alert(&self, webhook_url: &str, result: &BreakoutResult) -> Result<()> {
        let payload = serde_json::json!({
            "content": build_rich_message(result, chrono::Utc::now()),
            "username": "Breakout Scanner",
        });

        self.post_json(webhook_url, &payload).await?;
        debug!(symbol = %result.symbol, "Discord alert sent");
        Ok(())
    }

    async fn send_record(&self, record_url: &str, record: &AlertRecord) -> Result<()> {
        self.post_json(record_url, record).await?;
        debug!(symbol = %record.symbol, "Alert recorded");
        Ok(())
    }

    async fn post_json<T: Serialize + ?Sized>(&self, url: &str, payload: &T) -> Result<()> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| ScanError::AlertDelivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ScanError::AlertDelivery(format!(
                "webhook failed: {} - {}",
                status, body
            )));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    /// Every destination is attempted; the first failure is returned
    async fn deliver(&self, result: &BreakoutResult) -> Result<()> {
        let Some(record) = AlertRecord::from_result(result) else {
            return Ok(());
        };

        let mut first_error = None;

        if let Some(ref url) = self.record_url {
            if let Err(e) = self.send_record(url, &record).await {
                error!("Failed to record alert for {}: {}", record.symbol, e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(ref url) = self.discord_webhook_url {
            if let Err(e) = self.send_discord_alert(url, result).await {
                error!("Failed to send Discord alert for {}: {}", record.symbol, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }
}
