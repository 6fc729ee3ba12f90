//! Breakout alert dispatch
//!
//! Sinks receive every confirmed breakout once per pass. Delivery failures
//! are reported to the caller, which logs them and moves on.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::breakout::BreakoutResult;
use crate::types::Result;

pub mod webhook;

pub use webhook::WebhookAlertSink;

pub const DEFAULT_TEMPLATE: &str =
    "🚨 BREAKOUT: {{symbol}} at ${{price}} | +{{change}}% | Vol: {{volume}}x";

/// Receives confirmed breakouts for recording or notification
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, result: &BreakoutResult) -> Result<()>;

    fn name(&self) -> &str;
}

/// Writes each breakout as a structured log event
#[derive(Debug, Clone)]
pub struct LogAlertSink {
    template: String,
}

impl LogAlertSink {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl Default for LogAlertSink {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

#[async_trait::async_trait]
impl AlertSink for LogAlertSink {
    async fn deliver(&self, result: &BreakoutResult) -> Result<()> {
        let Some(details) = &result.details else {
            return Ok(());
        };

        info!(
            symbol = %result.symbol,
            price = details.price,
            percent_change = details.percent_change,
            volume_ratio = details.volume_ratio,
            modes = %details.modes.join(","),
            message = %format_alert_message(&self.template, result),
            "BREAKOUT"
        );
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

/// Fill template placeholders from a breakout. Empty for a non-breakout.
///
/// Supported: `{{symbol}} {{price}} {{change}} {{volume}} {{modes}} {{bandWidth}}`
pub fn format_alert_message(template: &str, result: &BreakoutResult) -> String {
    let Some(details) = &result.details else {
        return String::new();
    };

    template
        .replace("{{symbol}}", &result.symbol)
        .replace("{{price}}", &format!("{:.8}", details.price))
        .replace("{{change}}", &format!("{:.2}", details.percent_change))
        .replace("{{volume}}", &format!("{:.1}", details.volume_ratio))
        .replace("{{modes}}", &details.modes.join(", "))
        .replace("{{bandWidth}}", &format!("{:.2}", details.band_width))
}

/// Multi-line markdown message for chat webhooks
pub fn build_rich_message(result: &BreakoutResult, at: DateTime<Utc>) -> String {
    let Some(details) = &result.details else {
        return String::new();
    };

    let modes = details
        .modes
        .iter()
        .map(|m| format!("`{}`", m))
        .collect::<Vec<_>>()
        .join(", ");

    [
        "🚨 **BREAKOUT DETECTED** 🚨".to_string(),
        format!("**Pair**: `{}`", result.symbol),
        format!("**Price**: `${:.8}`", details.price),
        format!(
            "**Δ**: `{:.2}%`  |  **W**: `{:.2}%`",
            details.percent_change, details.band_width
        ),
        format!(
            "**Volume**: `{:.1}x` (`${:.0}K/min`)",
            details.volume_ratio,
            details.dollar_volume / 1000.0
        ),
        format!("**Modes**: {}", modes),
        format!("**Time**: {} UTC", at.format("%H:%M:%S")),
    ]
    .join("\n")
}
