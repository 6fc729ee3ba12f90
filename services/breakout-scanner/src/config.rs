//! Scanner configuration
//!
//! Scan-mode parameter sets, filter thresholds for the universe ranker and
//! the service settings loaded from `scanner.toml` / `SCANNER__*` env vars.

use std::collections::HashSet;
use std::path::Path;

use anyhow::Context;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::alerts::DEFAULT_TEMPLATE;
use crate::types::{Granularity, Result, ScanError};

/// Named scan modes
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    #[default]
    Fast,
    Medium,
    Slow,
    Custom,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Fast => "fast",
            ScanMode::Medium => "medium",
            ScanMode::Slow => "slow",
            ScanMode::Custom => "custom",
        }
    }
}

/// Window size and thresholds for one breakout rule
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ScanModeConfig {
    pub name: String,
    /// Candles in the evaluation window, including the breakout candle
    pub candle_count: usize,
    /// Fractional margin over the prior max high (0.013 = 1.3%)
    pub breakout_threshold: f64,
    /// Required multiple of the prior average volume
    pub volume_spike_ratio: f64,
}

impl ScanModeConfig {
    pub fn new(
        name: impl Into<String>,
        candle_count: usize,
        breakout_threshold: f64,
        volume_spike_ratio: f64,
    ) -> Self {
        Self {
            name: name.into(),
            candle_count,
            breakout_threshold,
            volume_spike_ratio,
        }
    }

    pub fn fast() -> Self {
        Self::new("fast", 10, 0.013, 1.3)
    }

    pub fn medium() -> Self {
        Self::new("medium", 15, 0.018, 1.7)
    }

    pub fn slow() -> Self {
        Self::new("slow", 20, 0.024, 2.2)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ScanError::InvalidConfig("scan mode name is empty".to_string()));
        }
        if self.candle_count < 2 {
            return Err(ScanError::InvalidConfig(format!(
                "scan mode {}: candle_count must be >= 2, got {}",
                self.name, self.candle_count
            )));
        }
        if !self.breakout_threshold.is_finite() || self.breakout_threshold < 0.0 {
            return Err(ScanError::InvalidConfig(format!(
                "scan mode {}: breakout_threshold must be a non-negative number",
                self.name
            )));
        }
        if !self.volume_spike_ratio.is_finite() || self.volume_spike_ratio < 1.0 {
            return Err(ScanError::InvalidConfig(format!(
                "scan mode {}: volume_spike_ratio must be >= 1.0, got {}",
                self.name, self.volume_spike_ratio
            )));
        }
        Ok(())
    }
}

/// Built-in modes in evaluation order
pub fn builtin_modes() -> Vec<ScanModeConfig> {
    vec![
        ScanModeConfig::fast(),
        ScanModeConfig::medium(),
        ScanModeConfig::slow(),
    ]
}

/// Scan loop settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ScannerConfig {
    pub scan_mode: ScanMode,
    /// Parameters used when `scan_mode` is `custom`
    pub custom_mode: Option<ScanModeConfig>,
    /// Minimum dollar volume of the breakout candle
    pub min_volume_usd: f64,
    /// Pause between full passes over the universe
    pub cycle_delay_ms: u64,
    pub granularity_sec: u32,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            scan_mode: ScanMode::Fast,
            custom_mode: None,
            min_volume_usd: 2000.0,
            cycle_delay_ms: 2000,
            granularity_sec: 60,
        }
    }
}

impl ScannerConfig {
    /// Parameters of the selected mode
    pub fn active_mode(&self) -> Result<ScanModeConfig> {
        match self.scan_mode {
            ScanMode::Fast => Ok(ScanModeConfig::fast()),
            ScanMode::Medium => Ok(ScanModeConfig::medium()),
            ScanMode::Slow => Ok(ScanModeConfig::slow()),
            ScanMode::Custom => self.custom_mode.clone().ok_or_else(|| {
                ScanError::InvalidConfig("scan_mode is custom but custom_mode is missing".to_string())
            }),
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.active_mode()?.validate()?;
        if !self.min_volume_usd.is_finite() || self.min_volume_usd < 0.0 {
            return Err(ScanError::InvalidConfig(
                "min_volume_usd must be a non-negative number".to_string(),
            ));
        }
        if Granularity::from_seconds(self.granularity_sec).is_none() {
            return Err(ScanError::InvalidConfig(format!(
                "unsupported granularity: {}s",
                self.granularity_sec
            )));
        }
        Ok(())
    }
}

/// Universe ranker settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RankerConfig {
    pub top_n: usize,
    pub granularity_sec: u32,
    pub lookback_min: u32,
    pub min_usd_per_min: f64,
    /// Maximum relative L1 spread (0.005 = 0.5%)
    pub max_spread_pct: f64,
    pub min_price_usd: f64,
    /// Base assets never ranked (stablecoins)
    pub exclude_bases: HashSet<String>,
    pub quote_currency: String,
    /// Pause after this many candidates
    pub pace_every: usize,
    pub pace_delay_ms: u64,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            top_n: 50,
            granularity_sec: 60,
            lookback_min: 45,
            min_usd_per_min: 2000.0,
            max_spread_pct: 0.5 / 100.0,
            min_price_usd: 0.0001,
            exclude_bases: ["USDC", "DAI", "USDT", "PYUSD"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            quote_currency: "USD".to_string(),
            pace_every: 10,
            pace_delay_ms: 500,
        }
    }
}

impl RankerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(ScanError::InvalidConfig("top_n must be > 0".to_string()));
        }
        if Granularity::from_seconds(self.granularity_sec).is_none() {
            return Err(ScanError::InvalidConfig(format!(
                "unsupported granularity: {}s",
                self.granularity_sec
            )));
        }
        if self.lookback_min == 0 {
            return Err(ScanError::InvalidConfig("lookback_min must be > 0".to_string()));
        }
        for (name, value) in [
            ("min_usd_per_min", self.min_usd_per_min),
            ("max_spread_pct", self.max_spread_pct),
            ("min_price_usd", self.min_price_usd),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ScanError::InvalidConfig(format!(
                    "{} must be a non-negative number",
                    name
                )));
            }
        }
        if self.pace_every == 0 {
            return Err(ScanError::InvalidConfig("pace_every must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn is_excluded(&self, base: &str) -> bool {
        self.exclude_bases
            .iter()
            .any(|b| b.eq_ignore_ascii_case(base))
    }
}

/// Alert delivery settings
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AlertSettings {
    pub discord_webhook_url: Option<String>,
    /// Endpoint that records alerts durably (POST JSON)
    pub record_url: Option<String>,
    pub template: String,
    pub timeout_secs: u64,
}

impl Default for AlertSettings {
    fn default() -> Self {
        Self {
            discord_webhook_url: None,
            record_url: None,
            template: DEFAULT_TEMPLATE.to_string(),
            timeout_secs: 10,
        }
    }
}

impl AlertSettings {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(ScanError::InvalidConfig(
                "timeout_secs must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CoinbaseSettings {
    pub base_url: String,
}

impl Default for CoinbaseSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.exchange.coinbase.com".to_string(),
        }
    }
}

/// Service configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scanner: ScannerConfig,
    pub ranker: RankerConfig,
    pub alerts: AlertSettings,
    pub coinbase: CoinbaseSettings,
    /// Fixed scan universe; the ranked shortlist is used when empty
    pub pairs: Vec<String>,
    pub port: u16,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            scanner: ScannerConfig::default(),
            ranker: RankerConfig::default(),
            alerts: AlertSettings::default(),
            coinbase: CoinbaseSettings::default(),
            pairs: Vec::new(),
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load defaults, then the optional config file, then `SCANNER__*` overrides
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = path.unwrap_or(Path::new("scanner.toml"));
        if file.exists() {
            info!("Loading scanner config: {:?}", file);
        }

        let config = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(
                Environment::with_prefix("SCANNER")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("pairs")
                    .with_list_parse_key("ranker.exclude_bases")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.scanner.validate().context("invalid [scanner] section")?;
        self.ranker.validate().context("invalid [ranker] section")?;
        self.alerts.validate().context("invalid [alerts] section")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_modes() {
        let modes = builtin_modes();
        let names: Vec<_> = modes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["fast", "medium", "slow"]);
        assert_eq!(modes[1].candle_count, 15);
        assert_eq!(modes[2].volume_spike_ratio, 2.2);
        for mode in &modes {
            mode.validate().unwrap();
        }
    }

    #[test]
    fn test_invalid_mode_rejected() {
        assert!(ScanModeConfig::new("tiny", 1, 0.01, 1.5).validate().is_err());
        assert!(ScanModeConfig::new("weak", 10, 0.01, 0.9).validate().is_err());
        assert!(ScanModeConfig::new("nan", 10, f64::NAN, 1.5).validate().is_err());
    }

    #[test]
    fn test_custom_mode_requires_params() {
        let mut config = ScannerConfig {
            scan_mode: ScanMode::Custom,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.custom_mode = Some(ScanModeConfig::new("custom", 12, 0.01, 1.5));
        config.validate().unwrap();
        assert_eq!(config.active_mode().unwrap().candle_count, 12);
    }

    #[test]
    fn test_ranker_defaults() {
        let config = RankerConfig::default();
        config.validate().unwrap();
        assert!(config.is_excluded("usdc"));
        assert!(!config.is_excluded("BTC"));
        assert!((config.max_spread_pct - 0.005).abs() < 1e-12);

        let bad = RankerConfig {
            top_n: 0,
            ..Default::default()
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_zero_alert_timeout_rejected() {
        AlertSettings::default().validate().unwrap();

        let app = AppConfig {
            alerts: AlertSettings {
                timeout_secs: 0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(app.alerts.validate().is_err());
        assert!(app.validate().is_err());
    }

    #[test]
    fn test_load_without_file_uses_defaults() {
        let config = AppConfig::load(Some(Path::new("does-not-exist.toml"))).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.scanner.scan_mode, ScanMode::Fast);
        assert_eq!(config.ranker.top_n, 50);
    }
}
