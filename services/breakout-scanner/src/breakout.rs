//! Breakout Evaluator
//!
//! Detects momentum breakouts on the most recent candle of a series.
//! A mode fires when the last close clears the prior window's max high by
//! the mode's threshold, the last volume is a spike over the prior average,
//! and the candle carries enough dollar volume. Every built-in mode is
//! tested independently and all firing modes are reported.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{builtin_modes, ScanModeConfig};
use crate::types::Candle;

/// Minimum series length for any evaluation
pub const MIN_CANDLES: usize = 3;

/// Share of the required volume ratio that still counts as a potential breakout
pub const POTENTIAL_VOLUME_FACTOR: f64 = 0.7;

/// Outcome of evaluating one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakoutResult {
    pub symbol: String,
    pub is_breakout: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<BreakoutDetails>,
}

impl BreakoutResult {
    pub fn none(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            is_breakout: false,
            details: None,
        }
    }
}

/// Whole-series summary attached to a confirmed breakout
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BreakoutDetails {
    pub price: f64,
    pub percent_change: f64,
    pub band_width: f64,
    pub volume_ratio: f64,
    pub dollar_volume: f64,
    /// Every built-in mode that fired, in evaluation order
    pub modes: Vec<String>,
    /// Mode the scan was running in
    pub scan_mode: String,
}

/// Evaluates candle series against the built-in scan modes
#[derive(Debug, Clone)]
pub struct BreakoutEvaluator {
    modes: Vec<ScanModeConfig>,
    min_dollar_volume: f64,
}

impl BreakoutEvaluator {
    /// Evaluator over the built-in fast, medium and slow modes
    pub fn new(min_dollar_volume: f64) -> Self {
        Self::with_modes(builtin_modes(), min_dollar_volume)
    }

    /// Evaluator over caller-supplied modes, tested in the given order
    pub fn with_modes(modes: Vec<ScanModeConfig>, min_dollar_volume: f64) -> Self {
        Self {
            modes,
            min_dollar_volume,
        }
    }

    pub fn modes(&self) -> &[ScanModeConfig] {
        &self.modes
    }

    /// Evaluate the most recent candle of `candles` for `symbol`
    pub fn evaluate(&self, symbol: &str, candles: &[Candle], scan_mode: &str) -> BreakoutResult {
        if candles.len() < MIN_CANDLES {
            return BreakoutResult::none(symbol);
        }

        let modes: Vec<String> = self
            .modes
            .iter()
            .filter(|mode| test_mode(candles, mode, self.min_dollar_volume))
            .map(|mode| mode.name.clone())
            .collect();

        if modes.is_empty() {
            return BreakoutResult::none(symbol);
        }

        match summarize(candles) {
            Some(summary) => BreakoutResult {
                symbol: symbol.to_string(),
                is_breakout: true,
                details: Some(BreakoutDetails {
                    price: summary.price,
                    percent_change: summary.percent_change,
                    band_width: summary.band_width,
                    volume_ratio: summary.volume_ratio,
                    dollar_volume: summary.dollar_volume,
                    modes,
                    scan_mode: scan_mode.to_string(),
                }),
            },
            None => {
                tracing::debug!(symbol, "Degenerate series, breakout metrics not finite");
                BreakoutResult::none(symbol)
            }
        }
    }
}

/// Check one mode's rule against the trailing `mode.candle_count` candles
pub fn test_mode(candles: &[Candle], mode: &ScanModeConfig, min_dollar_volume: f64) -> bool {
    let window_size = mode.candle_count;
    if window_size < 2 || candles.len() < window_size {
        return false;
    }

    let window = &candles[candles.len() - window_size..];
    let (prior, last) = window.split_at(window_size - 1);
    let last = &last[0];

    let max_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let avg_volume = prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64;
    let dollar_volume = last.dollar_volume();

    if !max_high.is_finite() || !avg_volume.is_finite() || !dollar_volume.is_finite() {
        return false;
    }

    let price_breakout = last.close > max_high * (1.0 + mode.breakout_threshold);
    // Zero average volume makes the spike ratio undefined; treat as no spike
    let volume_breakout = avg_volume > 0.0 && last.volume > avg_volume * mode.volume_spike_ratio;
    let dollar_volume_check = dollar_volume >= min_dollar_volume;

    price_breakout && volume_breakout && dollar_volume_check
}

struct SeriesSummary {
    price: f64,
    percent_change: f64,
    band_width: f64,
    volume_ratio: f64,
    dollar_volume: f64,
}

/// Summary metrics over the full series; `None` if any value is non-finite
fn summarize(candles: &[Candle]) -> Option<SeriesSummary> {
    let first = candles.first()?;
    let last = candles.last()?;
    let prior = &candles[..candles.len() - 1];

    let percent_change = (last.close - first.close) / first.close * 100.0;

    let max_high = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let band_width = (max_high - min_low) / last.close * 100.0;

    let avg_volume = prior.iter().map(|c| c.volume).sum::<f64>() / prior.len() as f64;
    let volume_ratio = last.volume / avg_volume;

    let summary = SeriesSummary {
        price: last.close,
        percent_change,
        band_width,
        volume_ratio,
        dollar_volume: last.dollar_volume(),
    };

    [
        summary.price,
        summary.percent_change,
        summary.band_width,
        summary.volume_ratio,
        summary.dollar_volume,
    ]
    .iter()
    .all(|v| v.is_finite())
    .then_some(summary)
}

/// Chart classification of the last candle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    Confirmed,
    Potential,
}

/// Breakout marker for chart display. Never used for alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSignal {
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
    pub price: f64,
    pub percent_change: f64,
    pub volume_ratio: f64,
}

/// Classify the last candle as a confirmed or potential breakout.
///
/// `threshold_pct` is a percentage (1.3 = 1.3%). A potential breakout has
/// the price break but only `POTENTIAL_VOLUME_FACTOR` of the volume ratio.
/// Requires `lookback + 1` candles.
pub fn classify_signal(
    candles: &[Candle],
    lookback: usize,
    threshold_pct: f64,
    volume_ratio: f64,
) -> Option<BreakoutSignal> {
    if lookback < 2 || candles.len() < lookback + 1 {
        return None;
    }

    let recent = &candles[candles.len() - lookback..];
    let current = candles.last()?;
    let prior = &recent[..recent.len() - 1];

    let max_high = prior.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let avg_volume = prior.iter().map(|c| c.volume).sum::<f64>() / (lookback - 1) as f64;
    let current_ratio = current.volume / avg_volume;
    if !current_ratio.is_finite() {
        return None;
    }

    let price_breakout = current.close > max_high * (1.0 + threshold_pct / 100.0);
    let start_price = candles[candles.len() - lookback].close;
    let percent_change = (current.close - start_price) / start_price * 100.0;

    let kind = if price_breakout && current_ratio > volume_ratio {
        SignalKind::Confirmed
    } else if price_breakout && current_ratio > volume_ratio * POTENTIAL_VOLUME_FACTOR {
        SignalKind::Potential
    } else {
        return None;
    };

    Some(BreakoutSignal {
        kind,
        timestamp: current.timestamp,
        price: current.close,
        percent_change,
        volume_ratio: current_ratio,
    })
}

/// Display metrics over the trailing `lookback` candles
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TradingMetrics {
    pub current_price: f64,
    pub percent_change: f64,
    pub band_width: f64,
    pub volume_ratio: f64,
    pub dollar_volume: f64,
}

/// Zeroed metrics when fewer than `lookback` candles are available
pub fn trading_metrics(candles: &[Candle], lookback: usize) -> TradingMetrics {
    if lookback == 0 || candles.len() < lookback {
        return TradingMetrics::default();
    }

    let recent = &candles[candles.len() - lookback..];
    let current = &recent[recent.len() - 1];
    let start_price = recent[0].close;

    let max_high = recent.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
    let min_low = recent.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
    let avg_volume = recent.iter().map(|c| c.volume).sum::<f64>() / recent.len() as f64;

    TradingMetrics {
        current_price: current.close,
        percent_change: (current.close - start_price) / start_price * 100.0,
        band_width: (max_high - min_low) / current.close * 100.0,
        volume_ratio: current.volume / avg_volume,
        dollar_volume: current.dollar_volume(),
    }
}
