//! Coin Scorer
//!
//! Liquidity/volatility metrics over a candle window and the composite
//! score used to rank the pair universe. Volatility drives the score;
//! liquidity adds a bonus capped at 1.0.

use serde::{Deserialize, Serialize};

use crate::types::Candle;

/// Multiple of the liquidity floor at which the bonus saturates
const LIQUIDITY_BONUS_MULTIPLE: f64 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CandleMetrics {
    /// Mean of `volume * close` per candle
    pub avg_usd_per_min: f64,
    pub last_close: f64,
    /// Population stdev of close-to-close log returns
    pub ret_stdev: f64,
    /// `(max high - min low) / min low`
    pub range_pct: f64,
}

impl CandleMetrics {
    /// `None` for an empty window or when any metric is non-finite
    pub fn from_candles(candles: &[Candle]) -> Option<Self> {
        let last = candles.last()?;

        let avg_usd_per_min =
            candles.iter().map(Candle::dollar_volume).sum::<f64>() / candles.len() as f64;

        let returns: Vec<f64> = candles
            .windows(2)
            .filter(|pair| pair[0].close > 0.0)
            .map(|pair| (pair[1].close / pair[0].close).ln())
            .collect();
        let ret_stdev = population_stdev(&returns);

        let hi = candles.iter().map(|c| c.high).fold(f64::NEG_INFINITY, f64::max);
        let lo = candles.iter().map(|c| c.low).fold(f64::INFINITY, f64::min);
        let range_pct = if lo > 0.0 { (hi - lo) / lo } else { 0.0 };

        let metrics = Self {
            avg_usd_per_min,
            last_close: last.close,
            ret_stdev,
            range_pct,
        };
        metrics.is_finite().then_some(metrics)
    }

    fn is_finite(&self) -> bool {
        self.avg_usd_per_min.is_finite()
            && self.last_close.is_finite()
            && self.ret_stdev.is_finite()
            && self.range_pct.is_finite()
    }
}

/// 0 with fewer than two samples
fn population_stdev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    variance.sqrt()
}

/// Composite volatility + bounded liquidity score
#[derive(Debug, Clone, Copy)]
pub struct CoinScorer {
    min_usd_per_min: f64,
}

impl CoinScorer {
    pub fn new(min_usd_per_min: f64) -> Self {
        Self { min_usd_per_min }
    }

    pub fn score(&self, metrics: &CandleMetrics) -> f64 {
        let vol_score = metrics.ret_stdev * 10_000.0 + metrics.range_pct * 100.0;
        vol_score + self.liquidity_bonus(metrics.avg_usd_per_min)
    }

    fn liquidity_bonus(&self, avg_usd_per_min: f64) -> f64 {
        let floor = self.min_usd_per_min * LIQUIDITY_BONUS_MULTIPLE;
        if floor <= 0.0 {
            return 1.0;
        }
        (avg_usd_per_min / floor).min(1.0)
    }
}
