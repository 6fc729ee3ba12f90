//! Universe Ranker
//!
//! Filters the tradable pair universe down to a shortlist of liquid,
//! volatile pairs worth scanning.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::RankerConfig;
use crate::scoring::{CandleMetrics, CoinScorer};
use crate::types::{base_of, CandleSource, Clock, OrderBookSource, PairUniverse, Product, Result};

/// A candidate that passed every filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredCoin {
    pub product_id: String,
    pub score: f64,
    pub metrics: Option<CandleMetrics>,
    pub spread: Option<f64>,
}

/// Why a candidate was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    Excluded,
    Spread,
    NoCandles,
    MetricsFailed,
    PriceBelowMin,
    Illiquid,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::Excluded => "excluded base",
            SkipReason::Spread => "spread unavailable or too wide",
            SkipReason::NoCandles => "no candles",
            SkipReason::MetricsFailed => "metrics failed",
            SkipReason::PriceBelowMin => "price below minimum",
            SkipReason::Illiquid => "illiquid",
        };
        f.write_str(reason)
    }
}

pub struct UniverseRanker {
    universe: Arc<dyn PairUniverse>,
    books: Arc<dyn OrderBookSource>,
    candles: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    scorer: CoinScorer,
    config: RankerConfig,
}

impl UniverseRanker {
    pub fn new(
        universe: Arc<dyn PairUniverse>,
        books: Arc<dyn OrderBookSource>,
        candles: Arc<dyn CandleSource>,
        clock: Arc<dyn Clock>,
        config: RankerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            universe,
            books,
            candles,
            clock,
            scorer: CoinScorer::new(config.min_usd_per_min),
            config,
        })
    }

    pub fn config(&self) -> &RankerConfig {
        &self.config
    }

    /// Tradable products minus excluded bases
    pub async fn tradable_pairs(&self) -> Result<Vec<Product>> {
        let products = self
            .universe
            .list_tradable_pairs(&self.config.quote_currency)
            .await?;

        Ok(products
            .into_iter()
            .filter(|p| !self.config.is_excluded(&p.base_currency))
            .collect())
    }

    /// List the universe and rank it. Fails only when the listing fails.
    pub async fn top_coins(&self) -> Result<Vec<ScoredCoin>> {
        let pairs = self.tradable_pairs().await?;
        info!("Ranking {} tradable {} pairs", pairs.len(), self.config.quote_currency);

        let ids: Vec<String> = pairs.into_iter().map(|p| p.id).collect();
        Ok(self.rank(&ids).await)
    }

    pub async fn top_coin_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .top_coins()
            .await?
            .into_iter()
            .map(|c| c.product_id)
            .collect())
    }

    pub async fn rank(&self, candidates: &[String]) -> Vec<ScoredCoin> {
        self.rank_with_progress(candidates, |_, _, _| {}).await
    }

    /// Rank candidates, calling `progress(current, total, product_id)` before each one
    pub async fn rank_with_progress<F>(&self, candidates: &[String], mut progress: F) -> Vec<ScoredCoin>
    where
        F: FnMut(usize, usize, &str),
    {
        let total = candidates.len();
        let mut kept = Vec::new();

        for (i, product_id) in candidates.iter().enumerate() {
            progress(i + 1, total, product_id);

            match self.evaluate(product_id).await {
                Ok(coin) => {
                    debug!(
                        "Kept {} (score {:.2}, spread {:?})",
                        coin.product_id, coin.score, coin.spread
                    );
                    kept.push(coin);
                }
                Err(reason) => info!(product_id = %product_id, reason = %reason, "Skipped candidate"),
            }

            if (i + 1) % self.config.pace_every == 0 && i + 1 < total {
                tokio::time::sleep(Duration::from_millis(self.config.pace_delay_ms)).await;
            }
        }

        kept.sort_by(|a, b| b.score.total_cmp(&a.score));
        kept.truncate(self.config.top_n);

        info!("Ranked {} of {} candidates", kept.len(), total);
        kept
    }

    async fn evaluate(&self, product_id: &str) -> std::result::Result<ScoredCoin, SkipReason> {
        if self.config.is_excluded(base_of(product_id)) {
            return Err(SkipReason::Excluded);
        }

        let spread = match self.books.get_top_of_book(product_id).await {
            Ok(book) => book.spread_pct(),
            Err(e) => {
                warn!("Order book fetch failed for {}: {}", product_id, e);
                None
            }
        };
        let spread = match spread {
            Some(s) if s <= self.config.max_spread_pct => s,
            _ => return Err(SkipReason::Spread),
        };

        let end = self.clock.now();
        let start = end - chrono::Duration::minutes(i64::from(self.config.lookback_min) + 2);
        let candles = match self
            .candles
            .get_candles(product_id, self.config.granularity_sec, start, end)
            .await
        {
            Ok(candles) if !candles.is_empty() => candles,
            Ok(_) => return Err(SkipReason::NoCandles),
            Err(e) => {
                warn!("Candle fetch failed for {}: {}", product_id, e);
                return Err(SkipReason::NoCandles);
            }
        };

        let metrics = CandleMetrics::from_candles(&candles).ok_or(SkipReason::MetricsFailed)?;

        if metrics.last_close < self.config.min_price_usd {
            return Err(SkipReason::PriceBelowMin);
        }
        if metrics.avg_usd_per_min < self.config.min_usd_per_min {
            return Err(SkipReason::Illiquid);
        }

        Ok(ScoredCoin {
            product_id: product_id.to_string(),
            score: self.scorer.score(&metrics),
            metrics: Some(metrics),
            spread: Some(spread),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::Illiquid.to_string(), "illiquid");
        assert_eq!(SkipReason::PriceBelowMin.to_string(), "price below minimum");
    }
}
