//! Universe ranker filtering and ordering against in-memory sources

mod common;

use std::sync::Arc;
use std::time::Duration;

use breakout_scanner::{RankerConfig, UniverseRanker};
use common::*;

fn config(top_n: usize) -> RankerConfig {
    RankerConfig {
        top_n,
        pace_delay_ms: 0,
        ..Default::default()
    }
}

fn ids(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// A universe where each pair trips exactly one filter, plus three keepers
fn market() -> (FakeUniverse, FakeBooks, FakeCandles) {
    let universe = FakeUniverse::new(&[
        "BTC-USD", "ETH-USD", "SOL-USD", "USDC-USD", "WIDE-USD", "NOBOOK-USD", "DUST-USD",
        "THIN-USD", "EMPTY-USD", "BTC-EUR",
    ]);

    let books = FakeBooks::new()
        .with_spread("BTC-USD", 0.001)
        .with_spread("ETH-USD", 0.002)
        .with_spread("SOL-USD", 0.001)
        .with_spread("USDC-USD", 0.0001)
        .with_spread("WIDE-USD", 0.02)
        .with_spread("DUST-USD", 0.001)
        .with_spread("THIN-USD", 0.001)
        .with_spread("EMPTY-USD", 0.001);

    let candles = FakeCandles::new()
        .with_series("BTC-USD", swinging_series(47, 100.0, 0.02, 100.0))
        .with_series("ETH-USD", swinging_series(47, 100.0, 0.01, 100.0))
        .with_series("SOL-USD", swinging_series(47, 100.0, 0.005, 100.0))
        .with_series("USDC-USD", swinging_series(47, 1.0, 0.05, 1_000_000.0))
        .with_series("WIDE-USD", swinging_series(47, 100.0, 0.05, 100.0))
        .with_series("DUST-USD", swinging_series(47, 0.00001, 0.05, 1e12))
        .with_series("THIN-USD", swinging_series(47, 100.0, 0.05, 1.0));

    (universe, books, candles)
}

fn ranker(top_n: usize) -> UniverseRanker {
    let (universe, books, candles) = market();
    UniverseRanker::new(
        Arc::new(universe),
        Arc::new(books),
        Arc::new(candles),
        Arc::new(FixedClock(t0())),
        config(top_n),
    )
    .unwrap()
}

#[tokio::test]
async fn test_top_coins_applies_every_filter() {
    let coins = ranker(10).top_coins().await.unwrap();
    let kept: Vec<&str> = coins.iter().map(|c| c.product_id.as_str()).collect();

    assert_eq!(kept, vec!["BTC-USD", "ETH-USD", "SOL-USD"]);

    let cfg = config(10);
    for coin in &coins {
        let metrics = coin.metrics.unwrap();
        assert!(coin.spread.unwrap() <= cfg.max_spread_pct);
        assert!(metrics.last_close >= cfg.min_price_usd);
        assert!(metrics.avg_usd_per_min >= cfg.min_usd_per_min);
        assert!(!cfg.is_excluded(coin.product_id.split('-').next().unwrap()));
    }
    for pair in coins.windows(2) {
        assert!(pair[0].score >= pair[1].score);
    }
}

#[tokio::test]
async fn test_output_truncated_to_top_n() {
    let ids = ranker(2).top_coin_ids().await.unwrap();
    assert_eq!(ids, vec!["BTC-USD", "ETH-USD"]);
}

#[tokio::test]
async fn test_rank_excludes_bases_passed_directly() {
    let coins = ranker(10).rank(&ids(&["USDC-USD", "SOL-USD"])).await;
    assert_eq!(coins.len(), 1);
    assert_eq!(coins[0].product_id, "SOL-USD");
}

#[tokio::test]
async fn test_ties_keep_scan_order() {
    let series = swinging_series(47, 50.0, 0.01, 200.0);
    let ranker = UniverseRanker::new(
        Arc::new(FakeUniverse::new(&[])),
        Arc::new(
            FakeBooks::new()
                .with_spread("BBB-USD", 0.001)
                .with_spread("AAA-USD", 0.001),
        ),
        Arc::new(
            FakeCandles::new()
                .with_series("BBB-USD", series.clone())
                .with_series("AAA-USD", series),
        ),
        Arc::new(FixedClock(t0())),
        config(10),
    )
    .unwrap();

    let coins = ranker.rank(&ids(&["BBB-USD", "AAA-USD"])).await;
    let order: Vec<&str> = coins.iter().map(|c| c.product_id.as_str()).collect();
    assert_eq!(order, vec!["BBB-USD", "AAA-USD"]);
    assert_eq!(coins[0].score, coins[1].score);
}

#[tokio::test]
async fn test_progress_is_reported_per_candidate() {
    let candidates = ids(&["BTC-USD", "WIDE-USD", "THIN-USD"]);
    let mut seen = Vec::new();

    let coins = ranker(10)
        .rank_with_progress(&candidates, |current, total, id| {
            seen.push((current, total, id.to_string()));
        })
        .await;

    assert_eq!(coins.len(), 1);
    assert_eq!(
        seen,
        vec![
            (1, 3, "BTC-USD".to_string()),
            (2, 3, "WIDE-USD".to_string()),
            (3, 3, "THIN-USD".to_string()),
        ]
    );
}

#[tokio::test]
async fn test_candle_window_covers_lookback() {
    let (universe, books, candles) = market();
    let candles = Arc::new(candles);
    let ranker = UniverseRanker::new(
        Arc::new(universe),
        Arc::new(books),
        candles.clone(),
        Arc::new(FixedClock(t0())),
        config(10),
    )
    .unwrap();

    ranker.rank(&ids(&["BTC-USD"])).await;

    let (_, start, end) = candles.windows()[0].clone();
    assert_eq!(end - start, chrono::Duration::minutes(47));
}

#[tokio::test]
async fn test_listing_failure_is_an_error() {
    let ranker = UniverseRanker::new(
        Arc::new(FakeUniverse::unavailable()),
        Arc::new(FakeBooks::new()),
        Arc::new(FakeCandles::new()),
        Arc::new(FixedClock(t0())),
        config(10),
    )
    .unwrap();

    assert!(ranker.top_coins().await.is_err());
}

#[test]
fn test_invalid_config_is_rejected() {
    let result = UniverseRanker::new(
        Arc::new(FakeUniverse::new(&[])),
        Arc::new(FakeBooks::new()),
        Arc::new(FakeCandles::new()),
        Arc::new(FixedClock(t0())),
        RankerConfig {
            top_n: 0,
            ..Default::default()
        },
    );
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_pacing_pauses_between_batches_only() {
    let ranker = UniverseRanker::new(
        Arc::new(FakeUniverse::new(&[])),
        Arc::new(FakeBooks::new()),
        Arc::new(FakeCandles::new()),
        Arc::new(FixedClock(t0())),
        RankerConfig {
            pace_every: 2,
            pace_delay_ms: 1000,
            ..Default::default()
        },
    )
    .unwrap();

    // Five candidates: pauses after the 2nd and 4th
    let started = tokio::time::Instant::now();
    ranker.rank(&ids(&["A-USD", "B-USD", "C-USD", "D-USD", "E-USD"])).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(2000) && elapsed < Duration::from_millis(2500));

    // Four candidates: no pause after the last one
    let started = tokio::time::Instant::now();
    ranker.rank(&ids(&["A-USD", "B-USD", "C-USD", "D-USD"])).await;
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_millis(1000) && elapsed < Duration::from_millis(1500));
}
