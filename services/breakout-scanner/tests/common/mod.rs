//! In-memory sources and sinks for exercising the scanner and ranker
//! without network access

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use tokio::sync::Notify;

use breakout_scanner::{
    AlertSink, BreakoutResult, Candle, CandleSource, Clock, OrderBookSource, PairUniverse,
    Product, Result, ScanError, TopOfBook,
};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn candle(i: i64, close: f64, high: f64, low: f64, volume: f64) -> Candle {
    Candle {
        timestamp: t0() + Duration::minutes(i),
        open: close,
        high,
        low,
        close,
        volume,
    }
}

/// Ten flat candles (highs at 100.5) with a final close of 102 on 3x volume
pub fn breakout_series() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..9).map(|i| candle(i, 100.0, 100.5, 99.5, 10.0)).collect();
    candles.push(candle(9, 102.0, 103.0, 100.0, 30.0));
    candles
}

/// Same shape but without a volume spike
pub fn quiet_series() -> Vec<Candle> {
    let mut candles: Vec<Candle> = (0..9).map(|i| candle(i, 100.0, 100.5, 99.5, 10.0)).collect();
    candles.push(candle(9, 100.2, 100.4, 99.9, 10.0));
    candles
}

/// Closes alternate between `price` and `price * (1 + swing)`
pub fn swinging_series(n: i64, price: f64, swing: f64, volume: f64) -> Vec<Candle> {
    (0..n)
        .map(|i| {
            let close = if i % 2 == 0 { price } else { price * (1.0 + swing) };
            candle(i, close, close * 1.001, close * 0.999, volume)
        })
        .collect()
}

pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Candle source serving canned series per symbol
#[derive(Default)]
pub struct FakeCandles {
    series: HashMap<String, Vec<Candle>>,
    failing: HashSet<String>,
    calls: AtomicUsize,
    windows: Mutex<Vec<(String, DateTime<Utc>, DateTime<Utc>)>>,
}

impl FakeCandles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, symbol: &str, candles: Vec<Candle>) -> Self {
        self.series.insert(symbol.to_string(), candles);
        self
    }

    pub fn with_failure(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn windows(&self) -> Vec<(String, DateTime<Utc>, DateTime<Utc>)> {
        self.windows.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CandleSource for FakeCandles {
    async fn get_candles(
        &self,
        symbol: &str,
        _granularity_sec: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.windows
            .lock()
            .unwrap()
            .push((symbol.to_string(), start, end));

        if self.failing.contains(symbol) {
            return Err(ScanError::ApiError(format!("{} unavailable", symbol)));
        }
        Ok(self.series.get(symbol).cloned().unwrap_or_default())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Holds fetches for one symbol open until released; every other
/// symbol gets a quiet series immediately
pub struct GatedCandles {
    gated: String,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedCandles {
    pub fn new(gated: &str) -> Self {
        Self {
            gated: gated.to_string(),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }
}

#[async_trait::async_trait]
impl CandleSource for GatedCandles {
    async fn get_candles(
        &self,
        symbol: &str,
        _granularity_sec: u32,
        _start: DateTime<Utc>,
        _end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        if symbol != self.gated {
            return Ok(quiet_series());
        }
        self.entered.notify_one();
        self.release.notified().await;
        Ok(breakout_series())
    }

    fn name(&self) -> &str {
        "gated"
    }
}

/// Order books keyed by symbol; unknown symbols fail
#[derive(Default)]
pub struct FakeBooks {
    books: HashMap<String, TopOfBook>,
}

impl FakeBooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Book centred on 100 with the given relative spread
    pub fn with_spread(mut self, symbol: &str, spread: f64) -> Self {
        self.books.insert(
            symbol.to_string(),
            TopOfBook {
                best_bid: 100.0 - spread * 50.0,
                best_ask: 100.0 + spread * 50.0,
            },
        );
        self
    }
}

#[async_trait::async_trait]
impl OrderBookSource for FakeBooks {
    async fn get_top_of_book(&self, symbol: &str) -> Result<TopOfBook> {
        self.books
            .get(symbol)
            .copied()
            .ok_or_else(|| ScanError::PairNotFound(symbol.to_string()))
    }
}

pub struct FakeUniverse {
    products: Option<Vec<Product>>,
}

impl FakeUniverse {
    pub fn new(ids: &[&str]) -> Self {
        let products = ids
            .iter()
            .map(|id| {
                let (base, quote) = id.split_once('-').unwrap();
                Product {
                    id: id.to_string(),
                    base_currency: base.to_string(),
                    quote_currency: quote.to_string(),
                    status: "online".to_string(),
                    trading_disabled: false,
                }
            })
            .collect();
        Self {
            products: Some(products),
        }
    }

    pub fn unavailable() -> Self {
        Self { products: None }
    }
}

#[async_trait::async_trait]
impl PairUniverse for FakeUniverse {
    async fn list_tradable_pairs(&self, quote: &str) -> Result<Vec<Product>> {
        match &self.products {
            Some(products) => Ok(products
                .iter()
                .filter(|p| p.is_tradable(quote))
                .cloned()
                .collect()),
            None => Err(ScanError::SourceUnhealthy("listing unavailable".to_string())),
        }
    }
}

/// Records every delivered symbol
#[derive(Default)]
pub struct RecordingSink {
    delivered: Mutex<Vec<String>>,
}

impl RecordingSink {
    pub fn delivered(&self) -> Vec<String> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AlertSink for RecordingSink {
    async fn deliver(&self, result: &BreakoutResult) -> Result<()> {
        self.delivered.lock().unwrap().push(result.symbol.clone());
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Always fails
pub struct FailingSink;

#[async_trait::async_trait]
impl AlertSink for FailingSink {
    async fn deliver(&self, _result: &BreakoutResult) -> Result<()> {
        Err(ScanError::AlertDelivery("sink down".to_string()))
    }

    fn name(&self) -> &str {
        "failing"
    }
}
