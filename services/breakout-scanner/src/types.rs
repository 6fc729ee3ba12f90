use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV candle for one fixed interval. Volume is in base-asset units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Traded value of the candle in quote currency
    pub fn dollar_volume(&self) -> f64 {
        self.volume * self.close
    }
}

/// Candle granularities accepted by the exchange candle endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Granularity {
    Minute1,
    Minute5,
    Minute15,
    Hour1,
    Hour6,
    Day1,
}

impl Granularity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::Minute1 => "1m",
            Granularity::Minute5 => "5m",
            Granularity::Minute15 => "15m",
            Granularity::Hour1 => "1h",
            Granularity::Hour6 => "6h",
            Granularity::Day1 => "1d",
        }
    }

    pub fn to_seconds(&self) -> u32 {
        match self {
            Granularity::Minute1 => 60,
            Granularity::Minute5 => 300,
            Granularity::Minute15 => 900,
            Granularity::Hour1 => 3600,
            Granularity::Hour6 => 21600,
            Granularity::Day1 => 86400,
        }
    }

    pub fn from_seconds(secs: u32) -> Option<Self> {
        match secs {
            60 => Some(Granularity::Minute1),
            300 => Some(Granularity::Minute5),
            900 => Some(Granularity::Minute15),
            3600 => Some(Granularity::Hour1),
            21600 => Some(Granularity::Hour6),
            86400 => Some(Granularity::Day1),
            _ => None,
        }
    }
}

/// Best bid and best ask at one moment
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TopOfBook {
    pub best_bid: f64,
    pub best_ask: f64,
}

impl TopOfBook {
    /// Relative spread `(ask - bid) / mid`, `None` when the midpoint is not positive
    pub fn spread_pct(&self) -> Option<f64> {
        let mid = (self.best_bid + self.best_ask) / 2.0;
        if !(mid > 0.0) {
            return None;
        }
        let spread = (self.best_ask - self.best_bid) / mid;
        spread.is_finite().then_some(spread)
    }
}

/// Listed trading pair as reported by the exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub base_currency: String,
    pub quote_currency: String,
    pub status: String,
    #[serde(default)]
    pub trading_disabled: bool,
}

impl Product {
    /// Online, enabled and quoted in `quote`
    pub fn is_tradable(&self, quote: &str) -> bool {
        self.quote_currency.eq_ignore_ascii_case(quote)
            && self.status == "online"
            && !self.trading_disabled
    }
}

/// Base asset of a `BASE-QUOTE` product id
pub fn base_of(product_id: &str) -> &str {
    product_id.split('-').next().unwrap_or(product_id)
}

/// Data source health/status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceHealth {
    pub source: String,
    pub is_healthy: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub success_rate: f64,
    pub avg_latency_ms: u64,
}

/// Error types for scanning and ranking
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit {
        source_name: String,
        retry_after: Option<u64>,
    },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Pair not found: {0}")]
    PairNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Source unhealthy: {0}")]
    SourceUnhealthy(String),

    #[error("Alert delivery failed: {0}")]
    AlertDelivery(String),
}

/// Result type for scanner operations
pub type Result<T> = std::result::Result<T, ScanError>;

/// Supplies ordered OHLCV candles for a symbol
#[async_trait::async_trait]
pub trait CandleSource: Send + Sync {
    /// Candles in `[start, end]`, ascending by timestamp and deduplicated
    async fn get_candles(
        &self,
        symbol: &str,
        granularity_sec: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;

    fn name(&self) -> &str;
}

/// Supplies level-1 order book snapshots
#[async_trait::async_trait]
pub trait OrderBookSource: Send + Sync {
    async fn get_top_of_book(&self, symbol: &str) -> Result<TopOfBook>;
}

/// Lists the tradable pair universe
#[async_trait::async_trait]
pub trait PairUniverse: Send + Sync {
    /// Online, enabled products quoted in `quote`
    async fn list_tradable_pairs(&self, quote: &str) -> Result<Vec<Product>>;
}

/// Source of "now" for fetch windows
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
