use crate::types::*;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use url::Url;

/// Internal health tracking so health() needs no API call
struct HealthTracker {
    /// Millis since epoch of the last successful request
    last_success_ms: AtomicU64,
    /// Millis since epoch of the last failed request
    last_failure_ms: AtomicU64,
    success_count: AtomicU64,
    failure_count: AtomicU64,
    last_latency_ms: AtomicU64,
}

impl HealthTracker {
    fn new() -> Self {
        Self {
            last_success_ms: AtomicU64::new(0),
            last_failure_ms: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            last_latency_ms: AtomicU64::new(0),
        }
    }

    fn record_success(&self, latency_ms: u64) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_success_ms.store(now_ms, Ordering::Relaxed);
        self.last_latency_ms.store(latency_ms, Ordering::Relaxed);
        self.success_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_failure(&self) {
        let now_ms = Utc::now().timestamp_millis() as u64;
        self.last_failure_ms.store(now_ms, Ordering::Relaxed);
        self.failure_count.fetch_add(1, Ordering::Relaxed);
    }

    fn is_healthy(&self) -> bool {
        let last_success = self.last_success_ms.load(Ordering::Relaxed);
        let last_failure = self.last_failure_ms.load(Ordering::Relaxed);

        // At least one success, and no failure since
        last_success > 0 && (last_failure == 0 || last_success >= last_failure)
    }

    fn success_rate(&self) -> f64 {
        let successes = self.success_count.load(Ordering::Relaxed);
        let failures = self.failure_count.load(Ordering::Relaxed);
        let total = successes + failures;
        if total == 0 {
            return 1.0;
        }
        successes as f64 / total as f64
    }
}

/// Coinbase Exchange public REST client
///
/// Serves candles, level-1 books and the product listing. Requests are
/// serialized with a minimum spacing; pacing beyond that is left to callers.
pub struct CoinbaseClient {
    client: Client,
    base_url: Url,
    last_request: tokio::sync::Mutex<Instant>,
    health_tracker: HealthTracker,
}

impl CoinbaseClient {
    /// Per-request timeout
    const REQUEST_TIMEOUT_SECS: u64 = 10;
    /// Minimum spacing between requests
    const MIN_REQUEST_SPACING_MS: u64 = 100;
    /// Longest Retry-After we are willing to honour
    const MAX_RETRY_WAIT_SECS: u64 = 30;

    pub fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ScanError::InvalidConfig(format!("invalid Coinbase URL {}: {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("breakout-scanner/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ScanError::ApiError(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            last_request: tokio::sync::Mutex::new(
                Instant::now()
                    .checked_sub(Duration::from_secs(10))
                    .unwrap_or_else(Instant::now),
            ),
            health_tracker: HealthTracker::new(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .map_err(|e| ScanError::InvalidConfig(format!("invalid endpoint {}: {}", path, e)))
    }

    /// Spaced request with per-request timeout and one retry on 429
    async fn rate_limited_request<T: serde::de::DeserializeOwned>(
        &self,
        url: Url,
        symbol: Option<&str>,
    ) -> Result<T> {
        let request_start = Instant::now();

        for attempt in 0..2 {
            {
                let mut last = self.last_request.lock().await;
                let spacing = Duration::from_millis(Self::MIN_REQUEST_SPACING_MS);
                let elapsed = last.elapsed();
                if elapsed < spacing {
                    tokio::time::sleep(spacing - elapsed).await;
                }
                *last = Instant::now();
            }

            let request_future = self
                .client
                .get(url.clone())
                .header("Accept", "application/json")
                .send();
            let response = match tokio::time::timeout(
                Duration::from_secs(Self::REQUEST_TIMEOUT_SECS),
                request_future,
            )
            .await
            {
                Ok(Ok(resp)) => resp,
                Ok(Err(e)) => {
                    self.health_tracker.record_failure();
                    return Err(ScanError::ApiError(e.to_string()));
                }
                Err(_) => {
                    self.health_tracker.record_failure();
                    return Err(ScanError::ApiError(format!(
                        "Coinbase request to {} timed out after {}s",
                        url.path(),
                        Self::REQUEST_TIMEOUT_SECS
                    )));
                }
            };

            let status = response.status();

            if status == StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());

                if attempt == 0 {
                    let wait_secs = retry_after.unwrap_or(1).min(Self::MAX_RETRY_WAIT_SECS);
                    tracing::warn!(
                        "Coinbase rate limited, waiting {} seconds before retry",
                        wait_secs
                    );
                    tokio::time::sleep(Duration::from_secs(wait_secs)).await;
                    continue;
                }

                self.health_tracker.record_failure();
                return Err(ScanError::RateLimit {
                    source_name: "coinbase".to_string(),
                    retry_after,
                });
            }

            if status == StatusCode::NOT_FOUND {
                if let Some(symbol) = symbol {
                    // Unknown pair is a caller problem, not an unhealthy upstream
                    return Err(ScanError::PairNotFound(symbol.to_string()));
                }
            }

            if !status.is_success() {
                self.health_tracker.record_failure();
                let text = response.text().await.unwrap_or_default();
                return Err(ScanError::ApiError(format!(
                    "Coinbase API error ({}): {}",
                    status, text
                )));
            }

            let body = response.json::<T>().await.map_err(|e| {
                self.health_tracker.record_failure();
                ScanError::InvalidResponse(e.to_string())
            })?;

            let latency_ms = request_start.elapsed().as_millis() as u64;
            self.health_tracker.record_success(latency_ms);
            return Ok(body);
        }

        Err(ScanError::ApiError(
            "Unexpected retry loop exit".to_string(),
        ))
    }

    /// Candles for `symbol` in `[start, end]`, ascending and deduplicated
    ///
    /// Upstream rows are `[time, low, high, open, close, volume]`, newest first.
    pub async fn get_candles(
        &self,
        symbol: &str,
        granularity_sec: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut url = self.endpoint(&format!("products/{}/candles", symbol))?;
        url.query_pairs_mut()
            .append_pair("granularity", &granularity_sec.to_string())
            .append_pair("start", &start.to_rfc3339_opts(SecondsFormat::Secs, true))
            .append_pair("end", &end.to_rfc3339_opts(SecondsFormat::Secs, true));

        let rows: Vec<Value> = self.rate_limited_request(url, Some(symbol)).await?;
        Ok(decode_candles(symbol, &rows))
    }

    /// Best bid/ask from the level-1 book
    pub async fn get_top_of_book(&self, symbol: &str) -> Result<TopOfBook> {
        let mut url = self.endpoint(&format!("products/{}/book", symbol))?;
        url.query_pairs_mut().append_pair("level", "1");

        let book: BookResponse = self.rate_limited_request(url, Some(symbol)).await?;

        let best_bid = book.bids.first().and_then(|level| level_price(level));
        let best_ask = book.asks.first().and_then(|level| level_price(level));

        match (best_bid, best_ask) {
            (Some(best_bid), Some(best_ask)) => Ok(TopOfBook { best_bid, best_ask }),
            _ => Err(ScanError::InvalidResponse(format!(
                "empty level-1 book for {}",
                symbol
            ))),
        }
    }

    /// Online, enabled products quoted in `quote`
    pub async fn list_tradable_pairs(&self, quote: &str) -> Result<Vec<Product>> {
        let url = self.endpoint("products")?;
        let products: Vec<Product> = self.rate_limited_request(url, None).await?;

        Ok(products
            .into_iter()
            .filter(|p| p.is_tradable(quote))
            .collect())
    }

    /// Health from internal metrics (no API call)
    pub async fn health(&self) -> SourceHealth {
        let last_success_ms = self.health_tracker.last_success_ms.load(Ordering::Relaxed);
        let last_success = if last_success_ms > 0 {
            DateTime::from_timestamp_millis(last_success_ms as i64)
        } else {
            None
        };

        let is_healthy = self.health_tracker.is_healthy();

        SourceHealth {
            source: "coinbase".to_string(),
            is_healthy,
            last_success,
            last_error: if is_healthy {
                None
            } else {
                Some("Recent failures detected".to_string())
            },
            success_rate: self.health_tracker.success_rate(),
            avg_latency_ms: self.health_tracker.last_latency_ms.load(Ordering::Relaxed),
        }
    }

    pub fn name(&self) -> &str {
        "coinbase"
    }
}

#[derive(Debug, serde::Deserialize)]
struct BookResponse {
    #[serde(default)]
    bids: Vec<Vec<Value>>,
    #[serde(default)]
    asks: Vec<Vec<Value>>,
}

/// Numeric field that may arrive as a JSON number or a decimal string
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Price of a `[price, size, num_orders]` book level
fn level_price(level: &[Value]) -> Option<f64> {
    level.first().and_then(as_number)
}

/// Decode one `[time, low, high, open, close, volume]` row
fn decode_candle_row(row: &Value) -> std::result::Result<Candle, String> {
    let fields = row
        .as_array()
        .ok_or_else(|| format!("expected array, got {}", row))?;
    if fields.len() != 6 {
        return Err(format!("expected 6 fields, got {}", fields.len()));
    }

    let mut numbers = [0.0f64; 6];
    for (slot, field) in numbers.iter_mut().zip(fields) {
        *slot = as_number(field).ok_or_else(|| format!("non-numeric field {}", field))?;
    }
    let [time, low, high, open, close, volume] = numbers;

    let timestamp = DateTime::from_timestamp(time as i64, 0)
        .ok_or_else(|| format!("timestamp out of range: {}", time))?;

    Ok(Candle {
        timestamp,
        open,
        high,
        low,
        close,
        volume,
    })
}

/// Typed decode of a candle response; malformed rows are dropped
pub(crate) fn decode_candles(symbol: &str, rows: &[Value]) -> Vec<Candle> {
    let mut candles: Vec<Candle> = rows
        .iter()
        .filter_map(|row| match decode_candle_row(row) {
            Ok(candle) => Some(candle),
            Err(reason) => {
                tracing::warn!(symbol, %reason, "Dropping malformed candle row");
                None
            }
        })
        .collect();

    candles.sort_by_key(|c| c.timestamp);
    candles.dedup_by_key(|c| c.timestamp);
    candles
}

#[async_trait::async_trait]
impl CandleSource for CoinbaseClient {
    async fn get_candles(
        &self,
        symbol: &str,
        granularity_sec: u32,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        CoinbaseClient::get_candles(self, symbol, granularity_sec, start, end).await
    }

    fn name(&self) -> &str {
        "coinbase"
    }
}

#[async_trait::async_trait]
impl OrderBookSource for CoinbaseClient {
    async fn get_top_of_book(&self, symbol: &str) -> Result<TopOfBook> {
        CoinbaseClient::get_top_of_book(self, symbol).await
    }
}

#[async_trait::async_trait]
impl PairUniverse for CoinbaseClient {
    async fn list_tradable_pairs(&self, quote: &str) -> Result<Vec<Product>> {
        CoinbaseClient::list_tradable_pairs(self, quote).await
    }
}
