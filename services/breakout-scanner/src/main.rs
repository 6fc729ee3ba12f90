//! Breakout Scanner - Ranks the Coinbase USD universe and watches the
//! shortlist for price/volume breakouts
//!
//! 1. Loads config (scanner.toml + SCANNER__* env vars)
//! 2. Ranks tradable pairs into a shortlist (unless `pairs` is fixed)
//! 3. Runs the scan loop, delivering breakouts to the alert sinks
//! 4. Serves a read-only status API until Ctrl-C

use axum::{routing::get, Router};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use breakout_scanner::{
    AlertSink, AppConfig, BreakoutScanner, CoinbaseClient, LogAlertSink, ScoredCoin, SystemClock,
    UniverseRanker, WebhookAlertSink,
};

mod handlers;

/// Application state shared across handlers
pub struct AppState {
    pub scanner: Arc<BreakoutScanner>,
    pub coinbase: Arc<CoinbaseClient>,
    pub shortlist: Vec<ScoredCoin>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Breakout Scanner...");

    let config_path = std::env::var("SCANNER_CONFIG").ok().map(PathBuf::from);
    let config = AppConfig::load(config_path.as_deref())?;
    info!(
        "Scan mode: {}, granularity {}s, cycle delay {}ms",
        config.scanner.scan_mode.as_str(),
        config.scanner.granularity_sec,
        config.scanner.cycle_delay_ms
    );

    let coinbase = Arc::new(CoinbaseClient::new(&config.coinbase.base_url)?);
    info!("✓ Coinbase client initialized ({})", config.coinbase.base_url);
    let clock = Arc::new(SystemClock);

    // Build the scan universe
    let shortlist = if config.pairs.is_empty() {
        let ranker = UniverseRanker::new(
            coinbase.clone(),
            coinbase.clone(),
            coinbase.clone(),
            clock.clone(),
            config.ranker.clone(),
        )?;
        let coins = ranker.top_coins().await?;
        if coins.is_empty() {
            anyhow::bail!("No pairs passed the ranking filters, nothing to scan");
        }
        info!("✓ Ranked shortlist of {} pairs", coins.len());
        coins
    } else {
        info!("✓ Using {} configured pairs", config.pairs.len());
        config
            .pairs
            .iter()
            .map(|id| ScoredCoin {
                product_id: id.clone(),
                score: 0.0,
                metrics: None,
                spread: None,
            })
            .collect()
    };
    let pairs: Vec<String> = shortlist.iter().map(|c| c.product_id.clone()).collect();

    // Alert sinks
    let mut sinks: Vec<Arc<dyn AlertSink>> =
        vec![Arc::new(LogAlertSink::new(config.alerts.template.clone()))];
    let webhook = WebhookAlertSink::new(&config.alerts)?;
    if webhook.is_configured() {
        sinks.push(Arc::new(webhook));
        info!("✓ Webhook alerts enabled");
    } else {
        warn!("⚠ No webhook configured, breakouts will only be logged");
    }

    let scanner = Arc::new(BreakoutScanner::new(coinbase.clone(), clock, sinks));
    spawn_breakout_observer(scanner.subscribe_breakouts());
    scanner.start(pairs, config.scanner.clone())?;

    let state = Arc::new(AppState {
        scanner: scanner.clone(),
        coinbase,
        shortlist,
    });

    // Build router
    let app = Router::new()
        .route("/health", get(handlers::health_check))
        .route("/stats", get(handlers::get_stats))
        .route("/top-coins", get(handlers::get_top_coins))
        .layer(CorsLayer::new().allow_origin(Any))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    info!("🚀 Breakout Scanner status API listening on port {}", config.port);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scanner.dispose().await;
    info!("Breakout Scanner shut down");
    Ok(())
}

/// Running breakout tally for the log
fn spawn_breakout_observer(mut rx: broadcast::Receiver<breakout_scanner::BreakoutResult>) {
    tokio::spawn(async move {
        let mut seen = 0u64;
        loop {
            match rx.recv().await {
                Ok(result) => {
                    seen += 1;
                    debug!("Breakout #{} this session: {}", seen, result.symbol);
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Breakout observer lagged, skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
