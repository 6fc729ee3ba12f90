pub mod types;
pub mod config;
pub mod breakout;
pub mod scoring;
pub mod ranker;
pub mod scanner;
pub mod alerts;
pub mod sources {
    pub mod coinbase;
}

pub use types::*;
pub use crate::config::{AppConfig, RankerConfig, ScanMode, ScanModeConfig, ScannerConfig};
pub use breakout::{BreakoutDetails, BreakoutEvaluator, BreakoutResult};
pub use scoring::{CandleMetrics, CoinScorer};
pub use ranker::{ScoredCoin, SkipReason, UniverseRanker};
pub use scanner::{BreakoutScanner, ScanStats};
pub use alerts::{AlertSink, LogAlertSink, WebhookAlertSink};
pub use sources::coinbase::CoinbaseClient;
