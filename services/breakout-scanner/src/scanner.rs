//! Breakout Scanner - continuous scan loop over a pair universe
//!
//! One worker task walks the universe in order, evaluates each pair's
//! recent candles and publishes breakouts and stats. Subscribers never
//! block the loop: breakouts go out on a broadcast channel and stats on a
//! watch channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::alerts::AlertSink;
use crate::breakout::{BreakoutEvaluator, BreakoutResult};
use crate::config::ScannerConfig;
use crate::types::{CandleSource, Clock, Result};

const BREAKOUT_CHANNEL_CAPACITY: usize = 256;

/// Scan loop counters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanStats {
    pub total_scanned: u64,
    pub breakouts_detected: u64,
    pub current_pair: String,
    pub last_scan_time: DateTime<Utc>,
}

impl ScanStats {
    fn fresh(now: DateTime<Utc>) -> Self {
        Self {
            total_scanned: 0,
            breakouts_detected: 0,
            current_pair: String::new(),
            last_scan_time: now,
        }
    }
}

/// Run flag and wake-up for one worker
struct RunControl {
    active: AtomicBool,
    wake: Notify,
}

impl RunControl {
    fn new() -> Self {
        Self {
            active: AtomicBool::new(true),
            wake: Notify::new(),
        }
    }

    fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }
}

struct ScanRun {
    control: Arc<RunControl>,
    handle: JoinHandle<()>,
}

/// Continuous breakout scanner
///
/// Lifecycle: `new` → `start` → `stop` → `dispose`. A scanner can be
/// started again after a stop; stats are reset on each fresh start.
pub struct BreakoutScanner {
    candles: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    breakout_tx: broadcast::Sender<BreakoutResult>,
    stats_tx: Arc<watch::Sender<ScanStats>>,
    run: Mutex<Option<ScanRun>>,
}

impl BreakoutScanner {
    pub fn new(
        candles: Arc<dyn CandleSource>,
        clock: Arc<dyn Clock>,
        sinks: Vec<Arc<dyn AlertSink>>,
    ) -> Self {
        let (breakout_tx, _) = broadcast::channel(BREAKOUT_CHANNEL_CAPACITY);
        let (stats_tx, _) = watch::channel(ScanStats::fresh(clock.now()));

        Self {
            candles,
            clock,
            sinks: Arc::new(sinks),
            breakout_tx,
            stats_tx: Arc::new(stats_tx),
            run: Mutex::new(None),
        }
    }

    /// Start scanning `pairs` in order. No-op while already running.
    ///
    /// The config is validated up front and snapshotted for the run.
    pub fn start(&self, pairs: Vec<String>, config: ScannerConfig) -> Result<()> {
        config.validate()?;
        let mode = config.active_mode()?;

        let mut run = self.lock_run();
        if let Some(current) = run.as_ref() {
            if current.control.is_active() && !current.handle.is_finished() {
                debug!("Scanner already running, ignoring start");
                return Ok(());
            }
        }

        self.stats_tx.send_replace(ScanStats::fresh(self.clock.now()));

        let control = Arc::new(RunControl::new());
        let worker = ScanWorker {
            candles: self.candles.clone(),
            clock: self.clock.clone(),
            sinks: self.sinks.clone(),
            breakout_tx: self.breakout_tx.clone(),
            stats_tx: self.stats_tx.clone(),
            evaluator: BreakoutEvaluator::new(config.min_volume_usd),
            pairs,
            scan_mode: mode.name,
            window: chrono::Duration::seconds(
                i64::from(config.granularity_sec) * mode.candle_count as i64,
            ),
            granularity_sec: config.granularity_sec,
            cycle_delay: Duration::from_millis(config.cycle_delay_ms),
            control: control.clone(),
        };

        info!(
            "Starting breakout scanner: {} pairs, mode {}",
            worker.pairs.len(),
            worker.scan_mode
        );
        let handle = tokio::spawn(worker.run());

        // A previous worker still finishing its pair sees its own cancelled
        // control and drops whatever it was about to publish
        *run = Some(ScanRun { control, handle });
        Ok(())
    }

    /// Request the worker to stop after the pair in flight
    pub fn stop(&self) {
        if let Some(run) = self.lock_run().as_ref() {
            if run.control.is_active() {
                info!("Stopping breakout scanner");
            }
            run.control.cancel();
        }
    }

    /// Stop and wait for the worker to exit
    pub async fn dispose(&self) {
        let run = self.lock_run().take();
        if let Some(run) = run {
            run.control.cancel();
            if let Err(e) = run.handle.await {
                error!("Scanner worker ended abnormally: {}", e);
            }
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.lock_run()
            .as_ref()
            .map(|run| run.control.is_active() && !run.handle.is_finished())
            .unwrap_or(false)
    }

    /// Snapshot of the current stats
    pub fn stats(&self) -> ScanStats {
        self.stats_tx.borrow().clone()
    }

    pub fn subscribe_breakouts(&self) -> broadcast::Receiver<BreakoutResult> {
        self.breakout_tx.subscribe()
    }

    pub fn subscribe_stats(&self) -> watch::Receiver<ScanStats> {
        self.stats_tx.subscribe()
    }

    fn lock_run(&self) -> std::sync::MutexGuard<'_, Option<ScanRun>> {
        // The guarded state stays consistent even if a holder panicked
        self.run.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Everything one run needs, owned by the worker task
struct ScanWorker {
    candles: Arc<dyn CandleSource>,
    clock: Arc<dyn Clock>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    breakout_tx: broadcast::Sender<BreakoutResult>,
    stats_tx: Arc<watch::Sender<ScanStats>>,
    evaluator: BreakoutEvaluator,
    pairs: Vec<String>,
    scan_mode: String,
    window: chrono::Duration,
    granularity_sec: u32,
    cycle_delay: Duration,
    control: Arc<RunControl>,
}

impl ScanWorker {
    async fn run(self) {
        while self.control.is_active() {
            for pair in &self.pairs {
                if !self.control.is_active() {
                    break;
                }
                self.scan_pair(pair).await;
            }

            if !self.control.is_active() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.cycle_delay) => {}
                _ = self.control.wake.notified() => {}
            }
        }
        info!("Breakout scanner stopped");
    }

    async fn scan_pair(&self, pair: &str) {
        let now = self.clock.now();
        let counted = self.update_stats(|stats| {
            stats.total_scanned += 1;
            stats.current_pair = pair.to_string();
            stats.last_scan_time = now;
        });
        if !counted {
            return;
        }

        let candles = match self
            .candles
            .get_candles(pair, self.granularity_sec, now - self.window, now)
            .await
        {
            Ok(candles) => candles,
            Err(e) => {
                warn!("Candle fetch failed for {}: {}", pair, e);
                return;
            }
        };

        if candles.is_empty() {
            debug!("No candles for {}, skipping", pair);
            return;
        }

        let result = self.evaluator.evaluate(pair, &candles, &self.scan_mode);
        if !result.is_breakout {
            return;
        }

        // A cancelled run must not publish into a restarted one
        let now = self.clock.now();
        let counted = self.update_stats(|stats| {
            stats.breakouts_detected += 1;
            stats.last_scan_time = now;
        });
        if !counted {
            debug!("Run cancelled, dropping breakout on {}", pair);
            return;
        }

        if let Some(details) = &result.details {
            info!(
                "Breakout on {} at {:.8} (+{:.2}%, vol {:.1}x, modes {})",
                pair,
                details.price,
                details.percent_change,
                details.volume_ratio,
                details.modes.join(",")
            );
        }

        // No subscribers is not an error
        let _ = self.breakout_tx.send(result.clone());

        self.dispatch(&result).await;
    }

    /// Apply `update` unless this run has been cancelled.
    ///
    /// The flag is read under the watch lock, so a write from a stopped
    /// worker can never land after a restart has reset the stats.
    fn update_stats<F>(&self, update: F) -> bool
    where
        F: FnOnce(&mut ScanStats),
    {
        self.stats_tx.send_if_modified(|stats| {
            if !self.control.is_active() {
                return false;
            }
            update(stats);
            true
        })
    }

    /// Every sink sees the result; one failing sink does not affect the rest
    async fn dispatch(&self, result: &BreakoutResult) {
        for sink in self.sinks.iter() {
            if let Err(e) = sink.deliver(result).await {
                error!(
                    "Alert sink {} failed for {}: {}",
                    sink.name(),
                    result.symbol,
                    e
                );
            }
        }
    }
}
