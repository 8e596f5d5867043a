use crate::processor::batch::CycleReport;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(30);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Rolling counters shared by the tailer, the processor pool, and the reporter.
#[derive(Default, Debug)]
pub struct Telemetry {
    cycles: AtomicU64,
    processed_blocks: AtomicU64,
    processed_transactions: AtomicU64,
    rate_limited_cycles: AtomicU64,
    failed_units: AtomicU64,
}

impl Telemetry {
    pub fn record_cycle(&self, report: &CycleReport) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
        self.processed_blocks
            .fetch_add(report.blocks as u64, Ordering::Relaxed);
        self.processed_transactions
            .fetch_add(report.transactions as u64, Ordering::Relaxed);
    }

    pub fn record_rate_limited_cycle(&self) {
        self.rate_limited_cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_units(&self, count: u64) {
        if count == 0 {
            return;
        }
        self.failed_units.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            processed_blocks: self.processed_blocks.load(Ordering::Relaxed),
            processed_transactions: self.processed_transactions.load(Ordering::Relaxed),
            rate_limited_cycles: self.rate_limited_cycles.load(Ordering::Relaxed),
            failed_units: self.failed_units.load(Ordering::Relaxed),
        }
    }

    pub fn processed_blocks(&self) -> u64 {
        self.processed_blocks.load(Ordering::Relaxed)
    }

    pub fn processed_transactions(&self) -> u64 {
        self.processed_transactions.load(Ordering::Relaxed)
    }

    pub fn rate_limited_cycles(&self) -> u64 {
        self.rate_limited_cycles.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub cycles: u64,
    pub processed_blocks: u64,
    pub processed_transactions: u64,
    pub rate_limited_cycles: u64,
    pub failed_units: u64,
}

/// Spawns a background task that periodically logs block and transaction throughput.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "blocktail::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current = telemetry.snapshot();
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let blocks_per_sec = rate(
                        current.processed_blocks.saturating_sub(last_snapshot.processed_blocks),
                        elapsed,
                    );
                    let txs_per_sec = rate(
                        current
                            .processed_transactions
                            .saturating_sub(last_snapshot.processed_transactions),
                        elapsed,
                    );

                    tracing::info!(
                        target: "blocktail::metrics",
                        blocks_per_sec = format!("{blocks_per_sec:.2}"),
                        txs_per_sec = format!("{txs_per_sec:.2}"),
                        cycles = current.cycles,
                        processed_blocks = current.processed_blocks,
                        processed_transactions = current.processed_transactions,
                        rate_limited_cycles = current.rate_limited_cycles,
                        failed_units = current.failed_units,
                        "runtime metrics snapshot"
                    );

                    last_snapshot = current;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

fn rate(delta: u64, elapsed_secs: f64) -> f64 {
    if elapsed_secs <= f64::EPSILON {
        0.0
    } else {
        delta as f64 / elapsed_secs
    }
}
