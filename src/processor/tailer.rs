//! Poll loop driving the tailer.
//!
//! Every cycle reads the chain height, processes the blocks between the
//! cursor and that height as one range, and advances the cursor only after
//! the whole range drained through the processor pool. Throttled cycles
//! leave the cursor untouched and retry after a jittered backoff; any other
//! error ends the loop.

use crate::processor::backoff::{sleep_with_cancellation, RetryBackoff};
use crate::processor::batch::{BatchFetcher, CycleReport};
use crate::processor::cursor::Cursor;
use crate::processor::worker_pool::TxProcessorPool;
use crate::rpc::client::{is_rate_limited, ChainClient};
use crate::runtime::config::TailerConfig;
use crate::runtime::telemetry::Telemetry;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub struct BlockTailer {
    client: Arc<dyn ChainClient>,
    fetcher: BatchFetcher,
    pool: TxProcessorPool,
    cursor: Cursor,
    poll_interval: Duration,
    backoff: RetryBackoff,
    telemetry: Arc<Telemetry>,
}

impl BlockTailer {
    pub fn new(
        config: &TailerConfig,
        client: Arc<dyn ChainClient>,
        pool: TxProcessorPool,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            fetcher: BatchFetcher::new(client.clone()),
            client,
            pool,
            cursor: Cursor::new(),
            poll_interval: config.poll_interval(),
            backoff: RetryBackoff::new(
                config.rate_limit_initial_backoff(),
                config.rate_limit_max_backoff(),
            ),
            telemetry,
        }
    }

    /// Starts from an explicit cursor instead of seeding it from the first observed height.
    pub fn with_cursor(mut self, cursor: Cursor) -> Self {
        self.cursor = cursor;
        self
    }

    pub fn cursor(&self) -> Cursor {
        self.cursor
    }

    /// Runs cycles until `shutdown` is cancelled or a non-throttling error occurs.
    ///
    /// Cancellation is honoured between cycles and during pauses; a range
    /// that is already being fetched is allowed to finish.
    pub async fn run(&mut self, shutdown: &CancellationToken) -> Result<()> {
        loop {
            if shutdown.is_cancelled() {
                tracing::info!(
                    last_processed = ?self.cursor.last_processed(),
                    "tailer stopping on cancellation"
                );
                return Ok(());
            }

            let pause = match self.poll_once().await {
                Ok(Some(report)) => {
                    self.backoff.reset();
                    self.telemetry.record_cycle(&report);
                    report.log();
                    continue;
                }
                Ok(None) => self.poll_interval,
                Err(err) if is_rate_limited(&err) => {
                    self.telemetry.record_rate_limited_cycle();
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        attempt = self.backoff.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        last_processed = ?self.cursor.last_processed(),
                        error = %format!("{err:#}"),
                        "rate limited by node; retrying range"
                    );
                    delay
                }
                Err(err) => {
                    tracing::error!(
                        last_processed = ?self.cursor.last_processed(),
                        error = %format!("{err:#}"),
                        "tailer cycle failed"
                    );
                    return Err(err);
                }
            };

            // A cancelled sleep falls through to the check at the top.
            sleep_with_cancellation(pause, shutdown).await;
        }
    }

    /// Runs a single cycle. Returns `None` when the chain has not moved past the cursor.
    pub async fn poll_once(&mut self) -> Result<Option<CycleReport>> {
        let observed = self
            .client
            .current_height()
            .await
            .context("failed to read current chain height")?;

        let Some(range) = self.cursor.pending_range(observed) else {
            tracing::trace!(observed, "no new blocks");
            return Ok(None);
        };

        tracing::debug!(
            observed,
            start_height = range.from,
            end_height = range.to,
            lag = range.len(),
            "processing block range"
        );

        let report = self.fetcher.process_range(range, &self.pool).await?;
        if let Some(last) = range.last() {
            self.cursor.advance_to(last);
        }
        Ok(Some(report))
    }
}
