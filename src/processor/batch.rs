//! Two-round batched extraction of a block range.
//!
//! The first round fetches every block of the range in one batch. The second
//! round fetches the transactions and the receipts of every discovered hash in
//! two same-shape batches issued concurrently, then pairs them by position.

use crate::processor::worker_pool::TxProcessorPool;
use crate::rpc::client::ChainClient;
use crate::rpc::types::{ReceiptRecord, TxRecord};
use alloy_primitives::B256;
use anyhow::{bail, Context, Result};
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Half-open height range `[from, to)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockRange {
    pub from: u64,
    pub to: u64,
}

impl BlockRange {
    pub fn new(from: u64, to: u64) -> Self {
        Self {
            from,
            to: to.max(from),
        }
    }

    pub fn heights(&self) -> Range<u64> {
        self.from..self.to
    }

    pub fn len(&self) -> u64 {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }

    /// Highest height in the range.
    pub fn last(&self) -> Option<u64> {
        (!self.is_empty()).then(|| self.to - 1)
    }
}

impl fmt::Display for BlockRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.from, self.to)
    }
}

/// One transaction with both of its fetched records.
#[derive(Debug, Clone, PartialEq)]
pub struct TxUnit {
    pub height: u64,
    pub hash: B256,
    pub transaction: TxRecord,
    pub receipt: ReceiptRecord,
}

/// Output of both fetch rounds for a range.
#[derive(Debug)]
pub struct FetchedRange {
    pub blocks: usize,
    pub units: Vec<TxUnit>,
    pub rpc_latency: Duration,
}

/// Per-cycle progress line.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CycleReport {
    pub range: BlockRange,
    pub blocks: usize,
    pub transactions: usize,
    pub rpc_latency: Duration,
    pub total_latency: Duration,
}

impl CycleReport {
    /// Blocks the cursor was behind the chain when the cycle started.
    pub fn lag(&self) -> u64 {
        self.range.len()
    }

    pub fn per_transaction_latency(&self) -> Duration {
        match u32::try_from(self.transactions) {
            Ok(0) => Duration::ZERO,
            Ok(count) => self.total_latency / count,
            Err(_) => Duration::from_secs_f64(
                self.total_latency.as_secs_f64() / self.transactions as f64,
            ),
        }
    }

    pub fn log(&self) {
        tracing::info!(
            lag = self.lag(),
            start_height = self.range.from,
            end_height = self.range.to,
            blocks = self.blocks,
            transactions = self.transactions,
            rpc_ms = self.rpc_latency.as_millis() as u64,
            total_ms = self.total_latency.as_millis() as u64,
            per_tx_us = self.per_transaction_latency().as_micros() as u64,
            "processed block range"
        );
    }
}

#[derive(Clone)]
pub struct BatchFetcher {
    client: Arc<dyn ChainClient>,
}

impl BatchFetcher {
    pub fn new(client: Arc<dyn ChainClient>) -> Self {
        Self { client }
    }

    /// Fetches the blocks of `range` and every transaction/receipt pair they reference.
    ///
    /// Units come back in ascending height order, then in on-chain order
    /// within each block. A range whose blocks hold no transactions issues no
    /// second round.
    pub async fn fetch_units(&self, range: BlockRange) -> Result<FetchedRange> {
        if range.is_empty() {
            return Ok(FetchedRange {
                blocks: 0,
                units: Vec::new(),
                rpc_latency: Duration::ZERO,
            });
        }

        let started = Instant::now();
        let heights: Vec<u64> = range.heights().collect();

        let blocks = self
            .client
            .batch_get_blocks(&heights)
            .await
            .with_context(|| format!("failed to fetch blocks {range}"))?;

        if blocks.len() != heights.len() {
            bail!(
                "block batch for {range} returned {} blocks (expected {})",
                blocks.len(),
                heights.len()
            );
        }

        let mut located = Vec::new();
        for (height, block) in heights.iter().copied().zip(&blocks) {
            if block.number != height {
                bail!(
                    "block batch for {range} returned height {} in slot {height}",
                    block.number
                );
            }
            tracing::debug!(
                height,
                hash = %block.hash,
                transactions = block.transactions.len(),
                "fetched block"
            );
            located.extend(block.transactions.iter().map(|hash| (height, *hash)));
        }

        if located.is_empty() {
            tracing::debug!(
                start_height = range.from,
                end_height = range.to,
                "range holds no transactions"
            );
            return Ok(FetchedRange {
                blocks: blocks.len(),
                units: Vec::new(),
                rpc_latency: started.elapsed(),
            });
        }

        let hashes: Vec<B256> = located.iter().map(|(_, hash)| *hash).collect();
        let (transactions, receipts) = tokio::try_join!(
            async {
                self.client
                    .batch_get_transactions(&hashes)
                    .await
                    .with_context(|| format!("failed to fetch transactions for {range}"))
            },
            async {
                self.client
                    .batch_get_receipts(&hashes)
                    .await
                    .with_context(|| format!("failed to fetch receipts for {range}"))
            },
        )?;
        let rpc_latency = started.elapsed();

        let units = pair_records(located, transactions, receipts)
            .with_context(|| format!("inconsistent transaction data for {range}"))?;

        Ok(FetchedRange {
            blocks: blocks.len(),
            units,
            rpc_latency,
        })
    }

    /// Fetches `range` and hands every unit to `pool`, returning once the pool drained.
    pub async fn process_range(
        &self,
        range: BlockRange,
        pool: &TxProcessorPool,
    ) -> Result<CycleReport> {
        let started = Instant::now();
        let fetched = self.fetch_units(range).await?;
        let blocks = fetched.blocks;
        let rpc_latency = fetched.rpc_latency;

        let transactions = if fetched.units.is_empty() {
            0
        } else {
            pool.process_batch(fetched.units)
                .await
                .with_context(|| format!("failed to process transactions for {range}"))?
        };

        Ok(CycleReport {
            range,
            blocks,
            transactions,
            rpc_latency,
            total_latency: started.elapsed(),
        })
    }
}

/// Pairs the positional results of the second round with the hashes that requested them.
fn pair_records(
    located: Vec<(u64, B256)>,
    transactions: Vec<TxRecord>,
    receipts: Vec<ReceiptRecord>,
) -> Result<Vec<TxUnit>> {
    if transactions.len() != located.len() || receipts.len() != located.len() {
        bail!(
            "expected {} transactions and receipts, got {} and {}",
            located.len(),
            transactions.len(),
            receipts.len()
        );
    }

    located
        .into_iter()
        .zip(transactions.into_iter().zip(receipts))
        .map(|((height, hash), (transaction, receipt))| {
            if transaction.hash != hash {
                bail!("transaction slot for {hash} holds {}", transaction.hash);
            }
            if receipt.transaction_hash != hash {
                bail!(
                    "receipt slot for {hash} holds {}",
                    receipt.transaction_hash
                );
            }
            Ok(TxUnit {
                height,
                hash,
                transaction,
                receipt,
            })
        })
        .collect()
}
