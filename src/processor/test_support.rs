//! Scripted chain client and recording sink shared by the unit tests.

use crate::processor::batch::TxUnit;
use crate::rpc::client::{ChainClient, RpcError};
use crate::rpc::types::{Block, ReceiptRecord, TxRecord};
use crate::runtime::sink::{SinkError, TransactionSink};
use alloy_primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub(crate) fn tx_hash(height: u64, index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&height.to_be_bytes());
    bytes[8..16].copy_from_slice(&index.to_be_bytes());
    bytes[31] = 0xee;
    B256::from(bytes)
}

pub(crate) fn tx_record(height: u64, hash: B256) -> TxRecord {
    TxRecord {
        hash,
        block_number: Some(height),
        block_hash: Some(B256::with_last_byte(height as u8)),
        transaction_index: Some(u64::from_be_bytes(
            hash[8..16].try_into().unwrap_or_default(),
        )),
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        value: U256::from(1000u64),
        nonce: 0,
        gas: 21_000,
        gas_price: Some(U256::from(7u64)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        input: Bytes::from(vec![0xab, 0xcd]),
        tx_type: Some(0),
        chain_id: Some(1),
        v: Some(37),
        y_parity: None,
        max_fee_per_blob_gas: None,
        blob_versioned_hashes: None,
        other: BTreeMap::new(),
    }
}

pub(crate) fn receipt(height: u64, hash: B256) -> ReceiptRecord {
    ReceiptRecord {
        transaction_hash: hash,
        transaction_index: None,
        block_hash: Some(B256::with_last_byte(height as u8)),
        block_number: Some(height),
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        cumulative_gas_used: 21_000,
        gas_used: 21_000,
        effective_gas_price: Some(U256::from(7u64)),
        contract_address: None,
        logs: Vec::new(),
        logs_bloom: Bytes::from(vec![0u8; 4]),
        status: Some(1),
        tx_type: Some(0),
        blob_gas_used: None,
        blob_gas_price: None,
        other: BTreeMap::new(),
    }
}

pub(crate) fn unit(height: u64, index: u64) -> TxUnit {
    let hash = tx_hash(height, index);
    TxUnit {
        height,
        hash,
        transaction: tx_record(height, hash),
        receipt: receipt(height, hash),
    }
}

#[derive(Default)]
struct ChainState {
    blocks: BTreeMap<u64, Block>,
    transactions: HashMap<B256, TxRecord>,
    receipts: HashMap<B256, ReceiptRecord>,
    heights: VecDeque<u64>,
    last_height: u64,
    requested_blocks: Vec<Vec<u64>>,
}

/// In-memory chain with a scripted sequence of observed heights.
///
/// Once the script runs dry the client keeps reporting the last height and
/// cancels the attached token, which lets a tailer loop finish on its own.
#[derive(Default)]
pub(crate) struct MockChainClient {
    state: Mutex<ChainState>,
    chain_id: Option<u64>,
    shutdown: Option<CancellationToken>,
    rate_limited_block_batches: AtomicUsize,
    rate_limited_height_calls: AtomicUsize,
    rate_limited_transaction_batches: AtomicUsize,
    rate_limited_receipt_batches: AtomicUsize,
    fail_block_batches: Mutex<Option<String>>,
    chain_id_calls: AtomicUsize,
    height_calls: AtomicUsize,
    block_batches: AtomicUsize,
    transaction_batches: AtomicUsize,
    receipt_batches: AtomicUsize,
}

impl MockChainClient {
    pub(crate) fn new() -> Self {
        Self {
            chain_id: Some(1),
            ..Self::default()
        }
    }

    pub(crate) fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub(crate) fn with_chain_id(mut self, chain_id: Option<u64>) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub(crate) fn add_block(&self, height: u64, tx_count: u64) {
        let mut state = self.lock();
        let hashes: Vec<B256> = (0..tx_count).map(|i| tx_hash(height, i)).collect();
        for hash in &hashes {
            state.transactions.insert(*hash, tx_record(height, *hash));
            state.receipts.insert(*hash, receipt(height, *hash));
        }
        state.blocks.insert(
            height,
            Block {
                number: height,
                hash: B256::with_last_byte(height as u8),
                transactions: hashes,
            },
        );
    }

    /// Adds blocks `from..=to`, each with `tx_count` transactions.
    pub(crate) fn add_blocks(&self, from: u64, to: u64, tx_count: u64) {
        for height in from..=to {
            self.add_block(height, tx_count);
        }
    }

    pub(crate) fn script_heights(&self, heights: impl IntoIterator<Item = u64>) {
        self.lock().heights.extend(heights);
    }

    pub(crate) fn swap_receipts(&self, a: B256, b: B256) {
        let mut state = self.lock();
        let first = state.receipts.remove(&a);
        let second = state.receipts.remove(&b);
        if let (Some(first), Some(second)) = (first, second) {
            state.receipts.insert(a, second);
            state.receipts.insert(b, first);
        }
    }

    pub(crate) fn rate_limit_next_block_batches(&self, count: usize) {
        self.rate_limited_block_batches
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn rate_limit_next_height_calls(&self, count: usize) {
        self.rate_limited_height_calls
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn rate_limit_next_transaction_batches(&self, count: usize) {
        self.rate_limited_transaction_batches
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn rate_limit_next_receipt_batches(&self, count: usize) {
        self.rate_limited_receipt_batches
            .store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_block_batches(&self, message: &str) {
        *self
            .fail_block_batches
            .lock()
            .expect("failure lock poisoned") = Some(message.to_string());
    }

    pub(crate) fn chain_id_calls(&self) -> usize {
        self.chain_id_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn height_calls(&self) -> usize {
        self.height_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn block_batches(&self) -> usize {
        self.block_batches.load(Ordering::SeqCst)
    }

    pub(crate) fn transaction_batches(&self) -> usize {
        self.transaction_batches.load(Ordering::SeqCst)
    }

    pub(crate) fn receipt_batches(&self) -> usize {
        self.receipt_batches.load(Ordering::SeqCst)
    }

    pub(crate) fn requested_blocks(&self) -> Vec<Vec<u64>> {
        self.lock().requested_blocks.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChainState> {
        self.state.lock().expect("mock chain lock poisoned")
    }

    fn take_injection(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn throttled(method: &'static str) -> anyhow::Error {
        RpcError::RateLimited { method, code: 429 }.into()
    }
}

impl ChainClient for MockChainClient {
    fn chain_id(&self) -> BoxFuture<'_, Result<u64>> {
        self.chain_id_calls.fetch_add(1, Ordering::SeqCst);
        let chain_id = self.chain_id;
        Box::pin(async move { chain_id.ok_or_else(|| anyhow!("connection refused")) })
    }

    fn current_height(&self) -> BoxFuture<'_, Result<u64>> {
        self.height_calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if Self::take_injection(&self.rate_limited_height_calls) {
                return Err(Self::throttled("eth_blockNumber"));
            }
            let mut state = self.lock();
            match state.heights.pop_front() {
                Some(height) => {
                    state.last_height = height;
                    Ok(height)
                }
                None => {
                    if let Some(token) = &self.shutdown {
                        token.cancel();
                    }
                    Ok(state.last_height)
                }
            }
        })
    }

    fn batch_get_blocks<'a>(&'a self, heights: &'a [u64]) -> BoxFuture<'a, Result<Vec<Block>>> {
        self.block_batches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if Self::take_injection(&self.rate_limited_block_batches) {
                return Err(Self::throttled("eth_getBlockByNumber"));
            }
            if let Some(message) = self
                .fail_block_batches
                .lock()
                .expect("failure lock poisoned")
                .clone()
            {
                return Err(anyhow!(message));
            }
            let mut state = self.lock();
            state.requested_blocks.push(heights.to_vec());
            heights
                .iter()
                .map(|height| {
                    state
                        .blocks
                        .get(height)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown block {height}"))
                })
                .collect()
        })
    }

    fn batch_get_transactions<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<TxRecord>>> {
        self.transaction_batches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if Self::take_injection(&self.rate_limited_transaction_batches) {
                return Err(Self::throttled("eth_getTransactionByHash"));
            }
            let state = self.lock();
            hashes
                .iter()
                .map(|hash| {
                    state
                        .transactions
                        .get(hash)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown transaction {hash}"))
                })
                .collect()
        })
    }

    fn batch_get_receipts<'a>(
        &'a self,
        hashes: &'a [B256],
    ) -> BoxFuture<'a, Result<Vec<ReceiptRecord>>> {
        self.receipt_batches.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move {
            if Self::take_injection(&self.rate_limited_receipt_batches) {
                return Err(Self::throttled("eth_getTransactionReceipt"));
            }
            let state = self.lock();
            hashes
                .iter()
                .map(|hash| {
                    state
                        .receipts
                        .get(hash)
                        .cloned()
                        .ok_or_else(|| anyhow!("unknown receipt {hash}"))
                })
                .collect()
        })
    }
}

/// Sink that records what it saw, with optional delays, failures, and panics.
#[derive(Default)]
pub(crate) struct MockSink {
    emitted: Mutex<Vec<B256>>,
    attempted: AtomicUsize,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    delay: Option<Duration>,
    failing: HashSet<B256>,
    panicking: Option<B256>,
}

impl MockSink {
    pub(crate) fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub(crate) fn failing_on(hash: B256) -> Self {
        Self::failing_on_all([hash])
    }

    pub(crate) fn failing_on_all(hashes: impl IntoIterator<Item = B256>) -> Self {
        Self {
            failing: hashes.into_iter().collect(),
            ..Self::default()
        }
    }

    pub(crate) fn panicking_on(hash: B256) -> Self {
        Self {
            panicking: Some(hash),
            ..Self::default()
        }
    }

    pub(crate) fn emitted(&self) -> Vec<B256> {
        self.emitted.lock().expect("sink lock poisoned").clone()
    }

    pub(crate) fn attempted(&self) -> usize {
        self.attempted.load(Ordering::SeqCst)
    }

    pub(crate) fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }
}

impl TransactionSink for MockSink {
    fn emit<'a>(&'a self, unit: &'a TxUnit) -> BoxFuture<'a, Result<(), SinkError>> {
        Box::pin(async move {
            self.attempted.fetch_add(1, Ordering::SeqCst);
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak_in_flight.fetch_max(current, Ordering::SeqCst);

            match self.delay {
                Some(delay) => tokio::time::sleep(delay).await,
                None => tokio::task::yield_now().await,
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.panicking == Some(unit.hash) {
                panic!("sink exploded on {}", unit.hash);
            }
            if self.failing.contains(&unit.hash) {
                return Err(SinkError::emit(anyhow!("refusing {}", unit.hash)));
            }

            self.emitted
                .lock()
                .expect("sink lock poisoned")
                .push(unit.hash);
            Ok(())
        })
    }
}
